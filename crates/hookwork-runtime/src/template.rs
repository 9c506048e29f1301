//! `{placeholder}` expansion against a trigger context.
//!
//! Placeholders name a context variable (`{feature}`, `{branch}`) or a dotted
//! path into trigger metadata (`{metadata.specPath}`). A placeholder with no
//! value expands to the empty string; expansion never fails.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::context::TriggerContext;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_-]+)*)\}")
            .expect("valid placeholder regex")
    })
}

/// Expand every placeholder in `template`
pub fn expand(template: &str, ctx: &TriggerContext) -> String {
    if !template.contains('{') {
        return template.to_string();
    }
    placeholder_regex()
        .replace_all(template, |caps: &Captures| ctx.lookup_text(&caps[1]))
        .into_owned()
}
