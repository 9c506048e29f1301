use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use hookwork_runtime::error::FieldError;
use hookwork_runtime::hooks::{VersionControlOperation, VersionControlParams};
use hookwork_runtime::{ActionAdapter, ActionOutput, HookError, TriggerContext, VersionControl};
use tokio::process::Command;
use tracing::{debug, info};

/// Runs commit/push/branch/tag/stash against a `VersionControl` backend
pub struct VersionControlAdapter {
    vcs: Arc<dyn VersionControl>,
}

impl VersionControlAdapter {
    pub fn new(vcs: Arc<dyn VersionControl>) -> Self {
        Self { vcs }
    }

    async fn run(&self, params: &VersionControlParams) -> Result<String> {
        let mut summary = match params.operation {
            VersionControlOperation::Commit => {
                let message = required(&params.message_template, "messageTemplate")?;
                self.vcs.commit(message).await?
            }
            VersionControlOperation::Push => self.vcs.push().await?,
            VersionControlOperation::CreateBranch => {
                let name = required(&params.branch_name, "branchName")?;
                self.vcs.create_branch(name).await?
            }
            VersionControlOperation::Tag => {
                let name = required(&params.tag_name, "tagName")?;
                self.vcs
                    .tag(name, params.message_template.as_deref().filter(|m| !m.is_empty()))
                    .await?
            }
            VersionControlOperation::Stash => {
                self.vcs
                    .stash(params.message_template.as_deref().filter(|m| !m.is_empty()))
                    .await?
            }
        };

        let pushes_after = matches!(
            params.operation,
            VersionControlOperation::Commit | VersionControlOperation::Tag
        );
        if pushes_after && params.push_to_remote {
            let pushed = self.vcs.push().await?;
            summary = format!("{}; {}", summary, pushed);
        }
        Ok(summary)
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => bail!("{} expanded to an empty value", field),
    }
}

#[async_trait]
impl ActionAdapter<VersionControlParams> for VersionControlAdapter {
    fn validate(&self, params: &VersionControlParams) -> Vec<FieldError> {
        let missing = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        let field = match params.operation {
            VersionControlOperation::Commit if missing(&params.message_template) => "messageTemplate",
            VersionControlOperation::CreateBranch if missing(&params.branch_name) => "branchName",
            VersionControlOperation::Tag if missing(&params.tag_name) => "tagName",
            _ => return Vec::new(),
        };
        vec![FieldError::new(
            format!("action.parameters.{}", field),
            format!("{} is required for this operation", field),
        )]
    }

    async fn execute(
        &self,
        params: &VersionControlParams,
        _ctx: &TriggerContext,
    ) -> Result<ActionOutput, HookError> {
        info!(operation = ?params.operation, "Running version-control action");
        self.run(params)
            .await
            .map(ActionOutput::text)
            .map_err(|e| HookError::ActionFailed(format!("{:#}", e)))
    }
}

/// `VersionControl` backed by the `git` executable
pub struct GitCli {
    repo: PathBuf,
}

impl GitCli {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// Run git; non-zero exit is an error carrying stderr
    async fn git(&self, args: &[&str]) -> Result<String> {
        match self.git_optional(args).await? {
            Ok(stdout) => Ok(stdout),
            Err(stderr) => bail!("git {} failed: {}", args.join(" "), stderr),
        }
    }

    /// Run git; non-zero exit yields `Ok(Err(stderr))`
    async fn git_optional(&self, args: &[&str]) -> Result<std::result::Result<String, String>> {
        debug!(?args, repo = ?self.repo, "Running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            .output()
            .await
            .context("Failed to run git")?;

        if output.status.success() {
            Ok(Ok(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(Err(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn current_branch(&self) -> Result<Option<String>> {
        let branch = self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        // Detached head
        if branch == "HEAD" || branch.is_empty() {
            return Ok(None);
        }
        Ok(Some(branch))
    }

    async fn user_name(&self) -> Result<Option<String>> {
        Ok(self
            .git_optional(&["config", "user.name"])
            .await?
            .ok()
            .filter(|s| !s.is_empty()))
    }

    async fn remote_url(&self) -> Result<Option<String>> {
        Ok(self
            .git_optional(&["remote", "get-url", "origin"])
            .await?
            .ok()
            .filter(|s| !s.is_empty()))
    }

    async fn commit(&self, message: &str) -> Result<String> {
        self.git(&["add", "-A"]).await?;
        self.git(&["commit", "-m", message]).await?;
        Ok(format!("Committed: {}", message))
    }

    async fn push(&self) -> Result<String> {
        self.git(&["push", "--follow-tags", "-u", "origin", "HEAD"]).await?;
        Ok("Pushed to origin".to_string())
    }

    async fn create_branch(&self, name: &str) -> Result<String> {
        self.git(&["checkout", "-b", name]).await?;
        Ok(format!("Created branch {}", name))
    }

    async fn tag(&self, name: &str, message: Option<&str>) -> Result<String> {
        match message {
            Some(message) => self.git(&["tag", "-a", name, "-m", message]).await?,
            None => self.git(&["tag", name]).await?,
        };
        Ok(format!("Tagged {}", name))
    }

    async fn stash(&self, message: Option<&str>) -> Result<String> {
        match message {
            Some(message) => self.git(&["stash", "push", "-m", message]).await?,
            None => self.git(&["stash", "push"]).await?,
        };
        Ok("Stashed changes".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRepo {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingRepo {
        fn log(&self, call: String) -> Result<String> {
            self.calls.lock().unwrap().push(call.clone());
            Ok(call)
        }
    }

    #[async_trait]
    impl VersionControl for RecordingRepo {
        async fn current_branch(&self) -> Result<Option<String>> {
            Ok(Some("main".into()))
        }
        async fn user_name(&self) -> Result<Option<String>> {
            Ok(None)
        }
        async fn remote_url(&self) -> Result<Option<String>> {
            Ok(None)
        }
        async fn commit(&self, message: &str) -> Result<String> {
            self.log(format!("commit {}", message))
        }
        async fn push(&self) -> Result<String> {
            self.log("push".into())
        }
        async fn create_branch(&self, name: &str) -> Result<String> {
            self.log(format!("branch {}", name))
        }
        async fn tag(&self, name: &str, message: Option<&str>) -> Result<String> {
            self.log(format!("tag {} {:?}", name, message))
        }
        async fn stash(&self, _message: Option<&str>) -> Result<String> {
            bail!("nothing to stash")
        }
    }

    fn params(operation: VersionControlOperation) -> VersionControlParams {
        VersionControlParams {
            operation,
            message_template: None,
            branch_name: None,
            tag_name: None,
            push_to_remote: false,
        }
    }

    #[tokio::test]
    async fn test_commit_then_push() {
        let repo = Arc::new(RecordingRepo::default());
        let adapter = VersionControlAdapter::new(repo.clone());
        let mut p = params(VersionControlOperation::Commit);
        p.message_template = Some("docs: plan".into());
        p.push_to_remote = true;

        let out = adapter.execute(&p, &TriggerContext::default()).await.unwrap();
        assert_eq!(out.output.as_deref(), Some("commit docs: plan; push"));
        assert_eq!(repo.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_expanded_branch_fails() {
        let adapter = VersionControlAdapter::new(Arc::new(RecordingRepo::default()));
        let mut p = params(VersionControlOperation::CreateBranch);
        p.branch_name = Some("  ".into());
        let err = adapter.execute(&p, &TriggerContext::default()).await.unwrap_err();
        assert!(err.to_string().contains("branchName"));
    }

    #[tokio::test]
    async fn test_backend_error_surfaces() {
        let adapter = VersionControlAdapter::new(Arc::new(RecordingRepo::default()));
        let err = adapter
            .execute(&params(VersionControlOperation::Stash), &TriggerContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nothing to stash"));
    }

    #[test]
    fn test_validate_names_missing_field() {
        let adapter = VersionControlAdapter::new(Arc::new(RecordingRepo::default()));
        let errors = adapter.validate(&params(VersionControlOperation::Tag));
        assert_eq!(errors[0].field, "action.parameters.tagName");
        assert!(adapter.validate(&params(VersionControlOperation::Push)).is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires git on PATH
    async fn test_git_cli_commit_and_branch() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(dir.path());
        git.git(&["init", "-q", "-b", "main"]).await.unwrap();
        git.git(&["config", "user.name", "Hook Runner"]).await.unwrap();
        git.git(&["config", "user.email", "hooks@example.com"]).await.unwrap();
        std::fs::write(dir.path().join("spec.md"), "# Spec").unwrap();

        git.commit("docs: add spec").await.unwrap();
        git.create_branch("001-add-auth").await.unwrap();

        assert_eq!(git.current_branch().await.unwrap().as_deref(), Some("001-add-auth"));
        assert_eq!(git.user_name().await.unwrap().as_deref(), Some("Hook Runner"));
        assert_eq!(git.remote_url().await.unwrap(), None);
    }
}
