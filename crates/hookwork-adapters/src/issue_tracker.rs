use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use hookwork_runtime::error::FieldError;
use hookwork_runtime::host::IssueRef;
use hookwork_runtime::hooks::{IssueTrackerOperation, IssueTrackerParams};
use hookwork_runtime::{
    ActionAdapter, ActionOutput, HookError, IssueTracker, TriggerContext, VersionControl,
};
use reqwest::{Client, ClientBuilder, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

const DEFAULT_BASE_BRANCH: &str = "main";

/// Opens/closes issues, creates pull requests and comments through an `IssueTracker`
pub struct IssueTrackerAdapter {
    tracker: Arc<dyn IssueTracker>,
}

impl IssueTrackerAdapter {
    pub fn new(tracker: Arc<dyn IssueTracker>) -> Self {
        Self { tracker }
    }

    async fn run(&self, params: &IssueTrackerParams, ctx: &TriggerContext) -> Result<String> {
        let repository = match params.repository.as_deref().filter(|r| !r.is_empty()) {
            Some(repo) => repo.to_string(),
            None => self
                .tracker
                .current_repository()
                .await?
                .ok_or_else(|| anyhow!("No repository configured and none could be detected"))?,
        };
        let body = params.body_template.as_deref().unwrap_or("");

        match params.operation {
            IssueTrackerOperation::OpenIssue => {
                let title = non_empty(&params.title_template, "titleTemplate")?;
                let issue = self
                    .tracker
                    .open_issue(&repository, title, body, &params.labels)
                    .await?;
                Ok(format!("Opened issue #{}: {}", issue.number, issue.url))
            }
            IssueTrackerOperation::CloseIssue => {
                let number = params.issue_number.context("issueNumber is required")?;
                let issue = self.tracker.close_issue(&repository, number).await?;
                Ok(format!("Closed issue #{}: {}", issue.number, issue.url))
            }
            IssueTrackerOperation::CreatePr => {
                let title = non_empty(&params.title_template, "titleTemplate")?;
                if ctx.branch.is_empty() {
                    bail!("Cannot create a pull request without a current branch");
                }
                let base = params.base_branch.as_deref().unwrap_or(DEFAULT_BASE_BRANCH);
                let pr = self
                    .tracker
                    .create_pull_request(&repository, title, body, &ctx.branch, base)
                    .await?;
                Ok(format!("Created pull request #{}: {}", pr.number, pr.url))
            }
            IssueTrackerOperation::AddComment => {
                let number = params.issue_number.context("issueNumber is required")?;
                if body.trim().is_empty() {
                    bail!("bodyTemplate expanded to an empty value");
                }
                let comment = self.tracker.add_comment(&repository, number, body).await?;
                Ok(format!("Commented on #{}: {}", comment.number, comment.url))
            }
        }
    }
}

fn non_empty<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => bail!("{} expanded to an empty value", field),
    }
}

#[async_trait]
impl ActionAdapter<IssueTrackerParams> for IssueTrackerAdapter {
    fn validate(&self, params: &IssueTrackerParams) -> Vec<FieldError> {
        let mut errors = Vec::new();
        let needs_number = matches!(
            params.operation,
            IssueTrackerOperation::CloseIssue | IssueTrackerOperation::AddComment
        );
        if needs_number && params.issue_number.is_none() {
            errors.push(FieldError::new(
                "action.parameters.issueNumber",
                "Issue number is required for this operation",
            ));
        }
        errors
    }

    async fn execute(
        &self,
        params: &IssueTrackerParams,
        ctx: &TriggerContext,
    ) -> Result<ActionOutput, HookError> {
        info!(operation = ?params.operation, "Running issue-tracker action");
        self.run(params, ctx)
            .await
            .map(ActionOutput::text)
            .map_err(|e| HookError::ActionFailed(format!("{:#}", e)))
    }
}

/// Extract `owner/name` from a GitHub remote URL (https, ssh or scp-style)
pub fn parse_github_repository(remote: &str) -> Option<String> {
    let remote = remote.trim();
    let path = remote
        .strip_prefix("git@github.com:")
        .or_else(|| remote.strip_prefix("ssh://git@github.com/"))
        .or_else(|| remote.strip_prefix("https://github.com/"))
        .or_else(|| remote.strip_prefix("http://github.com/"))?;
    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);

    let mut parts = path.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
            Some(format!("{}/{}", owner, name))
        }
        _ => None,
    }
}

#[derive(Deserialize)]
struct ApiIssue {
    number: u64,
    html_url: String,
}

#[derive(Deserialize)]
struct ApiComment {
    html_url: String,
}

/// GitHub REST implementation of `IssueTracker`
pub struct GitHubIssues {
    client: Client,
    api_base: String,
    token: Option<String>,
    vcs: Option<Arc<dyn VersionControl>>,
}

impl GitHubIssues {
    pub fn new(api_base: &str, token: Option<String>) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("hookwork/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            vcs: None,
        })
    }

    /// Token from the named environment variable, if set
    pub fn from_env(api_base: &str, token_env: &str) -> Result<Self> {
        Self::new(api_base, std::env::var(token_env).ok().filter(|t| !t.is_empty()))
    }

    /// Detect the current repository from the `origin` remote
    pub fn with_version_control(mut self, vcs: Arc<dyn VersionControl>) -> Self {
        self.vcs = Some(vcs);
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.api_base, path);
        debug!(%method, url, "GitHub request");
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.context("GitHub request failed")?;
        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(anyhow!("GitHub API error ({}): {}", status, error_body));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl IssueTracker for GitHubIssues {
    async fn current_repository(&self) -> Result<Option<String>> {
        let Some(vcs) = &self.vcs else {
            return Ok(None);
        };
        Ok(vcs
            .remote_url()
            .await?
            .as_deref()
            .and_then(parse_github_repository))
    }

    async fn open_issue(
        &self,
        repository: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<IssueRef> {
        let mut payload = json!({"title": title, "body": body});
        if !labels.is_empty() {
            payload["labels"] = json!(labels);
        }
        let issue: ApiIssue = self
            .send(
                self.request(reqwest::Method::POST, &format!("/repos/{}/issues", repository))
                    .json(&payload),
            )
            .await?;
        Ok(IssueRef {
            number: issue.number,
            url: issue.html_url,
        })
    }

    async fn close_issue(&self, repository: &str, number: u64) -> Result<IssueRef> {
        let issue: ApiIssue = self
            .send(
                self.request(
                    reqwest::Method::PATCH,
                    &format!("/repos/{}/issues/{}", repository, number),
                )
                .json(&json!({"state": "closed"})),
            )
            .await?;
        Ok(IssueRef {
            number: issue.number,
            url: issue.html_url,
        })
    }

    async fn create_pull_request(
        &self,
        repository: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<IssueRef> {
        let pr: ApiIssue = self
            .send(
                self.request(reqwest::Method::POST, &format!("/repos/{}/pulls", repository))
                    .json(&json!({"title": title, "body": body, "head": head, "base": base})),
            )
            .await?;
        Ok(IssueRef {
            number: pr.number,
            url: pr.html_url,
        })
    }

    async fn add_comment(&self, repository: &str, number: u64, body: &str) -> Result<IssueRef> {
        let comment: ApiComment = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/repos/{}/issues/{}/comments", repository, number),
                )
                .json(&json!({"body": body})),
            )
            .await?;
        Ok(IssueRef {
            number,
            url: comment.html_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTracker {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl IssueTracker for RecordingTracker {
        async fn current_repository(&self) -> Result<Option<String>> {
            Ok(Some("acme/widgets".into()))
        }
        async fn open_issue(&self, repo: &str, title: &str, _body: &str, labels: &[String]) -> Result<IssueRef> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("open {} {} {:?}", repo, title, labels));
            Ok(IssueRef {
                number: 7,
                url: "https://github.com/acme/widgets/issues/7".into(),
            })
        }
        async fn close_issue(&self, repo: &str, number: u64) -> Result<IssueRef> {
            self.calls.lock().unwrap().push(format!("close {} {}", repo, number));
            Ok(IssueRef {
                number,
                url: String::new(),
            })
        }
        async fn create_pull_request(
            &self,
            repo: &str,
            _title: &str,
            _body: &str,
            head: &str,
            base: &str,
        ) -> Result<IssueRef> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("pr {} {}->{}", repo, head, base));
            Ok(IssueRef {
                number: 9,
                url: String::new(),
            })
        }
        async fn add_comment(&self, _repo: &str, number: u64, _body: &str) -> Result<IssueRef> {
            Ok(IssueRef {
                number,
                url: String::new(),
            })
        }
    }

    fn params(operation: IssueTrackerOperation) -> IssueTrackerParams {
        IssueTrackerParams {
            operation,
            repository: None,
            title_template: None,
            body_template: None,
            issue_number: None,
            base_branch: None,
            labels: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_open_issue_in_detected_repository() {
        let tracker = Arc::new(RecordingTracker::default());
        let adapter = IssueTrackerAdapter::new(tracker.clone());
        let mut p = params(IssueTrackerOperation::OpenIssue);
        p.title_template = Some("Spec ready: 001-auth".into());
        p.labels = vec!["spec".into()];

        let out = adapter.execute(&p, &TriggerContext::default()).await.unwrap();
        assert_eq!(
            out.output.as_deref(),
            Some("Opened issue #7: https://github.com/acme/widgets/issues/7")
        );
        assert_eq!(
            tracker.calls.lock().unwrap()[0],
            "open acme/widgets Spec ready: 001-auth [\"spec\"]"
        );
    }

    #[tokio::test]
    async fn test_pull_request_uses_current_branch() {
        let tracker = Arc::new(RecordingTracker::default());
        let adapter = IssueTrackerAdapter::new(tracker.clone());
        let mut p = params(IssueTrackerOperation::CreatePr);
        p.repository = Some("acme/api".into());
        p.title_template = Some("Implement auth".into());
        let ctx = TriggerContext {
            branch: "001-add-auth".into(),
            ..Default::default()
        };

        adapter.execute(&p, &ctx).await.unwrap();
        assert_eq!(tracker.calls.lock().unwrap()[0], "pr acme/api 001-add-auth->main");
    }

    #[tokio::test]
    async fn test_pull_request_without_branch_fails() {
        let adapter = IssueTrackerAdapter::new(Arc::new(RecordingTracker::default()));
        let mut p = params(IssueTrackerOperation::CreatePr);
        p.title_template = Some("t".into());
        let err = adapter.execute(&p, &TriggerContext::default()).await.unwrap_err();
        assert_eq!(err.kind(), "action_failed");
    }

    #[test]
    fn test_close_requires_number() {
        let adapter = IssueTrackerAdapter::new(Arc::new(RecordingTracker::default()));
        let errors = adapter.validate(&params(IssueTrackerOperation::CloseIssue));
        assert_eq!(errors[0].field, "action.parameters.issueNumber");
    }

    #[test]
    fn test_parse_github_repository() {
        assert_eq!(
            parse_github_repository("git@github.com:acme/widgets.git").as_deref(),
            Some("acme/widgets")
        );
        assert_eq!(
            parse_github_repository("https://github.com/acme/widgets").as_deref(),
            Some("acme/widgets")
        );
        assert_eq!(
            parse_github_repository("ssh://git@github.com/acme/widgets.git/").as_deref(),
            Some("acme/widgets")
        );
        assert_eq!(parse_github_repository("https://gitlab.com/acme/widgets"), None);
        assert_eq!(parse_github_repository("https://github.com/acme"), None);
    }
}
