//! Per-issue webhook notifications after a release.
//!
//! For every unique issue reference in the release one request is sent to the
//! configured URL, with `::issue_ref::`, `::version::` and `::commit_hash::`
//! substituted in both URL and body. A failed request is logged and reported
//! but never fails the release.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::change::Change;
use crate::config::{AuthType, MISC_TYPE, PostProcessConfig};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that stop post-processing before any request is sent.
#[derive(Error, Debug)]
pub enum PostProcessError {
    /// `auth_env` names a variable that is not set.
    #[error("Missing environment variable \"{0}\"")]
    MissingAuthEnv(String),

    /// Basic auth credentials are not `user:api_key`.
    #[error("Unexpected content in {0}, need '{{username}}:{{api_key}}' for basic auth")]
    MalformedBasicAuth(String),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// `verb` is not an HTTP method.
    #[error("invalid HTTP verb '{0}'")]
    InvalidVerb(String),
}

/// Result alias for post-processing.
pub type PostProcessResult<T> = Result<T, PostProcessError>;

/// An issue referenced by the release and the newest commit referencing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueRef {
    /// Value of the `Refs`/`Closes`/`Fixes` footer.
    pub issue_ref: String,
    /// Hash of the first change carrying it.
    pub commit_hash: String,
}

/// Unique, sorted issue references of typed (non-`_misc`) changes.
pub fn unique_issue_refs(changes: &[Change]) -> Vec<IssueRef> {
    let mut refs: Vec<IssueRef> = Vec::new();
    for change in changes.iter().filter(|c| c.commit_type != MISC_TYPE) {
        let issue_ref = change.issue_ref();
        if issue_ref.is_empty() || refs.iter().any(|r| r.issue_ref == issue_ref) {
            continue;
        }
        refs.push(IssueRef {
            issue_ref: issue_ref.to_string(),
            commit_hash: change.commit_hash.clone(),
        });
    }
    refs.sort_by(|a, b| a.issue_ref.cmp(&b.issue_ref));
    refs
}

/// A fully substituted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostProcessRequest {
    /// HTTP method.
    pub verb: String,
    /// Target URL.
    pub url: String,
    /// Request body.
    pub body: String,
}

/// One request per issue. Empty when no URL is configured.
pub fn plan_requests(
    cfg: &PostProcessConfig,
    issues: &[IssueRef],
    version: &str,
) -> Vec<PostProcessRequest> {
    let Some(url) = cfg.url.as_deref().filter(|u| !u.is_empty()) else {
        return Vec::new();
    };
    let fill = |template: &str, issue: &IssueRef| {
        template
            .replace("::issue_ref::", &issue.issue_ref)
            .replace("::version::", version)
            .replace("::commit_hash::", &issue.commit_hash)
    };
    issues
        .iter()
        .map(|issue| PostProcessRequest {
            verb: cfg.verb.clone(),
            url: fill(url, issue),
            body: fill(&cfg.body, issue),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Credentials {
    Basic { user: String, key: String },
    Bearer(String),
}

fn credentials(
    cfg: &PostProcessConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> PostProcessResult<Option<Credentials>> {
    let Some(var) = cfg.auth_env.as_deref() else {
        return Ok(None);
    };
    let value = lookup(var)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PostProcessError::MissingAuthEnv(var.to_string()))?;
    match cfg.auth_type {
        AuthType::Bearer => Ok(Some(Credentials::Bearer(value))),
        AuthType::Basic => {
            let mut parts = value.split(':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(user), Some(key), None) => Ok(Some(Credentials::Basic {
                    user: user.to_string(),
                    key: key.to_string(),
                })),
                _ => Err(PostProcessError::MalformedBasicAuth(var.to_string())),
            }
        }
    }
}

/// A request that did not succeed.
#[derive(Debug, Clone, Serialize)]
pub struct FailedRequest {
    /// Target URL.
    pub url: String,
    /// Status or transport error.
    pub reason: String,
}

/// Outcome of [`dispatch`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    /// Requests that got a success status.
    pub sent: usize,
    /// Requests that failed.
    pub failed: Vec<FailedRequest>,
}

/// Send every request in order.
///
/// Credentials and the client are set up first; problems there are errors.
/// Failures of individual requests are logged and collected in the report.
#[instrument(skip_all, fields(count = requests.len()))]
pub fn dispatch(
    cfg: &PostProcessConfig,
    requests: &[PostProcessRequest],
) -> PostProcessResult<DispatchReport> {
    let mut report = DispatchReport::default();
    if requests.is_empty() {
        return Ok(report);
    }

    let method = reqwest::Method::from_bytes(cfg.verb.to_ascii_uppercase().as_bytes())
        .map_err(|_| PostProcessError::InvalidVerb(cfg.verb.clone()))?;
    let auth = credentials(cfg, |var| std::env::var(var).ok())?;
    let client = reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    for request in requests {
        info!(verb = %method, url = %request.url, "post-process request");
        let mut builder = client
            .request(method.clone(), &request.url)
            .body(request.body.clone());
        for (name, value) in &cfg.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &auth {
            Some(Credentials::Basic { user, key }) => builder.basic_auth(user, Some(key)),
            Some(Credentials::Bearer(token)) => builder.bearer_auth(token),
            None => builder,
        };

        match builder.send().and_then(reqwest::blocking::Response::error_for_status) {
            Ok(response) => {
                debug!(status = %response.status(), "post-process response");
                report.sent += 1;
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "post-process request failed");
                report.failed.push(FailedRequest {
                    url: request.url.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(report)
}
