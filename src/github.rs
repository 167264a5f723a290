//! GitHub fetcher — conditional issue/PR listing via the REST API.
//!
//! One GET per repository per tick against
//! `/repos/{owner}/{name}/issues?state=all&per_page=100`, sending the
//! stored entity tag as `If-None-Match` so unchanged repositories cost a
//! 304 instead of a payload. HTTP outcomes are classified into the
//! per-repository error strings the rest of the system stores and shows;
//! transport-level failures propagate to the caller instead.
//!
//! Only the first page is fetched. Repositories with more than 100 events
//! in a day lose the older ones.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};
use reqwest::StatusCode;
use reqwest::header;
use serde::Deserialize;

use crate::model::{ItemKind, TrackedItem, TrackedRepository};
use crate::window;

const BASE_URL: &str = "https://api.github.com";
/// Results per page. 100 is the API maximum.
const PER_PAGE: &str = "100";
const USER_AGENT: &str = concat!("repowatch/", env!("CARGO_PKG_VERSION"));

/// HTTP status for a conditional fetch that found nothing new.
pub const STATUS_NOT_MODIFIED: u16 = 304;

/// Stored error string for statuses with no more specific classification
/// and for transport-level failures.
pub const ERROR_UNREACHABLE: &str = "Unable to access data";

/// Outcome of one fetch attempt for one repository.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Normalized items within the trailing 24h window. Empty on 304 and
    /// on classified errors.
    pub items: Vec<TrackedItem>,
    /// New cache validator. On 304 and on errors this echoes the
    /// repository's existing token.
    pub cache_token: String,
    /// Raw HTTP status code.
    pub status: u16,
    /// Classified error, None when the fetch succeeded or was a 304.
    pub error: Option<String>,
}

/// Source of repository activity. The reconciliation engine only sees this
/// trait, so tests drive it with a scripted stub.
#[async_trait]
pub trait ActivityFetcher: Send + Sync {
    /// Fetch current activity for one repository. A single attempt, never
    /// retried; HTTP-level failures come back classified inside the
    /// outcome, transport failures as `Err`.
    async fn fetch(&self, repository: &TrackedRepository, api_key: &str) -> Result<FetchOutcome>;

    /// Check whether an API key is accepted upstream. `Ok(None)` = valid;
    /// `Ok(Some(message))` carries the provider's rejection message.
    async fn validate_key(&self, api_key: &str) -> Result<Option<String>>;
}

/// Fetches from the GitHub REST API over a pooled [`reqwest::Client`].
pub struct GitHubFetcher {
    client: reqwest::Client,
}

impl GitHubFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .wrap_err("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ActivityFetcher for GitHubFetcher {
    async fn fetch(&self, repository: &TrackedRepository, api_key: &str) -> Result<FetchOutcome> {
        let url = format!(
            "{BASE_URL}/repos/{owner}/{name}/issues",
            owner = repository.owner,
            name = repository.name,
        );

        let mut request = self
            .client
            .get(&url)
            .query(&[("state", "all"), ("per_page", PER_PAGE)]);
        if !api_key.is_empty() {
            request = request.header(header::AUTHORIZATION, format!("token {api_key}"));
        }
        if !repository.cache_token.is_empty() {
            request = request.header(header::IF_NONE_MATCH, &repository.cache_token);
        }

        let response = request
            .send()
            .await
            .wrap_err_with(|| format!("request to {url} failed"))?;
        let status = response.status();

        if status.as_u16() == STATUS_NOT_MODIFIED {
            return Ok(FetchOutcome {
                items: Vec::new(),
                cache_token: repository.cache_token.clone(),
                status: status.as_u16(),
                error: None,
            });
        }

        if !status.is_success() {
            eprintln!(
                "[fetch] {slug}: HTTP {status}",
                slug = repository.slug(),
            );
            return Ok(FetchOutcome {
                items: Vec::new(),
                cache_token: repository.cache_token.clone(),
                status: status.as_u16(),
                error: Some(classify_error(status)),
            });
        }

        let cache_token = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();

        let raw: Vec<RawItem> = response
            .json()
            .await
            .wrap_err_with(|| format!("malformed payload from {url}"))?;

        let items = window::filter_last_day(raw.into_iter().map(normalize).collect());

        Ok(FetchOutcome {
            items,
            cache_token,
            status: status.as_u16(),
            error: None,
        })
    }

    async fn validate_key(&self, api_key: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(BASE_URL)
            .header(header::AUTHORIZATION, format!("token {api_key}"))
            .send()
            .await
            .wrap_err("API key validation request failed")?;

        if response.status().is_success() {
            return Ok(None);
        }

        let body: ErrorBody = response
            .json()
            .await
            .wrap_err("failed to parse API error response")?;
        Ok(Some(body.message))
    }
}

/// Map a non-success, non-304 status to the stored error string.
fn classify_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Invalid API key".to_owned(),
        404 => "Invalid repository name".to_owned(),
        _ => ERROR_UNREACHABLE.to_owned(),
    }
}

fn normalize(raw: RawItem) -> TrackedItem {
    let kind = if raw.pull_request.is_some() {
        ItemKind::PullRequest
    } else {
        ItemKind::Issue
    };
    TrackedItem {
        number: raw.number,
        title: raw.title,
        author: raw.user.login,
        created_at: raw.created_at,
        kind,
    }
}

/// One record of the issue-listing payload. The endpoint returns both
/// issues and pull requests; PRs carry a `pull_request` sub-object.
#[derive(Debug, Deserialize)]
struct RawItem {
    number: u64,
    title: String,
    user: RawUser,
    created_at: DateTime<Utc>,
    #[serde(default)]
    pull_request: Option<RawPullRequest>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

/// Marker sub-object distinguishing PRs from issues; contents unused.
#[derive(Debug, Deserialize)]
struct RawPullRequest {}

/// Shape of GitHub's JSON error responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_known_statuses() {
        assert_eq!(
            classify_error(StatusCode::UNAUTHORIZED),
            "Invalid API key"
        );
        assert_eq!(
            classify_error(StatusCode::NOT_FOUND),
            "Invalid repository name"
        );
        assert_eq!(
            classify_error(StatusCode::FORBIDDEN),
            "Unable to access data"
        );
        assert_eq!(
            classify_error(StatusCode::INTERNAL_SERVER_ERROR),
            "Unable to access data"
        );
    }

    #[test]
    fn payload_parses_and_normalizes() {
        let payload = r#"[
            {
                "number": 12,
                "title": "Add retry support",
                "user": {"login": "alice"},
                "created_at": "2025-06-01T10:00:00Z",
                "pull_request": {"url": "https://api.github.com/repos/o/n/pulls/12"}
            },
            {
                "number": 13,
                "title": "Crash on startup",
                "user": {"login": "bob"},
                "created_at": "2025-06-01T11:00:00Z"
            }
        ]"#;

        let raw: Vec<RawItem> = serde_json::from_str(payload).unwrap();
        let items: Vec<TrackedItem> = raw.into_iter().map(normalize).collect();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].number, 12);
        assert_eq!(items[0].author, "alice");
        assert_eq!(items[0].kind, ItemKind::PullRequest);
        assert_eq!(items[1].kind, ItemKind::Issue);
        assert_eq!(items[1].title, "Crash on startup");
    }

    #[test]
    fn malformed_payload_is_rejected() {
        // Missing required fields must fail instead of being guessed at.
        let payload = r#"[{"number": 1, "created_at": "2025-06-01T10:00:00Z"}]"#;
        let result: std::result::Result<Vec<RawItem>, _> = serde_json::from_str(payload);
        assert!(result.is_err());

        let payload = r#"[{"number": 1, "title": "x", "user": {"login": "a"}, "created_at": "not a date"}]"#;
        let result: std::result::Result<Vec<RawItem>, _> = serde_json::from_str(payload);
        assert!(result.is_err());
    }

    #[test]
    fn error_body_parses_message() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"message": "Bad credentials", "documentation_url": "x"}"#)
                .unwrap();
        assert_eq!(body.message, "Bad credentials");
    }
}
