use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::Result;
use crate::error::{Error, SearchError};
use crate::types::Issue;

const BODY_PREVIEW_LIMIT: usize = 256;
const CORRELATION_HEADER: &str = "x-correlation-id";
const API_VERSION_HEADER: &str = "x-github-api-version";
const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    base: Url,
    token: SecretString,
}

impl GitHubClient {
    pub fn new(
        base: Url,
        token: SecretString,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .user_agent(concat!("issuewatch/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| SearchError::Client { source: err })?;

        Ok(Self { http, base, token })
    }

    /// Runs one search and converts the result page into domain issues.
    ///
    /// Records representing pull requests are discarded here even though the
    /// query already asks for issues only; the search backend is not trusted
    /// on that point.
    pub async fn search_issues(&self, query: &str) -> Result<Vec<Issue>> {
        let mut url =
            self.base
                .join("search/issues")
                .map_err(|err| SearchError::InvalidField {
                    field: "api_url",
                    message: err.to_string(),
                })?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("sort", "created")
            .append_pair("order", "desc")
            .append_pair("per_page", &PAGE_SIZE.to_string());

        let correlation_id = Uuid::now_v7().to_string();
        let started = Instant::now();
        let response = self
            .http
            .get(url)
            .header(CORRELATION_HEADER, &correlation_id)
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.token.expose_secret()),
            )
            .send()
            .await
            .map_err(SearchError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::HttpStatus { status }.into());
        }

        let body = response.bytes().await.map_err(SearchError::from)?;
        let page: SearchPage = serde_json::from_slice(&body).map_err(|err| SearchError::Json {
            message: format!(
                "error decoding response body: {err}; body preview: {}",
                body_preview(&body)
            ),
        })?;

        debug!(
            %correlation_id,
            total = page.total_count,
            items = page.items.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "search succeeded"
        );

        let mut issues = Vec::with_capacity(page.items.len());
        for item in page.items {
            if item.pull_request.is_some() {
                debug!(id = item.id, "skipping pull request in search results");
                continue;
            }
            issues.push(Issue::try_from(item)?);
        }
        Ok(issues)
    }
}

fn body_preview(body: &[u8]) -> String {
    if body.is_empty() {
        return "<empty>".to_string();
    }
    let end = body.len().min(BODY_PREVIEW_LIMIT);
    let mut preview = String::from_utf8_lossy(&body[..end]).to_string();
    if body.len() > BODY_PREVIEW_LIMIT {
        preview.push_str("...");
    }
    preview.replace('\n', "\\n")
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    items: Vec<RawIssue>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    id: u64,
    title: String,
    html_url: String,
    #[serde(default)]
    body: Option<String>,
    created_at: DateTime<Utc>,
    user: RawUser,
    repository_url: String,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

impl TryFrom<RawIssue> for Issue {
    type Error = Error;

    fn try_from(value: RawIssue) -> Result<Self> {
        let repository = repo_full_name(&value.repository_url).ok_or_else(|| {
            Error::Search(SearchError::InvalidField {
                field: "repository_url",
                message: format!("cannot derive owner/name from {}", value.repository_url),
            })
        })?;
        Ok(Self {
            id: value.id,
            title: value.title,
            html_url: value.html_url,
            repository,
            user: value.user.login,
            created_at: value.created_at,
            body: value.body.unwrap_or_default(),
        })
    }
}

/// `https://api.github.com/repos/rust-lang/rust` → `rust-lang/rust`.
fn repo_full_name(repository_url: &str) -> Option<String> {
    let (_, tail) = repository_url.split_once("/repos/")?;
    let mut parts = tail.split('/');
    let owner = parts.next()?;
    let name = parts.next()?;
    if owner.is_empty() || name.is_empty() {
        return None;
    }
    Some(format!("{owner}/{name}"))
}

#[cfg(test)]
mod tests {
    use super::{body_preview, repo_full_name};

    #[test]
    fn repo_full_name_strips_api_prefix() {
        assert_eq!(
            repo_full_name("https://api.github.com/repos/rust-lang/rust").as_deref(),
            Some("rust-lang/rust")
        );
    }

    #[test]
    fn repo_full_name_rejects_malformed_urls() {
        assert_eq!(repo_full_name("https://api.github.com/rust-lang/rust"), None);
        assert_eq!(repo_full_name("https://api.github.com/repos/"), None);
        assert_eq!(repo_full_name("https://api.github.com/repos/only-owner"), None);
    }

    #[test]
    fn body_preview_truncates_and_escapes() {
        let long = vec![b'a'; 300];
        let preview = body_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(body_preview(b"line1\nline2"), "line1\\nline2");
        assert_eq!(body_preview(b""), "<empty>");
    }
}
