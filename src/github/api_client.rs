//! GitHub API client for pull request operations.
//!
//! Every request is authenticated with an installation access token taken
//! from the shared [`InstallationTokenCache`]. A 401/403 answer invalidates
//! the cached token so the next request starts with a fresh one.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::GitHubError;
use super::models::{CreateReviewComment, FileContent, PullRequestFile, ReviewComment};
use super::token_cache::InstallationTokenCache;
use super::{GITHUB_ACCEPT, GITHUB_API_VERSION, GITHUB_API_VERSION_HEADER, USER_AGENT_VALUE};

const FILES_PER_PAGE: usize = 100;

/// Read access to pull requests, as needed by the processing pipeline.
#[async_trait]
pub trait PullRequestApi: Send + Sync {
    async fn list_pull_request_files(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<PullRequestFile>, GitHubError>;
}

/// GitHub API client for installation-based operations.
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: Url,
    tokens: Arc<InstallationTokenCache>,
}

impl GitHubClient {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        tokens: Arc<InstallationTokenCache>,
    ) -> Result<Self, GitHubError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| GitHubError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(GitHubError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            client,
            base_url,
            tokens,
        })
    }

    /// Build `<base>/<segments...>`, percent-encoding each segment.
    fn endpoint<'a, I>(&self, segments: I) -> Result<Url, GitHubError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GitHubError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Attach auth and API headers, send, and map failures.
    async fn send(&self, request: RequestBuilder) -> Result<Response, GitHubError> {
        let token = self.tokens.get_token().await?;

        let response = request
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(GITHUB_API_VERSION_HEADER, GITHUB_API_VERSION)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let err = GitHubError::api_error(status.as_u16(), body);
        if err.is_auth_rejection() {
            warn!(status = status.as_u16(), "GitHub rejected installation token");
            self.tokens.invalidate();
        }
        Err(err)
    }

    async fn get<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GitHubError> {
        let response = self.send(request).await?;
        response
            .json()
            .await
            .map_err(|e| GitHubError::InvalidResponse(e.to_string()))
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, GitHubError> {
        let response = self.send(self.client.post(url).json(body)).await?;
        response
            .json()
            .await
            .map_err(|e| GitHubError::InvalidResponse(e.to_string()))
    }

    /// List all files changed in a pull request, following pagination.
    pub async fn list_pull_request_files(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<PullRequestFile>, GitHubError> {
        info!("Fetching files for PR #{} in {}/{}", number, owner, repo);

        let number = number.to_string();
        let url = self.endpoint(["repos", owner, repo, "pulls", number.as_str(), "files"])?;

        let mut all_files = Vec::new();
        let mut page = 1u32;
        loop {
            let request = self.client.get(url.clone()).query(&[
                ("per_page", FILES_PER_PAGE.to_string()),
                ("page", page.to_string()),
            ]);
            let files: Vec<PullRequestFile> = self.get(request).await?;
            let last_page = files.len() < FILES_PER_PAGE;
            all_files.extend(files);
            if last_page {
                break;
            }
            page += 1;
        }

        info!("Found {} changed files in PR #{}", all_files.len(), number);
        Ok(all_files)
    }

    /// Fetch a file at a given ref and return its decoded text.
    pub async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<String, GitHubError> {
        debug!(
            "Fetching content for file: {} from ref: {} in {}/{}",
            path, git_ref, owner, repo
        );

        let url = self.endpoint(
            ["repos", owner, repo, "contents"]
                .into_iter()
                .chain(path.split('/').filter(|s| !s.is_empty())),
        )?;
        let content: FileContent = self
            .get(self.client.get(url).query(&[("ref", git_ref)]))
            .await?;

        let decoded = decode_content(&content)?;
        debug!("Fetched content for file: {} ({} bytes)", path, decoded.len());
        Ok(decoded)
    }

    /// Post an inline review comment on a pull request diff.
    pub async fn create_review_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        comment: &CreateReviewComment,
    ) -> Result<ReviewComment, GitHubError> {
        let number = number.to_string();
        let url = self.endpoint(["repos", owner, repo, "pulls", number.as_str(), "comments"])?;
        let created: ReviewComment = self.post(url, comment).await?;
        info!(
            comment_id = created.id,
            path = %comment.path,
            line = comment.line,
            "Created review comment on PR #{}",
            number
        );
        Ok(created)
    }
}

#[async_trait]
impl PullRequestApi for GitHubClient {
    async fn list_pull_request_files(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<PullRequestFile>, GitHubError> {
        GitHubClient::list_pull_request_files(self, owner, repo, number).await
    }
}

/// Decode base64 file content. GitHub wraps the encoded text with newlines.
fn decode_content(content: &FileContent) -> Result<String, GitHubError> {
    if let Some(encoding) = content.encoding.as_deref() {
        if encoding != "base64" {
            return Err(GitHubError::Decode(format!(
                "unsupported encoding {encoding:?}"
            )));
        }
    }

    let encoded = content
        .content
        .as_deref()
        .ok_or_else(|| GitHubError::Decode("response has no content".to_string()))?;
    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();

    let bytes = BASE64
        .decode(cleaned)
        .map_err(|e| GitHubError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| GitHubError::Decode(e.to_string()))
}
