//! Request and response shapes for the GitHub REST endpoints we call.
//!
//! Unknown fields are ignored so new GitHub fields never break parsing.

use serde::{Deserialize, Serialize};

/// Response from `POST /app/installations/{id}/access_tokens`.
#[derive(Clone, Deserialize)]
pub struct InstallationTokenResponse {
    pub token: String,
    /// ISO-8601 timestamp
    pub expires_at: String,
}

impl std::fmt::Debug for InstallationTokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationTokenResponse")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A file changed in a pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    /// "added", "modified", "removed", "renamed", ...
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub changes: u64,
    pub patch: Option<String>,
    pub raw_url: Option<String>,
    pub previous_filename: Option<String>,
}

/// Response from `GET /repos/{owner}/{repo}/contents/{path}`.
#[derive(Debug, Clone, Deserialize)]
pub struct FileContent {
    pub name: Option<String>,
    pub path: Option<String>,
    pub sha: Option<String>,
    pub size: Option<u64>,
    pub encoding: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
}

/// Side of the diff a review comment is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiffSide {
    Left,
    Right,
}

/// Body for `POST /repos/{owner}/{repo}/pulls/{n}/comments`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateReviewComment {
    pub body: String,
    pub commit_id: String,
    pub path: String,
    /// Last line of the range the comment applies to
    pub line: u64,
    pub side: DiffSide,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_side: Option<DiffSide>,
}

impl CreateReviewComment {
    /// Single-line comment on the new version of the file.
    pub fn single_line(
        body: impl Into<String>,
        commit_id: impl Into<String>,
        path: impl Into<String>,
        line: u64,
    ) -> Self {
        Self {
            body: body.into(),
            commit_id: commit_id.into(),
            path: path.into(),
            line,
            side: DiffSide::Right,
            start_line: None,
            start_side: None,
        }
    }

    /// Extend the comment to cover `start_line..=line`.
    pub fn with_range_start(mut self, start_line: u64, start_side: DiffSide) -> Self {
        self.start_line = Some(start_line);
        self.start_side = Some(start_side);
        self
    }
}

/// A review comment as returned by GitHub.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewComment {
    pub id: u64,
    pub node_id: Option<String>,
    pub body: Option<String>,
    pub path: Option<String>,
    pub line: Option<u64>,
    pub side: Option<DiffSide>,
    pub commit_id: Option<String>,
    pub original_commit_id: Option<String>,
    pub html_url: Option<String>,
    pub url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_comment_omits_range() {
        let comment = CreateReviewComment::single_line("nit", "abc123", "src/lib.rs", 12);
        let json = serde_json::to_value(&comment).unwrap();

        assert_eq!(json["side"], "RIGHT");
        assert_eq!(json["line"], 12);
        assert!(json.get("start_line").is_none());
        assert!(json.get("start_side").is_none());
    }

    #[test]
    fn test_multi_line_comment() {
        let comment = CreateReviewComment::single_line("refactor", "abc123", "src/lib.rs", 20)
            .with_range_start(15, DiffSide::Right);
        let json = serde_json::to_value(&comment).unwrap();

        assert_eq!(json["start_line"], 15);
        assert_eq!(json["start_side"], "RIGHT");
    }

    #[test]
    fn test_pull_request_file_tolerates_unknown_fields() {
        let file: PullRequestFile = serde_json::from_value(serde_json::json!({
            "sha": "bbcd538c8e72b8c175046e27cc8f907076331401",
            "filename": "file1.txt",
            "status": "added",
            "additions": 103,
            "deletions": 21,
            "changes": 124,
            "blob_url": "https://github.com/octocat/Hello-World/blob/6dcb09b/file1.txt",
            "patch": "@@ -132,7 +132,7 @@ module Test @@ -1000,7 +1000,7 @@ module Test"
        }))
        .unwrap();

        assert_eq!(file.filename, "file1.txt");
        assert_eq!(file.additions, 103);
        assert!(file.previous_filename.is_none());
    }
}
