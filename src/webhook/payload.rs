//! Pull request webhook payloads.
//!
//! The raw payload shapes keep every field optional and ignore unknown keys,
//! so new fields GitHub adds never break parsing. [`WebhookEvent`] is the
//! validated view the rest of the pipeline works with.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Invalid webhook JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Webhook payload is missing {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub action: Option<String>,
    pub number: Option<u64>,
    pub pull_request: Option<PullRequest>,
    pub repository: Option<Repository>,
    pub installation: Option<Installation>,
    pub sender: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub id: Option<u64>,
    pub number: Option<u64>,
    pub title: Option<String>,
    pub state: Option<String>,
    pub draft: Option<bool>,
    pub head: Option<Branch>,
    pub base: Option<Branch>,
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Branch {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub sha: Option<String>,
    pub repo: Option<Repository>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub owner: Option<User>,
    pub private: Option<bool>,
    pub fork: Option<bool>,
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: Option<u64>,
    pub login: Option<String>,
    #[serde(rename = "type")]
    pub user_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Installation {
    pub id: Option<i64>,
}

/// Head of a pull request: branch name and commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRef {
    pub ref_name: String,
    pub sha: String,
}

/// A pull request delivery reduced to what filtering and processing need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub action: String,
    pub pull_request_number: u64,
    pub repo_owner: String,
    pub repo_name: String,
    pub head_ref: CommitRef,
    pub is_draft: bool,
    pub is_fork: bool,
    pub author_login: String,
    pub installation_id: Option<i64>,
}

impl WebhookEvent {
    /// Parse a raw `pull_request` delivery body.
    pub fn parse(body: &[u8]) -> Result<Self, PayloadError> {
        let payload: WebhookPayload = serde_json::from_slice(body)?;
        Self::from_payload(payload)
    }

    pub fn from_payload(payload: WebhookPayload) -> Result<Self, PayloadError> {
        let action = payload.action.ok_or(PayloadError::MissingField("action"))?;
        let pr = payload
            .pull_request
            .ok_or(PayloadError::MissingField("pull_request"))?;
        let repository = payload
            .repository
            .ok_or(PayloadError::MissingField("repository"))?;

        let pull_request_number = pr
            .number
            .or(payload.number)
            .ok_or(PayloadError::MissingField("pull_request.number"))?;
        let repo_name = repository
            .name
            .ok_or(PayloadError::MissingField("repository.name"))?;
        let repo_owner = repository
            .owner
            .and_then(|o| o.login)
            .ok_or(PayloadError::MissingField("repository.owner.login"))?;
        let author_login = pr
            .user
            .and_then(|u| u.login)
            .ok_or(PayloadError::MissingField("pull_request.user.login"))?;

        let head = pr.head.ok_or(PayloadError::MissingField("pull_request.head"))?;
        // A deleted fork leaves `head.repo` null; that is not treated as a fork.
        let is_fork = head
            .repo
            .as_ref()
            .and_then(|r| r.fork)
            .unwrap_or(false);
        let head_ref = CommitRef {
            ref_name: head
                .git_ref
                .ok_or(PayloadError::MissingField("pull_request.head.ref"))?,
            sha: head
                .sha
                .ok_or(PayloadError::MissingField("pull_request.head.sha"))?,
        };

        Ok(Self {
            action,
            pull_request_number,
            repo_owner,
            repo_name,
            head_ref,
            is_draft: pr.draft.unwrap_or(false),
            is_fork,
            author_login,
            installation_id: payload.installation.and_then(|i| i.id),
        })
    }

    pub fn repo_full_name(&self) -> String {
        format!("{}/{}", self.repo_owner, self.repo_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::pull_request_payload;

    #[test]
    fn test_parse_pull_request_event() {
        let body = serde_json::to_vec(&pull_request_payload("opened", 42, "alice")).unwrap();
        let event = WebhookEvent::parse(&body).unwrap();

        assert_eq!(event.action, "opened");
        assert_eq!(event.pull_request_number, 42);
        assert_eq!(event.repo_owner, "octocat");
        assert_eq!(event.repo_name, "hello-world");
        assert_eq!(event.repo_full_name(), "octocat/hello-world");
        assert_eq!(event.author_login, "alice");
        assert_eq!(event.head_ref.ref_name, "feature-branch");
        assert_eq!(event.head_ref.sha, "6dcb09b5b57875f334f61aebed695e2e4193db5e");
        assert!(!event.is_draft);
        assert!(!event.is_fork);
        assert_eq!(event.installation_id, Some(678));
    }

    #[test]
    fn test_fork_and_draft_flags() {
        let mut payload = pull_request_payload("synchronize", 7, "bob");
        payload["pull_request"]["draft"] = serde_json::json!(true);
        payload["pull_request"]["head"]["repo"]["fork"] = serde_json::json!(true);

        let event = WebhookEvent::parse(&serde_json::to_vec(&payload).unwrap()).unwrap();
        assert!(event.is_draft);
        assert!(event.is_fork);
    }

    #[test]
    fn test_null_head_repo_is_not_fork() {
        let mut payload = pull_request_payload("opened", 7, "bob");
        payload["pull_request"]["head"]["repo"] = serde_json::Value::Null;

        let event = WebhookEvent::parse(&serde_json::to_vec(&payload).unwrap()).unwrap();
        assert!(!event.is_fork);
    }

    #[test]
    fn test_missing_pull_request() {
        let err = WebhookEvent::parse(br#"{"action": "opened"}"#).unwrap_err();
        assert!(matches!(err, PayloadError::MissingField("pull_request")));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            WebhookEvent::parse(b"{not json"),
            Err(PayloadError::Json(_))
        ));
    }
}
