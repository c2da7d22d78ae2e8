//! Shared fixtures for unit tests.

use serde_json::{json, Value};

use crate::webhook::{compute_signature, CommitRef, WebhookEvent};

/// PKCS#1 RSA private key used only by tests.
pub const TEST_PRIVATE_KEY: &str = include_str!("../testdata/app-key.pem");
/// SPKI public half of [`TEST_PRIVATE_KEY`].
pub const TEST_PUBLIC_KEY: &str = include_str!("../testdata/app-key.pub.pem");
/// P-256 key, valid PEM but not RSA.
pub const TEST_EC_KEY: &str = include_str!("../testdata/ec-key.pem");

/// `X-Hub-Signature-256` header value for a body.
pub fn sign(body: &[u8], secret: &str) -> String {
    compute_signature(body, secret.as_bytes())
}

/// A trimmed-down `pull_request` delivery as GitHub sends it.
pub fn pull_request_payload(action: &str, number: u64, author: &str) -> Value {
    json!({
        "action": action,
        "number": number,
        "pull_request": {
            "id": 1_000_000 + number,
            "number": number,
            "title": "Add feature",
            "state": "open",
            "draft": false,
            "user": { "id": 1, "login": author, "type": "User" },
            "head": {
                "ref": "feature-branch",
                "sha": "6dcb09b5b57875f334f61aebed695e2e4193db5e",
                "repo": {
                    "id": 1296269,
                    "name": "hello-world",
                    "full_name": "octocat/hello-world",
                    "owner": { "id": 583231, "login": "octocat", "type": "User" },
                    "private": false,
                    "fork": false
                }
            },
            "base": {
                "ref": "main",
                "sha": "e5bd3914e2e596debea16f433f57875b5b90bcd6"
            }
        },
        "repository": {
            "id": 1296269,
            "name": "hello-world",
            "full_name": "octocat/hello-world",
            "owner": { "id": 583231, "login": "octocat", "type": "User" },
            "private": false,
            "fork": false,
            "default_branch": "main"
        },
        "installation": { "id": 678 },
        "sender": { "id": 1, "login": author, "type": "User" }
    })
}

pub fn sample_event(number: u64) -> WebhookEvent {
    WebhookEvent {
        action: "opened".to_string(),
        pull_request_number: number,
        repo_owner: "octocat".to_string(),
        repo_name: "hello-world".to_string(),
        head_ref: CommitRef {
            ref_name: "feature-branch".to_string(),
            sha: "6dcb09b5b57875f334f61aebed695e2e4193db5e".to_string(),
        },
        is_draft: false,
        is_fork: false,
        author_login: "alice".to_string(),
        installation_id: Some(678),
    }
}
