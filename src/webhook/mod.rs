//! Inbound GitHub webhooks: signature verification, payload parsing and
//! pull request eligibility.

pub mod filter;
pub mod payload;
pub mod verifier;

pub use filter::{should_process, should_process_file, skip_reason, SkipReason};
pub use payload::{CommitRef, PayloadError, WebhookEvent, WebhookPayload};
pub use verifier::{compute_signature, verify_signature};

pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
pub const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

pub const PULL_REQUEST_EVENT: &str = "pull_request";

/// Pull request actions that trigger a review.
pub const SUPPORTED_ACTIONS: [&str; 2] = ["opened", "synchronize"];

pub fn is_supported_action(action: &str) -> bool {
    SUPPORTED_ACTIONS.contains(&action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_actions() {
        assert!(is_supported_action("opened"));
        assert!(is_supported_action("synchronize"));
        assert!(!is_supported_action("reopened"));
        assert!(!is_supported_action("closed"));
        assert!(!is_supported_action(""));
    }
}
