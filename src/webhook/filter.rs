//! Eligibility checks for pull request events and changed files.

use std::fmt;

use super::payload::WebhookEvent;

/// Why a pull request event was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Fork,
    Draft,
    SelfAuthored,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Fork => "fork",
            SkipReason::Draft => "draft",
            SkipReason::SelfAuthored => "self-authored",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First failing check, in order: fork, draft, self-authored.
///
/// `bot_name` is the bare app name; the bot's own commits arrive with the
/// author login `<bot_name>[bot]`.
pub fn skip_reason(event: &WebhookEvent, bot_name: &str) -> Option<SkipReason> {
    if event.is_fork {
        return Some(SkipReason::Fork);
    }
    if event.is_draft {
        return Some(SkipReason::Draft);
    }
    if is_bot_login(&event.author_login, bot_name) {
        return Some(SkipReason::SelfAuthored);
    }
    None
}

/// `(true, "")` when the event should be processed, else `(false, reason)`.
pub fn should_process(event: &WebhookEvent, bot_name: &str) -> (bool, &'static str) {
    match skip_reason(event, bot_name) {
        Some(reason) => (false, reason.as_str()),
        None => (true, ""),
    }
}

/// Only added and modified files are reviewed.
pub fn should_process_file(status: &str) -> bool {
    matches!(status, "added" | "modified")
}

fn is_bot_login(login: &str, bot_name: &str) -> bool {
    login
        .strip_suffix("[bot]")
        .is_some_and(|name| name == bot_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_event;

    const BOT: &str = "pr-review-bot";

    fn event(author: &str) -> WebhookEvent {
        let mut event = sample_event(1);
        event.author_login = author.to_string();
        event
    }

    #[test]
    fn test_regular_pr_accepted() {
        assert_eq!(should_process(&event("alice"), BOT), (true, ""));
    }

    #[test]
    fn test_fork_rejected_before_draft() {
        let mut e = event("alice");
        e.is_fork = true;
        e.is_draft = true;
        assert_eq!(should_process(&e, BOT), (false, "fork"));
    }

    #[test]
    fn test_draft_rejected() {
        let mut e = event("alice");
        e.is_draft = true;
        assert_eq!(should_process(&e, BOT), (false, "draft"));
        assert_eq!(skip_reason(&e, BOT), Some(SkipReason::Draft));
    }

    #[test]
    fn test_self_authored_rejected() {
        let e = event("pr-review-bot[bot]");
        assert_eq!(should_process(&e, BOT), (false, "self-authored"));
    }

    #[test]
    fn test_bot_name_without_suffix_is_not_self() {
        // A human account that happens to share the app's name
        assert_eq!(should_process(&event("pr-review-bot"), BOT), (true, ""));
        assert_eq!(should_process(&event("other-bot[bot]"), BOT), (true, ""));
    }

    #[test]
    fn test_file_status_filter() {
        assert!(should_process_file("added"));
        assert!(should_process_file("modified"));
        assert!(!should_process_file("removed"));
        assert!(!should_process_file("renamed"));
        assert!(!should_process_file("copied"));
        assert!(!should_process_file("unchanged"));
        assert!(!should_process_file("Added"));
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::SelfAuthored.to_string(), "self-authored");
    }
}
