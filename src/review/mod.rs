//! Background processing of accepted pull requests.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use crate::dispatch::EventHandler;
use crate::github::models::PullRequestFile;
use crate::github::PullRequestApi;
use crate::webhook::{should_process_file, WebhookEvent};

/// Outcome of processing one pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewSummary {
    pub total_files: usize,
    pub reviewable: Vec<String>,
    pub skipped: Vec<String>,
}

/// Fetches a pull request's changed files and selects the ones to review.
pub struct PullRequestProcessor {
    api: Arc<dyn PullRequestApi>,
}

impl PullRequestProcessor {
    pub fn new(api: Arc<dyn PullRequestApi>) -> Self {
        Self { api }
    }

    pub async fn process(&self, event: &WebhookEvent) -> anyhow::Result<ReviewSummary> {
        let pr_number = event.pull_request_number;
        tracing::info!(
            "Processing PR #{} in {}/{}",
            pr_number,
            event.repo_owner,
            event.repo_name
        );

        let files = self
            .api
            .list_pull_request_files(&event.repo_owner, &event.repo_name, pr_number)
            .await
            .with_context(|| format!("Failed to fetch files for PR #{}", pr_number))?;

        if files.is_empty() {
            tracing::info!("No files changed in PR #{}", pr_number);
            return Ok(ReviewSummary::default());
        }

        let total_files = files.len();
        let (reviewable, skipped): (Vec<PullRequestFile>, Vec<PullRequestFile>) = files
            .into_iter()
            .partition(|f| should_process_file(&f.status));

        for file in &reviewable {
            tracing::info!(
                pr_number,
                "Reviewable file: {} ({}, +{}/-{})",
                file.filename,
                file.status,
                file.additions,
                file.deletions
            );
        }
        for file in &skipped {
            tracing::debug!(pr_number, "Skipping file {} ({})", file.filename, file.status);
        }

        tracing::info!(
            "Processed PR #{}: {} changed files, {} reviewable",
            pr_number,
            total_files,
            reviewable.len()
        );

        Ok(ReviewSummary {
            total_files,
            reviewable: reviewable.into_iter().map(|f| f.filename).collect(),
            skipped: skipped.into_iter().map(|f| f.filename).collect(),
        })
    }
}

#[async_trait]
impl EventHandler for PullRequestProcessor {
    async fn handle(&self, event: WebhookEvent) -> anyhow::Result<()> {
        self.process(&event).await.map(|_| ())
    }
}
