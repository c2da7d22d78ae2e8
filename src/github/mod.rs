//! GitHub integration for the GitHub App.
//!
//! This module provides:
//! - JWT signing for GitHub App authentication
//! - Installation access token exchange and caching
//! - GitHub API client for pull request operations

pub mod api_client;
pub mod auth_client;
pub mod error;
pub mod models;
pub mod signer;
pub mod token_cache;

pub use api_client::{GitHubClient, PullRequestApi};
pub use auth_client::GitHubTokenExchange;
pub use error::{AuthError, GitHubError};
pub use signer::{KeySigner, SignedAssertion};
pub use token_cache::{InstallationToken, InstallationTokenCache, TokenExchange};

pub(crate) const GITHUB_ACCEPT: &str = "application/vnd.github+json";
pub(crate) const GITHUB_API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
pub(crate) const GITHUB_API_VERSION: &str = "2022-11-28";
pub(crate) const USER_AGENT_VALUE: &str = "pr-review-bot";
