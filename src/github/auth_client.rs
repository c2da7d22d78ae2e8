//! Exchange of app JWTs for installation access tokens over HTTP.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};

use super::error::AuthError;
use super::models::InstallationTokenResponse;
use super::signer::SignedAssertion;
use super::token_cache::TokenExchange;
use super::{GITHUB_ACCEPT, GITHUB_API_VERSION, GITHUB_API_VERSION_HEADER, USER_AGENT_VALUE};

/// Calls `POST /app/installations/{id}/access_tokens`.
///
/// This client authenticates with the app JWT, so it must not go through
/// [`GitHubClient`](super::GitHubClient), which injects installation tokens.
pub struct GitHubTokenExchange {
    client: reqwest::Client,
    base_url: String,
}

impl GitHubTokenExchange {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TokenExchange for GitHubTokenExchange {
    async fn exchange(
        &self,
        assertion: &SignedAssertion,
        installation_id: i64,
    ) -> Result<InstallationTokenResponse, AuthError> {
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.base_url, installation_id
        );

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", assertion.token))
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(GITHUB_API_VERSION_HEADER, GITHUB_API_VERSION)
            .send()
            .await
            .map_err(|e| {
                AuthError::token_acquisition(format!("request to {url} failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::token_acquisition(format!(
                "GitHub API error getting installation token: {} - {}",
                status, body
            )));
        }

        response
            .json::<InstallationTokenResponse>()
            .await
            .map_err(|e| {
                AuthError::token_acquisition(format!(
                    "Failed to parse installation token response: {e}"
                ))
            })
    }
}
