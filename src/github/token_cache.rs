//! Installation access token caching.
//!
//! Installation tokens are valid for one hour. The cache hands out the current
//! token until it is within `buffer` of expiry, then refreshes it. Concurrent
//! callers that find the token stale share one refresh: exactly one JWT is
//! signed and exchanged, and every waiter receives that exchange's outcome.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::error::AuthError;
use super::models::InstallationTokenResponse;
use super::signer::{KeySigner, SignedAssertion};

/// Exchanges an app JWT for an installation access token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(
        &self,
        assertion: &SignedAssertion,
        installation_id: i64,
    ) -> Result<InstallationTokenResponse, AuthError>;
}

/// A cached installation access token.
#[derive(Clone)]
pub struct InstallationToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<InstallationToken, AuthError>>>;

struct CacheState {
    token: Option<InstallationToken>,
    /// Refresh currently in flight, tagged so only its own waiters clear it
    refresh: Option<(u64, RefreshFuture)>,
    next_refresh_id: u64,
}

pub struct InstallationTokenCache {
    installation_id: i64,
    signer: Arc<KeySigner>,
    exchange: Arc<dyn TokenExchange>,
    buffer: Duration,
    state: Mutex<CacheState>,
}

impl InstallationTokenCache {
    pub fn new(
        installation_id: i64,
        signer: Arc<KeySigner>,
        exchange: Arc<dyn TokenExchange>,
        buffer: Duration,
    ) -> Self {
        Self {
            installation_id,
            signer,
            exchange,
            buffer,
            state: Mutex::new(CacheState {
                token: None,
                refresh: None,
                next_refresh_id: 0,
            }),
        }
    }

    pub fn installation_id(&self) -> i64 {
        self.installation_id
    }

    fn is_fresh(&self, token: &InstallationToken, now: DateTime<Utc>) -> bool {
        now < token.expires_at - self.buffer
    }

    /// Return a token that stays valid for at least `buffer`, refreshing it
    /// if needed.
    pub async fn get_token(&self) -> Result<String, AuthError> {
        let (refresh_id, refresh) = {
            let mut state = self.state.lock();

            if let Some(token) = &state.token {
                if self.is_fresh(token, Utc::now()) {
                    debug!("Using cached installation token");
                    return Ok(token.value.clone());
                }
            }

            match &state.refresh {
                Some((id, refresh)) => {
                    debug!("Joining in-flight installation token refresh");
                    (*id, refresh.clone())
                }
                None => {
                    let id = state.next_refresh_id;
                    state.next_refresh_id += 1;
                    let refresh = refresh_token(
                        self.installation_id,
                        self.signer.clone(),
                        self.exchange.clone(),
                    )
                    .boxed()
                    .shared();
                    state.refresh = Some((id, refresh.clone()));
                    (id, refresh)
                }
            }
        };

        let result = refresh.await;

        let mut state = self.state.lock();
        if matches!(&state.refresh, Some((id, _)) if *id == refresh_id) {
            state.refresh = None;
            if let Ok(token) = &result {
                state.token = Some(token.clone());
            }
        }

        result.map(|token| token.value)
    }

    /// Drop the cached token so the next caller fetches a new one. Called
    /// after GitHub rejects the current token with 401/403.
    pub fn invalidate(&self) {
        info!("Invalidating cached installation token");
        self.state.lock().token = None;
    }

    /// Expiry of the cached token, if any.
    pub(crate) fn cached_expiry(&self) -> Option<DateTime<Utc>> {
        self.state.lock().token.as_ref().map(|t| t.expires_at)
    }
}

async fn refresh_token(
    installation_id: i64,
    signer: Arc<KeySigner>,
    exchange: Arc<dyn TokenExchange>,
) -> Result<InstallationToken, AuthError> {
    info!(
        installation_id,
        "Requesting new installation access token"
    );

    let assertion = signer.sign()?;
    let response = exchange.exchange(&assertion, installation_id).await?;

    if response.token.is_empty() {
        warn!(installation_id, "GitHub returned an empty installation token");
        return Err(AuthError::token_acquisition("empty token in response"));
    }

    let expires_at = DateTime::parse_from_rfc3339(&response.expires_at)
        .map_err(|e| {
            AuthError::token_acquisition(format!(
                "unparsable expires_at {:?}: {e}",
                response.expires_at
            ))
        })?
        .with_timezone(&Utc);

    info!(installation_id, %expires_at, "Obtained installation access token");

    Ok(InstallationToken {
        value: response.token,
        expires_at,
    })
}
