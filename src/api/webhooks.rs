use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::dispatch::SubmitOutcome;
use crate::webhook::{
    is_supported_action, skip_reason, verify_signature, PayloadError, WebhookEvent,
    WebhookPayload, DELIVERY_HEADER, EVENT_HEADER, PULL_REQUEST_EVENT, SIGNATURE_HEADER,
    SUPPORTED_ACTIONS,
};
use crate::AppState;

use super::error::ApiError;
use super::metrics::record_webhook;

pub const WEBHOOK_ENDPOINT: &str = "/webhook/github";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl WebhookResponse {
    fn ignored(message: impl Into<String>) -> Self {
        Self {
            status: "ignored".to_string(),
            message: message.into(),
            pr_number: None,
            action: None,
        }
    }

    fn accepted(pr_number: u64, action: String) -> Self {
        Self {
            status: "accepted".to_string(),
            message: "Webhook received and processing started".to_string(),
            pr_number: Some(pr_number.to_string()),
            action: Some(action),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Receive a GitHub App webhook delivery.
///
/// The signature is checked against the raw body before anything is parsed.
/// Accepted pull requests are handed to the dispatcher and the response does
/// not wait for processing, except when the dispatcher is saturated.
pub async fn github_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let result = handle_delivery(&state, &headers, &body).await;
    record_webhook(match &result {
        Ok(response) => delivery_result(&response.status),
        Err(e) if e.status() == StatusCode::UNAUTHORIZED => "rejected",
        Err(_) => "error",
    });
    result
}

fn delivery_result(status: &str) -> &'static str {
    if status == "accepted" {
        "accepted"
    } else {
        "ignored"
    }
}

async fn handle_delivery(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let event_type = header_str(headers, EVENT_HEADER);
    let signature = header_str(headers, SIGNATURE_HEADER);
    let delivery = header_str(headers, DELIVERY_HEADER);

    tracing::info!(delivery, "Received GitHub webhook: event={}", event_type);

    if !verify_signature(body, signature, state.webhook_secret.as_bytes()) {
        tracing::warn!(delivery, "GitHub webhook signature verification failed");
        return Err(ApiError::invalid_signature());
    }

    if event_type != PULL_REQUEST_EVENT {
        tracing::debug!("Ignoring event type: {}", event_type);
        return Ok(Json(WebhookResponse::ignored("Not a pull_request event")));
    }

    let payload: WebhookPayload = serde_json::from_slice(body).map_err(PayloadError::from)?;
    let action = payload
        .action
        .clone()
        .ok_or(PayloadError::MissingField("action"))?;

    if !is_supported_action(&action) {
        tracing::debug!("Ignoring pull_request action: {}", action);
        return Ok(Json(WebhookResponse::ignored(format!(
            "Action not supported: {}",
            action
        ))));
    }

    let event = WebhookEvent::from_payload(payload)?;
    let pr_number = event.pull_request_number;

    if let Some(reason) = skip_reason(&event, &state.bot_name) {
        tracing::warn!(
            "Skipping PR #{} in {}: {}",
            pr_number,
            event.repo_full_name(),
            reason
        );
        return Ok(Json(WebhookResponse::ignored(format!(
            "Pull request skipped: {}",
            reason
        ))));
    }

    tracing::info!(
        "Accepted PR #{} in {} (action: {})",
        pr_number,
        event.repo_full_name(),
        action
    );

    let outcome = state.dispatcher.submit(event, state.handler.clone()).await;
    if outcome == SubmitOutcome::RanOnCaller {
        tracing::warn!("PR #{} was processed on the request path", pr_number);
    }

    Ok(Json(WebhookResponse::accepted(pr_number, action)))
}

pub async fn webhook_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "pr-review-bot",
        "endpoint": WEBHOOK_ENDPOINT,
    }))
}

pub async fn webhook_info() -> Json<Value> {
    Json(json!({
        "endpoint": WEBHOOK_ENDPOINT,
        "method": "POST",
        "supported_events": [PULL_REQUEST_EVENT],
        "supported_actions": SUPPORTED_ACTIONS,
        "description": "GitHub App webhook endpoint for automated PR reviews",
    }))
}
