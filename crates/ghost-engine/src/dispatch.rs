//! Outbound HTTP dispatch.
//!
//! Replays a scheduled record against its target URL with a single attempt.
//! Success means the transport produced a response; the HTTP status code is
//! irrelevant to the outcome. Failures are terminal for the record — there
//! are no retries.

use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Method};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{info, warn};

use ghost_core::ScheduledRequest;

use crate::{
    engine::{EngineEvent, WorkerContext},
    error::DispatchError,
    notify::{self, Notification},
};

/// HTTP client used for dispatch and notification traffic.
///
/// Wraps a pooled `reqwest` client. No per-request timeout is configured;
/// the transport's defaults apply.
pub struct DispatchClient {
    client: reqwest::Client,
}

/// Captured outcome of a successful dispatch.
#[derive(Debug, Clone)]
pub struct DispatchResponse {
    /// HTTP status code returned by the target.
    pub status: u16,
    /// Content type of the response, when the target sent one.
    pub content_type: Option<String>,
    /// Response body bytes.
    pub body: Bytes,
}

impl DispatchClient {
    /// Creates a client with the default transport configuration.
    pub fn new() -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ghost/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DispatchError::build(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Performs one outbound attempt for a scheduled record.
    pub async fn send(&self, request: &ScheduledRequest) -> Result<DispatchResponse, DispatchError> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            DispatchError::build(format!("invalid method {:?}: {e}", request.method))
        })?;

        let mut outbound = self.client.request(method, &request.url).body(request.body.clone());
        for (name, values) in &request.headers {
            for value in values {
                outbound = outbound.header(name.as_str(), value.as_str());
            }
        }

        let response = outbound.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?;

        Ok(DispatchResponse { status, content_type, body })
    }

    /// POSTs a notification payload to its callback URL.
    pub async fn post_notification(
        &self,
        notification: &Notification,
    ) -> Result<u16, DispatchError> {
        let mut outbound =
            self.client.post(&notification.notify_url).body(notification.body.clone());
        if let Some(content_type) = &notification.content_type {
            outbound = outbound.header(CONTENT_TYPE, content_type);
        }
        for (name, values) in &notification.headers {
            for value in values {
                outbound = outbound.header(name.as_str(), value.as_str());
            }
        }

        let response = outbound.send().await?;
        Ok(response.status().as_u16())
    }
}

/// Dispatch worker: one outbound attempt, then handoff.
///
/// Holds a dispatch permit for the duration of the attempt. The permit is
/// dropped at the moment the record is handed to notification (or straight
/// to completion), not when the notification POST finishes — the two pools
/// are decoupled.
pub(crate) async fn run(
    ctx: WorkerContext,
    request: ScheduledRequest,
    permit: OwnedSemaphorePermit,
) {
    match ctx.client.send(&request).await {
        Ok(response) => {
            info!(id = %request.id, status = response.status, url = %request.url, "request dispatched");
            let _ = ctx.events.send(EngineEvent::Served);
            finish(ctx, &request, Notification::on_success(&request, &response), permit);
        }
        Err(error) => {
            warn!(id = %request.id, url = %request.url, error = %error, "dispatch failed");
            let _ = ctx.events.send(EngineEvent::Errored);
            finish(ctx, &request, Notification::on_failure(&request, &error), permit);
        }
    }
}

fn finish(
    ctx: WorkerContext,
    request: &ScheduledRequest,
    notification: Option<Notification>,
    permit: OwnedSemaphorePermit,
) {
    drop(permit);
    match notification {
        Some(notification) => {
            tokio::spawn(notify::run(ctx, notification));
        }
        None => {
            let _ = ctx.events.send(EngineEvent::Complete(request.id));
        }
    }
}
