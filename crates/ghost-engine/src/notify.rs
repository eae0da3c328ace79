//! Notification of dispatch outcomes.
//!
//! When a record carries a notification URL, the outcome of its dispatch —
//! the captured response, or a synthesized failure message — is POSTed there
//! under the notification pool's concurrency bound. Notification failures
//! are counted on their own channel and never touch request-level counters.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::{debug, warn};

use ghost_core::{RequestId, ScheduledRequest};

use crate::{
    dispatch::DispatchResponse,
    engine::{EngineEvent, WorkerContext},
    error::DispatchError,
};

/// A follow-up POST of a dispatched record's outcome to its callback URL.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Id of the record this notification reports on.
    pub request_id: RequestId,
    /// Callback URL the payload is POSTed to.
    pub notify_url: String,
    /// User-supplied headers applied to the POST.
    pub headers: HashMap<String, Vec<String>>,
    /// Content type of the payload, when known.
    pub content_type: Option<String>,
    /// Payload: the original response body, or the failure message.
    pub body: Bytes,
}

impl Notification {
    /// Builds the success notification for a record, if it wants one.
    pub fn on_success(request: &ScheduledRequest, response: &DispatchResponse) -> Option<Self> {
        let notify_url = request.notify_url.clone()?;
        Some(Self {
            request_id: request.id,
            notify_url,
            headers: request.notify_headers.clone(),
            content_type: response.content_type.clone(),
            body: response.body.clone(),
        })
    }

    /// Builds the failure notification for a record, if it wants one.
    ///
    /// The payload names the record id so the receiver can correlate it.
    pub fn on_failure(request: &ScheduledRequest, error: &DispatchError) -> Option<Self> {
        let notify_url = request.notify_url.clone()?;
        let body = format!("Failed to dispatch request [{}]: {error}\n", request.id);
        Some(Self {
            request_id: request.id,
            notify_url,
            headers: request.notify_headers.clone(),
            content_type: Some("text/plain".to_string()),
            body: Bytes::from(body),
        })
    }
}

/// Notification worker: acquire a slot, POST, release, account, complete.
///
/// The slot is released before the counter event is sent, and the counter
/// event precedes `Complete` — each exactly once per attempt.
pub(crate) async fn run(ctx: WorkerContext, notification: Notification) {
    let id = notification.request_id;

    let Ok(permit) = ctx.notify_slots.clone().acquire_owned().await else {
        // Pool closed during shutdown; the record is dropped with its task.
        return;
    };

    let result = ctx.client.post_notification(&notification).await;
    drop(permit);

    match result {
        Ok(status) => {
            debug!(%id, status, url = %notification.notify_url, "notification delivered");
            let _ = ctx.events.send(EngineEvent::NotificationServed);
        }
        Err(error) => {
            warn!(%id, url = %notification.notify_url, error = %error, "notification failed");
            let _ = ctx.events.send(EngineEvent::NotificationErrored);
        }
    }

    let _ = ctx.events.send(EngineEvent::Complete(id));
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn request_with_notify() -> ScheduledRequest {
        let mut request = ScheduledRequest::new("GET", "http://target/x", Utc::now());
        request.notify_url = Some("http://callback/notify".to_string());
        request.notify_headers.insert("X-Auth".to_string(), vec!["secret".to_string()]);
        request
    }

    #[test]
    fn success_copies_response_body_and_content_type() {
        let request = request_with_notify();
        let response = DispatchResponse {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: Bytes::from_static(b"{\"ok\":true}"),
        };

        let notification = Notification::on_success(&request, &response).unwrap();
        assert_eq!(notification.request_id, request.id);
        assert_eq!(notification.notify_url, "http://callback/notify");
        assert_eq!(notification.content_type.as_deref(), Some("application/json"));
        assert_eq!(notification.body, response.body);
        assert_eq!(notification.headers.get("X-Auth").unwrap(), &vec!["secret".to_string()]);
    }

    #[test]
    fn failure_payload_names_the_record_id() {
        let request = request_with_notify();
        let error = DispatchError::transport("connection refused");

        let notification = Notification::on_failure(&request, &error).unwrap();
        let body = String::from_utf8(notification.body.to_vec()).unwrap();
        assert!(body.contains("Failed"));
        assert!(body.contains(&request.id.to_string()));
        assert_eq!(notification.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn records_without_notify_url_produce_nothing() {
        let mut request = request_with_notify();
        request.notify_url = None;

        let response =
            DispatchResponse { status: 200, content_type: None, body: Bytes::new() };
        assert!(Notification::on_success(&request, &response).is_none());
        assert!(Notification::on_failure(&request, &DispatchError::transport("x")).is_none());
    }
}
