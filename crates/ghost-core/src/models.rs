//! Scheduled request records and strongly-typed identifiers.
//!
//! A [`ScheduledRequest`] is the unit of work the engine carries from
//! admission to dispatch. Records are immutable after admission; only their
//! presence in the pending index changes over their lifetime.

use std::{collections::HashMap, fmt};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Timestamp layout used for all operator-facing status lines (UTC).
pub const STATUS_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Strongly-typed request identifier.
///
/// Wraps a UUID to prevent mixing with other id types. Generated once at
/// admission and carried through dispatch, notification, and completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Creates a new random request id.
    ///
    /// Uses UUID v4 so ids are unique without coordination.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A deferred HTTP request scheduled for later replay.
///
/// Captured from an inbound call by the ingress adapter and held in the
/// engine's pending index until one outbound attempt completes. `execute_at`
/// may lie in the past, which simply means the record is due immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledRequest {
    /// Unique identifier, generated at admission.
    pub id: RequestId,

    /// When the record was admitted.
    pub created_at: DateTime<Utc>,

    /// When the record becomes due for dispatch.
    pub execute_at: DateTime<Utc>,

    /// HTTP method token inherited from the inbound request.
    pub method: String,

    /// Absolute target URL the request is replayed against.
    pub url: String,

    /// Optional callback URL that receives the dispatch outcome.
    pub notify_url: Option<String>,

    /// Headers to replay, keyed by name with ordered values.
    pub headers: HashMap<String, Vec<String>>,

    /// Headers applied to the notification POST.
    pub notify_headers: HashMap<String, Vec<String>>,

    /// Captured request body, possibly empty.
    pub body: Bytes,
}

impl ScheduledRequest {
    /// Creates a record with a fresh id, stamping `created_at` with the
    /// current wall clock.
    pub fn new(
        method: impl Into<String>,
        url: impl Into<String>,
        execute_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RequestId::new(),
            created_at: Utc::now(),
            execute_at,
            method: method.into(),
            url: url.into(),
            notify_url: None,
            headers: HashMap::new(),
            notify_headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    /// Whether the record is due for dispatch at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.execute_at <= now
    }
}

impl fmt::Display for ScheduledRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}> ({}) {} @ {}",
            self.id,
            self.method,
            self.url,
            self.execute_at.format(STATUS_TIME_FORMAT)
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn request_ids_are_unique() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn past_execute_at_is_due() {
        let now = Utc::now();
        let request = ScheduledRequest::new("GET", "http://localhost/ok", now - Duration::seconds(1));
        assert!(request.is_due(now));
    }

    #[test]
    fn future_execute_at_is_not_due() {
        let now = Utc::now();
        let request = ScheduledRequest::new("GET", "http://localhost/ok", now + Duration::hours(1));
        assert!(!request.is_due(now));
    }

    #[test]
    fn execute_at_exactly_now_is_due() {
        let now = Utc::now();
        let request = ScheduledRequest::new("GET", "http://localhost/ok", now);
        assert!(request.is_due(now));
    }

    #[test]
    fn display_names_id_method_and_target() {
        let request = ScheduledRequest::new("POST", "http://example.com/hook", Utc::now());
        let rendered = request.to_string();
        assert!(rendered.contains(&request.id.to_string()));
        assert!(rendered.contains("(POST)"));
        assert!(rendered.contains("http://example.com/hook"));
    }
}
