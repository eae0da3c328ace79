//! Ingress adapter: clones an inbound HTTP request into a scheduled record.
//!
//! Control headers (`X-Ghost-*`) carry the target URL, execution time, and
//! optional notification settings. Every inbound header whose name begins
//! with `X-Ghost`, in any casing, is stripped before replay; the remaining
//! headers are copied verbatim and an `X-Ghosted` marker is appended so
//! downstream targets can detect replayed traffic.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use ghost_core::ScheduledRequest;
use ghost_engine::Engine;

/// Control header naming the target URL. Mandatory.
pub const HEADER_URL: &str = "X-Ghost-Url";
/// Control header naming the execution time (RFC 3339). Mandatory.
pub const HEADER_EXEC_AT: &str = "X-Ghost-Exec-At";
/// Control header naming the notification URL. Optional.
pub const HEADER_NOTIFY_URL: &str = "X-Ghost-Notify-Url";
/// Control header naming a single notification header name. Optional.
pub const HEADER_NOTIFY_HEADER_KEY: &str = "X-Ghost-Notify-Header-Key";
/// Control header naming that notification header's value. Optional.
pub const HEADER_NOTIFY_HEADER_VALUE: &str = "X-Ghost-Notify-Header-Value";
/// Marker header appended to the replayed request.
pub const HEADER_GHOSTED: &str = "X-Ghosted";

const GHOST_PREFIX: &str = "x-ghost";

/// Rejections produced while cloning an inbound request.
#[derive(Debug, Error)]
pub enum CloneError {
    /// A mandatory control header is absent.
    #[error("header '{name}' must be set")]
    MissingHeader {
        /// Name of the absent header.
        name: &'static str,
    },

    /// A control header value is not valid visible ASCII.
    #[error("header '{name}' has an unreadable value")]
    InvalidHeader {
        /// Name of the unreadable header.
        name: &'static str,
    },

    /// The execution time does not parse as RFC 3339.
    #[error("header '{name}' must be an RFC 3339 timestamp: {message}")]
    InvalidTimestamp {
        /// Name of the timestamp header.
        name: &'static str,
        /// Parser error description.
        message: String,
    },

    /// The target URL is not an absolute http(s) URL.
    #[error("header '{name}' must be an absolute http(s) URL")]
    InvalidUrl {
        /// Name of the URL header.
        name: &'static str,
    },
}

/// Builds a scheduled record from the parts of an inbound request.
pub fn clone_request(
    method: &Method,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<ScheduledRequest, CloneError> {
    let url = required_header(headers, HEADER_URL)?;
    validate_absolute_url(&url, HEADER_URL)?;

    let exec_at_raw = required_header(headers, HEADER_EXEC_AT)?;
    let execute_at = DateTime::parse_from_rfc3339(&exec_at_raw)
        .map_err(|e| CloneError::InvalidTimestamp {
            name: HEADER_EXEC_AT,
            message: e.to_string(),
        })?
        .with_timezone(&Utc);

    let mut request = ScheduledRequest::new(method.as_str(), url, execute_at);

    request.notify_url =
        optional_header(headers, HEADER_NOTIFY_URL)?.filter(|value| !value.is_empty());

    let notify_key = optional_header(headers, HEADER_NOTIFY_HEADER_KEY)?;
    let notify_value = optional_header(headers, HEADER_NOTIFY_HEADER_VALUE)?;
    if let (Some(key), Some(value)) = (notify_key, notify_value) {
        if !key.is_empty() && !value.is_empty() {
            request.notify_headers.insert(key, vec![value]);
        }
    }

    for name in headers.keys() {
        // Case-insensitive: clients send these in whatever casing they like.
        if name.as_str().to_ascii_lowercase().starts_with(GHOST_PREFIX) {
            continue;
        }
        let values: Vec<String> = headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_owned)
            .collect();
        if !values.is_empty() {
            request.headers.insert(name.as_str().to_owned(), values);
        }
    }
    request.headers.insert(HEADER_GHOSTED.to_owned(), vec![String::new()]);

    request.body = body;
    Ok(request)
}

fn required_header(headers: &HeaderMap, name: &'static str) -> Result<String, CloneError> {
    match headers.get(name) {
        Some(value) => value
            .to_str()
            .map(str::to_owned)
            .map_err(|_| CloneError::InvalidHeader { name }),
        None => Err(CloneError::MissingHeader { name }),
    }
}

fn optional_header(headers: &HeaderMap, name: &'static str) -> Result<Option<String>, CloneError> {
    match headers.get(name) {
        Some(value) => value
            .to_str()
            .map(|value| Some(value.to_owned()))
            .map_err(|_| CloneError::InvalidHeader { name }),
        None => Ok(None),
    }
}

fn validate_absolute_url(url: &str, name: &'static str) -> Result<(), CloneError> {
    let uri: Uri = url.parse().map_err(|_| CloneError::InvalidUrl { name })?;
    match uri.scheme_str() {
        Some("http") | Some("https") if uri.authority().is_some() => Ok(()),
        _ => Err(CloneError::InvalidUrl { name }),
    }
}

/// `POST /clone` — admits a deferred copy of the inbound request.
///
/// Any inbound method is accepted; the method is part of what gets cloned.
pub async fn handle_clone(
    State(engine): State<Arc<Engine>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match clone_request(&method, &headers, body) {
        Ok(request) => request,
        Err(error) => {
            warn!(error = %error, "rejecting clone request");
            return (StatusCode::BAD_REQUEST, format!("{error}\n")).into_response();
        }
    };

    let summary = request.to_string();
    match engine.register(request).await {
        Ok(()) => {
            info!(%summary, "cloned request");
            (StatusCode::OK, format!("Cloned {summary}\n")).into_response()
        }
        Err(error) => {
            warn!(error = %error, "admission failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{error}\n")).into_response()
        }
    }
}
