//! Operator status surface.
//!
//! Everything here is plaintext key/value output meant for a terminal, not
//! a machine. Timestamps render as `YYYY-MM-DD HH:MM:SS` UTC.

use std::{fmt::Write as _, sync::Arc};

use axum::extract::{Path, State};
use uuid::Uuid;

use ghost_core::{RequestId, STATUS_TIME_FORMAT};
use ghost_engine::{Engine, EngineStatus};

/// `GET /status` — engine-wide counters and pool occupancy.
pub async fn handle_status(State(engine): State<Arc<Engine>>) -> String {
    render_status(&engine.status().await)
}

pub(crate) fn render_status(status: &EngineStatus) -> String {
    let mut out = String::new();
    let counters = &status.counters;

    let _ = writeln!(
        out,
        "UTC Startup Time: {}",
        status.started_at.format(STATUS_TIME_FORMAT)
    );
    let _ = writeln!(out, "Uptime Minutes: {}", status.uptime_minutes);
    out.push('\n');

    let _ = writeln!(out, "Requests Registered: {}", counters.registered);
    let _ = writeln!(out, "Requests Served: {}", counters.served);
    let _ = writeln!(out, "Request Errors: {}", counters.errored);
    let _ = writeln!(out, "Request Queue: {}/{}", status.queue_depth, status.queue_capacity);
    let _ = writeln!(
        out,
        "Active Requests: {}/{}",
        status.active_dispatches, status.dispatch_capacity
    );
    out.push('\n');

    let _ = writeln!(out, "Notifications Served: {}", counters.notifications_served);
    let _ = writeln!(out, "Notification Errors: {}", counters.notifications_errored);
    let _ = writeln!(
        out,
        "Active Notifications: {}/{}",
        status.active_notifications, status.notify_capacity
    );

    out
}

/// `GET /status/{id}` — details of one pending record, or `Not Found`.
///
/// Unparseable ids render the same as unknown ones; the lookup surface has
/// exactly two outcomes.
pub async fn handle_request_status(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
) -> String {
    let Ok(id) = Uuid::parse_str(&id) else {
        return "Not Found\n".to_string();
    };

    match engine.pending_request(RequestId::from(id)).await {
        Some(request) => format!(
            "UUID: {}\nMethod: {}\nURL: {}\nIn queue since: {}\nWill execute at: {}\n",
            request.id,
            request.method,
            request.url,
            request.created_at.format(STATUS_TIME_FORMAT),
            request.execute_at.format(STATUS_TIME_FORMAT),
        ),
        None => "Not Found\n".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use ghost_engine::EngineCounters;

    use super::*;

    #[test]
    fn status_renders_every_section() {
        let status = EngineStatus {
            started_at: Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap(),
            uptime_minutes: 90,
            counters: EngineCounters {
                registered: 10,
                served: 7,
                errored: 1,
                notifications_served: 3,
                notifications_errored: 1,
            },
            pending: 2,
            queue_depth: 2,
            queue_capacity: 1024,
            active_dispatches: 1,
            dispatch_capacity: 16,
            active_notifications: 0,
            notify_capacity: 16,
        };

        let rendered = render_status(&status);
        assert!(rendered.contains("UTC Startup Time: 2026-08-01 12:00:00"));
        assert!(rendered.contains("Uptime Minutes: 90"));
        assert!(rendered.contains("Requests Registered: 10"));
        assert!(rendered.contains("Requests Served: 7"));
        assert!(rendered.contains("Request Errors: 1"));
        assert!(rendered.contains("Request Queue: 2/1024"));
        assert!(rendered.contains("Active Requests: 1/16"));
        assert!(rendered.contains("Notifications Served: 3"));
        assert!(rendered.contains("Notification Errors: 1"));
        assert!(rendered.contains("Active Notifications: 0/16"));
    }
}
