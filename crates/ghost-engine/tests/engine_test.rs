//! Integration tests for the scheduling and dispatch engine.
//!
//! Each test runs a real engine with a fast heartbeat against wiremock
//! targets, then observes counters and the pending index through the
//! engine's status surface.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use ghost_core::ScheduledRequest;
use ghost_engine::{Engine, EngineConfig, EngineError, EngineStatus};
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn test_config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        queue_capacity: 64,
        dispatch_capacity: 4,
        notify_capacity: 4,
        tick: Duration::from_millis(25),
        snapshot_path: dir.path().join("ghostdb"),
    }
}

fn started_engine(config: EngineConfig) -> Arc<Engine> {
    let engine = Arc::new(Engine::new(config).expect("engine construction failed"));
    engine.start();
    engine
}

/// Polls the engine status until `predicate` holds or `deadline` passes.
async fn wait_for_status(
    engine: &Engine,
    deadline: Duration,
    predicate: impl Fn(&EngineStatus) -> bool,
) -> EngineStatus {
    let start = tokio::time::Instant::now();
    loop {
        let status = engine.status().await;
        if predicate(&status) {
            return status;
        }
        assert!(
            start.elapsed() < deadline,
            "condition not reached within {deadline:?}; last status: {status:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn due_request(url: String) -> ScheduledRequest {
    ScheduledRequest::new("GET", url, Utc::now() - ChronoDuration::seconds(1))
}

#[tokio::test]
async fn immediate_dispatch_hits_target_once() {
    let dir = tempfile::tempdir().unwrap();
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&target)
        .await;

    let engine = started_engine(test_config(&dir));
    engine.register(due_request(format!("{}/ok", target.uri()))).await.unwrap();

    let status = wait_for_status(&engine, Duration::from_secs(3), |s| s.counters.served == 1).await;
    assert_eq!(status.counters.errored, 0);

    // Completion removes the record from the index.
    wait_for_status(&engine, Duration::from_secs(3), |s| s.pending == 0).await;
    target.verify().await;
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn deferred_dispatch_waits_until_due() {
    let dir = tempfile::tempdir().unwrap();
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;

    let engine = started_engine(test_config(&dir));
    let request = ScheduledRequest::new(
        "GET",
        format!("{}/ok", target.uri()),
        Utc::now() + ChronoDuration::milliseconds(600),
    );
    let id = request.id;
    engine.register(request).await.unwrap();

    // Well before the due time: still pending, target untouched.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(engine.pending_request(id).await.is_some());
    assert!(target.received_requests().await.unwrap().is_empty());
    assert_eq!(engine.status().await.counters.served, 0);

    // After the due time: exactly one hit.
    wait_for_status(&engine, Duration::from_secs(3), |s| s.counters.served == 1).await;
    wait_for_status(&engine, Duration::from_secs(3), |s| s.pending == 0).await;
    assert_eq!(target.received_requests().await.unwrap().len(), 1);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn successful_dispatch_notifies_with_response_body() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("hello")
                .insert_header("content-type", "text/plain"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let engine = started_engine(test_config(&dir));
    let mut request = due_request(format!("{}/ok", server.uri()));
    request.notify_url = Some(format!("{}/notify", server.uri()));
    engine.register(request).await.unwrap();

    let status = wait_for_status(&engine, Duration::from_secs(3), |s| {
        s.counters.notifications_served == 1 && s.pending == 0
    })
    .await;
    assert_eq!(status.counters.served, 1);

    let notify_hits: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/notify")
        .collect();
    assert_eq!(notify_hits.len(), 1);
    assert_eq!(notify_hits[0].body, b"hello");
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_dispatch_notifies_with_failure_message() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    // A freshly released local port: connection refused.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let closed_port = listener.local_addr().unwrap().port();
    drop(listener);

    let engine = started_engine(test_config(&dir));
    let mut request = due_request(format!("http://127.0.0.1:{closed_port}/unreachable"));
    request.notify_url = Some(format!("{}/notify", server.uri()));
    let id = request.id;
    engine.register(request).await.unwrap();

    let status = wait_for_status(&engine, Duration::from_secs(5), |s| {
        s.counters.notifications_served == 1 && s.pending == 0
    })
    .await;
    assert_eq!(status.counters.errored, 1);
    assert_eq!(status.counters.served, 0);

    let notify_hits: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/notify")
        .collect();
    assert_eq!(notify_hits.len(), 1);
    let body = String::from_utf8(notify_hits[0].body.clone()).unwrap();
    assert!(body.contains("Failed"), "body was: {body}");
    assert!(body.contains(&id.to_string()), "body was: {body}");
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn admission_sheds_load_when_queue_is_full() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig { queue_capacity: 2, ..test_config(&dir) };
    let engine = started_engine(config);

    // Far-future records stay queued for the duration of the test.
    let execute_at = Utc::now() + ChronoDuration::hours(1);
    engine.register(ScheduledRequest::new("GET", "http://one.example/", execute_at)).await.unwrap();
    engine.register(ScheduledRequest::new("GET", "http://two.example/", execute_at)).await.unwrap();

    let rejected =
        engine.register(ScheduledRequest::new("GET", "http://three.example/", execute_at)).await;
    assert!(matches!(rejected, Err(EngineError::QueueFull { capacity: 2 })));

    let status =
        wait_for_status(&engine, Duration::from_secs(3), |s| s.counters.registered == 2).await;
    assert_eq!(status.pending, 2);
    assert_eq!(status.queue_depth, 2);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn saturated_dispatch_pool_bounds_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
        .expect(5)
        .mount(&target)
        .await;

    let config = EngineConfig { dispatch_capacity: 1, ..test_config(&dir) };
    let engine = started_engine(config);
    for _ in 0..5 {
        engine.register(due_request(format!("{}/slow", target.uri()))).await.unwrap();
    }

    // Sample the pool while the backlog drains: never more than one active.
    let start = tokio::time::Instant::now();
    loop {
        let status = engine.status().await;
        assert!(status.active_dispatches <= 1, "pool bound exceeded: {status:?}");
        if status.counters.served == 5 {
            break;
        }
        assert!(start.elapsed() < Duration::from_secs(10), "backlog never drained: {status:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    wait_for_status(&engine, Duration::from_secs(3), |s| s.pending == 0).await;
    target.verify().await;
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn counters_never_undercount_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;

    let engine = started_engine(test_config(&dir));
    for i in 0..8 {
        let execute_at = if i % 2 == 0 {
            Utc::now() - ChronoDuration::seconds(1)
        } else {
            Utc::now() + ChronoDuration::hours(1)
        };
        engine
            .register(ScheduledRequest::new("GET", format!("{}/r{i}", target.uri()), execute_at))
            .await
            .unwrap();
    }

    // registered >= served + errored + pending at every observation point.
    let start = tokio::time::Instant::now();
    while start.elapsed() < Duration::from_millis(800) {
        let status = engine.status().await;
        let accounted =
            status.counters.served + status.counters.errored + status.pending as u64;
        assert!(
            status.counters.registered >= accounted,
            "invariant violated: {status:?}"
        );
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    let status = wait_for_status(&engine, Duration::from_secs(3), |s| {
        s.counters.served == 4 && s.pending == 4
    })
    .await;
    assert_eq!(status.counters.registered, 8);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn pending_set_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let execute_at = Utc::now() + ChronoDuration::hours(1);

    let mut ids = Vec::new();
    let mut bodies = Vec::new();
    {
        let engine = started_engine(test_config(&dir));
        for i in 0..3 {
            let mut request =
                ScheduledRequest::new("POST", format!("http://later.example/{i}"), execute_at);
            request.body = Bytes::from(format!("payload-{i}"));
            ids.push(request.id);
            bodies.push(request.body.clone());
            engine.register(request).await.unwrap();
        }
        wait_for_status(&engine, Duration::from_secs(3), |s| s.pending == 3).await;
        engine.shutdown().await.unwrap();
    }
    assert!(dir.path().join("ghostdb").exists());

    let engine = started_engine(test_config(&dir));
    let replayed = engine.load().await.unwrap();
    assert_eq!(replayed, 3);
    assert!(!dir.path().join("ghostdb").exists());

    wait_for_status(&engine, Duration::from_secs(3), |s| s.pending == 3).await;
    for (id, body) in ids.iter().zip(&bodies) {
        let restored = engine.pending_request(*id).await.expect("record missing after restart");
        assert_eq!(&restored.body, body);
        assert_eq!(restored.execute_at, execute_at);
    }
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn snapshot_overflow_records_are_dropped_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let execute_at = Utc::now() + ChronoDuration::hours(1);

    {
        let engine = started_engine(test_config(&dir));
        for i in 0..4 {
            engine
                .register(ScheduledRequest::new("GET", format!("http://later.example/{i}"), execute_at))
                .await
                .unwrap();
        }
        wait_for_status(&engine, Duration::from_secs(3), |s| s.pending == 4).await;
        engine.shutdown().await.unwrap();
    }

    // Restart with a smaller queue: only what fits is re-admitted.
    let config = EngineConfig { queue_capacity: 2, ..test_config(&dir) };
    let engine = started_engine(config);
    let replayed = engine.load().await.unwrap();
    assert_eq!(replayed, 2);

    wait_for_status(&engine, Duration::from_secs(3), |s| s.pending == 2).await;
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_without_pending_requests_writes_no_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let engine = started_engine(test_config(&dir));
    engine.shutdown().await.unwrap();
    assert!(!dir.path().join("ghostdb").exists());
}
