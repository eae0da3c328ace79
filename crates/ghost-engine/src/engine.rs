//! Engine driver: admission, heartbeat, and the state loop.
//!
//! Two long-lived tasks drive the engine. The state loop applies the typed
//! events fanned in from the heartbeat and the workers; admission mutates
//! the same state inside its own critical section over the state lock, so
//! a queued record is always indexed before any event about it can be
//! applied. The heartbeat promotes due records from the admission queue to
//! dispatch workers, subject to the dispatch pool bound. Everything else is
//! spawned per record.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{
    sync::{mpsc, RwLock, Semaphore},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ghost_core::{Clock, RequestId, ScheduledRequest, SystemClock};

use crate::{
    admission::{AdmissionQueue, ScanStep},
    dispatch::{self, DispatchClient},
    error::{EngineError, Result},
    snapshot::{SnapshotStore, DEFAULT_SNAPSHOT_PATH},
    DEFAULT_DISPATCH_CAPACITY, DEFAULT_NOTIFY_CAPACITY, DEFAULT_QUEUE_CAPACITY,
};

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of the admission queue.
    pub queue_capacity: usize,

    /// Maximum concurrently active outbound dispatches.
    pub dispatch_capacity: usize,

    /// Maximum concurrently active notification POSTs.
    pub notify_capacity: usize,

    /// Heartbeat period.
    pub tick: Duration,

    /// Location of the shutdown snapshot file.
    pub snapshot_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            dispatch_capacity: DEFAULT_DISPATCH_CAPACITY,
            notify_capacity: DEFAULT_NOTIFY_CAPACITY,
            tick: Duration::from_secs(1),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(EngineError::configuration("queue_capacity must be greater than 0"));
        }
        if self.dispatch_capacity == 0 {
            return Err(EngineError::configuration("dispatch_capacity must be greater than 0"));
        }
        if self.notify_capacity == 0 {
            return Err(EngineError::configuration("notify_capacity must be greater than 0"));
        }
        if self.tick.is_zero() {
            return Err(EngineError::configuration("tick must be greater than 0"));
        }
        Ok(())
    }
}

/// Monotonic counters, mutated only under the state write lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCounters {
    /// Records accepted by admission.
    pub registered: u64,
    /// Dispatches that produced a response (any status code).
    pub served: u64,
    /// Dispatches that failed at the transport or build stage.
    pub errored: u64,
    /// Notification POSTs that produced a response.
    pub notifications_served: u64,
    /// Notification POSTs that failed.
    pub notifications_errored: u64,
}

/// Point-in-time view of the engine for the status surface.
///
/// Counters may lag the workers slightly; they are operator telemetry, not
/// correctness state.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    /// When the engine was constructed (UTC).
    pub started_at: DateTime<Utc>,
    /// Whole minutes since startup.
    pub uptime_minutes: u64,
    /// Counter snapshot.
    pub counters: EngineCounters,
    /// Records currently in the pending index.
    pub pending: usize,
    /// Records currently in the admission queue.
    pub queue_depth: usize,
    /// Admission queue capacity.
    pub queue_capacity: usize,
    /// Dispatches currently in flight.
    pub active_dispatches: usize,
    /// Dispatch pool capacity.
    pub dispatch_capacity: usize,
    /// Notification POSTs currently in flight.
    pub active_notifications: usize,
    /// Notification pool capacity.
    pub notify_capacity: usize,
}

/// Events fanned in to the state loop.
pub(crate) enum EngineEvent {
    /// The heartbeat handed a record to a dispatch worker.
    Promoted(RequestId),
    /// A dispatch produced a response.
    Served,
    /// A dispatch failed.
    Errored,
    /// A notification POST produced a response.
    NotificationServed,
    /// A notification POST failed.
    NotificationErrored,
    /// A record finished its lifecycle; drop it from the index.
    Complete(RequestId),
}

/// Shared handles a worker task needs to do its job.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub client: Arc<DispatchClient>,
    pub events: mpsc::UnboundedSender<EngineEvent>,
    pub notify_slots: Arc<Semaphore>,
}

struct PendingEntry {
    request: ScheduledRequest,
    in_flight: bool,
}

#[derive(Default)]
struct EngineState {
    index: HashMap<RequestId, PendingEntry>,
    counters: EngineCounters,
}

/// The deferred-dispatch engine.
///
/// One instance per process, passed to the HTTP surface as an explicit
/// dependency. Construct with [`Engine::new`], call [`Engine::start`] to
/// spawn the drivers, and [`Engine::shutdown`] to halt and snapshot.
pub struct Engine {
    config: EngineConfig,
    started_at: DateTime<Utc>,
    clock: Arc<dyn Clock>,
    queue: Arc<AdmissionQueue>,
    state: Arc<RwLock<EngineState>>,
    events: mpsc::UnboundedSender<EngineEvent>,
    events_rx: StdMutex<Option<mpsc::UnboundedReceiver<EngineEvent>>>,
    dispatch_slots: Arc<Semaphore>,
    notify_slots: Arc<Semaphore>,
    client: Arc<DispatchClient>,
    cancel: CancellationToken,
    drivers: StdMutex<Vec<JoinHandle<()>>>,
    snapshot: SnapshotStore,
}

impl Engine {
    /// Creates an engine with the system clock.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Creates an engine with an injected clock.
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let client = Arc::new(
            DispatchClient::new()
                .map_err(|e| EngineError::configuration(e.to_string()))?,
        );
        let (events, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            started_at: clock.now(),
            clock,
            queue: Arc::new(AdmissionQueue::new(config.queue_capacity)),
            state: Arc::new(RwLock::new(EngineState::default())),
            events,
            events_rx: StdMutex::new(Some(events_rx)),
            dispatch_slots: Arc::new(Semaphore::new(config.dispatch_capacity)),
            notify_slots: Arc::new(Semaphore::new(config.notify_capacity)),
            client,
            cancel: CancellationToken::new(),
            drivers: StdMutex::new(Vec::new()),
            snapshot: SnapshotStore::new(&config.snapshot_path),
            config,
        })
    }

    /// Spawns the state loop and heartbeat drivers.
    pub fn start(&self) {
        let Some(events_rx) = self
            .events_rx
            .lock()
            .expect("engine receiver lock poisoned")
            .take()
        else {
            warn!("engine already started");
            return;
        };

        info!(
            queue_capacity = self.config.queue_capacity,
            dispatch_capacity = self.config.dispatch_capacity,
            notify_capacity = self.config.notify_capacity,
            tick_ms = self.config.tick.as_millis() as u64,
            "starting engine"
        );

        let state_loop =
            tokio::spawn(run_state_loop(self.state.clone(), events_rx, self.cancel.clone()));

        let ctx = WorkerContext {
            client: self.client.clone(),
            events: self.events.clone(),
            notify_slots: self.notify_slots.clone(),
        };
        let heartbeat = tokio::spawn(run_heartbeat(
            self.queue.clone(),
            ctx,
            self.dispatch_slots.clone(),
            self.clock.clone(),
            self.config.tick,
            self.cancel.clone(),
        ));

        self.drivers
            .lock()
            .expect("engine driver lock poisoned")
            .extend([state_loop, heartbeat]);
    }

    /// Admits a record without blocking on queue space.
    ///
    /// On a full queue nothing changes and [`EngineError::QueueFull`] is
    /// returned. Otherwise the record enters the admission queue and the
    /// pending index, and the registered counter is incremented.
    ///
    /// The state lock is taken before the queue push: a heartbeat pass may
    /// pop the record the instant it is queued, but the `Promoted` and
    /// `Complete` events it produces cannot be applied until the index
    /// entry exists.
    pub async fn register(&self, request: ScheduledRequest) -> Result<()> {
        let mut state = self.state.write().await;

        self.queue
            .try_push(request.clone())
            .map_err(|_| EngineError::QueueFull { capacity: self.queue.capacity() })?;

        debug!(id = %request.id, execute_at = %request.execute_at, "request admitted");
        state.counters.registered += 1;
        state.index.insert(request.id, PendingEntry { request, in_flight: false });
        Ok(())
    }

    /// Looks up a pending record by id.
    pub async fn pending_request(&self, id: RequestId) -> Option<ScheduledRequest> {
        self.state.read().await.index.get(&id).map(|entry| entry.request.clone())
    }

    /// Snapshots the engine's observable state.
    pub async fn status(&self) -> EngineStatus {
        let state = self.state.read().await;
        let uptime = self.clock.now() - self.started_at;

        EngineStatus {
            started_at: self.started_at,
            uptime_minutes: uptime.num_minutes().max(0) as u64,
            counters: state.counters,
            pending: state.index.len(),
            queue_depth: self.queue.len(),
            queue_capacity: self.queue.capacity(),
            active_dispatches: self
                .config
                .dispatch_capacity
                .saturating_sub(self.dispatch_slots.available_permits()),
            dispatch_capacity: self.config.dispatch_capacity,
            active_notifications: self
                .config
                .notify_capacity
                .saturating_sub(self.notify_slots.available_permits()),
            notify_capacity: self.config.notify_capacity,
        }
    }

    /// Replays the snapshot file, if present, through admission.
    ///
    /// Records beyond queue capacity are dropped with a warning. Returns
    /// the number of records re-admitted. Already-due records fire on the
    /// next heartbeat.
    pub async fn load(&self) -> Result<usize> {
        let records = self.snapshot.load()?;
        if records.is_empty() {
            return Ok(0);
        }

        info!(count = records.len(), "replaying snapshot");
        let mut admitted = 0usize;
        for record in records {
            let id = record.id;
            match self.register(record).await {
                Ok(()) => admitted += 1,
                Err(error) => warn!(%id, error = %error, "dropping snapshot record"),
            }
        }
        Ok(admitted)
    }

    /// Halts the drivers and snapshots the pending set.
    ///
    /// In-flight dispatch and notification tasks finish their current
    /// attempt on their own; their records are excluded from the snapshot.
    /// A snapshot write error is logged and propagated so the process can
    /// exit non-zero.
    pub async fn shutdown(&self) -> Result<()> {
        info!("halting engine");
        self.cancel.cancel();

        let drivers = {
            let mut guard = self.drivers.lock().expect("engine driver lock poisoned");
            std::mem::take(&mut *guard)
        };
        for driver in drivers {
            if let Err(join_error) = driver.await {
                error!(error = %join_error, "engine driver panicked during shutdown");
            }
        }

        let pending: Vec<ScheduledRequest> = {
            let state = self.state.read().await;
            state
                .index
                .values()
                .filter(|entry| !entry.in_flight)
                .map(|entry| entry.request.clone())
                .collect()
        };

        if pending.is_empty() {
            info!("engine halted, no pending requests to save");
            return Ok(());
        }

        info!(
            pending = pending.len(),
            path = %self.snapshot.path().display(),
            "saving pending requests"
        );
        if let Err(error) = self.snapshot.save(&pending) {
            error!(error = %error, "failed to save pending requests");
            return Err(error.into());
        }

        info!("engine halted");
        Ok(())
    }
}

/// Applies heartbeat and worker events to the index and counters.
///
/// Runs until cancelled, then drains events already sent before halting so
/// completions from finished workers are not lost.
async fn run_state_loop(
    state: Arc<RwLock<EngineState>>,
    mut events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    cancel: CancellationToken,
) {
    debug!("state loop running");
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = events_rx.recv() => match event {
                Some(event) => apply_event(&state, event).await,
                None => {
                    debug!("event channel closed, state loop exiting");
                    return;
                }
            },
        }
    }

    // Halting: accept no new work, drain what was already in flight.
    while let Ok(event) = events_rx.try_recv() {
        apply_event(&state, event).await;
    }
    debug!("state loop halted");
}

async fn apply_event(state: &RwLock<EngineState>, event: EngineEvent) {
    let mut state = state.write().await;
    match event {
        EngineEvent::Promoted(id) => match state.index.get_mut(&id) {
            Some(entry) => entry.in_flight = true,
            None => debug!(%id, "promotion for unknown request"),
        },
        EngineEvent::Served => state.counters.served += 1,
        EngineEvent::Errored => state.counters.errored += 1,
        EngineEvent::NotificationServed => state.counters.notifications_served += 1,
        EngineEvent::NotificationErrored => state.counters.notifications_errored += 1,
        EngineEvent::Complete(id) => {
            state.index.remove(&id);
        }
    }
}

/// Periodic promoter of due records.
///
/// Each tick performs one pass over the admission queue: not-yet-due
/// records rotate to the tail; due records take a dispatch slot and spawn a
/// worker. When the pool is saturated the record is requeued and the pass
/// stops — the next tick retries. FIFO order holds modulo these
/// re-circulations; there is no earliest-deadline-first guarantee.
async fn run_heartbeat(
    queue: Arc<AdmissionQueue>,
    ctx: WorkerContext,
    dispatch_slots: Arc<Semaphore>,
    clock: Arc<dyn Clock>,
    tick: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!("heartbeat running");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => promote_due(&queue, &ctx, &dispatch_slots, clock.now()),
        }
    }
    debug!("heartbeat stopped");
}

fn promote_due(
    queue: &AdmissionQueue,
    ctx: &WorkerContext,
    dispatch_slots: &Arc<Semaphore>,
    now: DateTime<Utc>,
) {
    queue.scan(|request| {
        if !request.is_due(now) {
            return ScanStep::Requeue(request);
        }
        match dispatch_slots.clone().try_acquire_owned() {
            Ok(permit) => {
                debug!(id = %request.id, "promoting due request");
                let _ = ctx.events.send(EngineEvent::Promoted(request.id));
                tokio::spawn(dispatch::run(ctx.clone(), request, permit));
                ScanStep::Taken
            }
            Err(_) => ScanStep::Hold(request),
        }
    });
}
