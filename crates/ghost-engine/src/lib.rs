//! Scheduling and dispatch engine for deferred HTTP requests.
//!
//! The engine accepts admitted requests into a bounded queue, promotes them
//! to execution on a periodic heartbeat, replays each against its target URL
//! under a bounded dispatch pool, and optionally POSTs the outcome to a
//! notification URL under a second bounded pool. Mutable engine state lives
//! behind one lock: admission inserts new records in the same critical
//! section that reserves their queue slot, and a state-loop task applies
//! the typed events the heartbeat and workers send.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────┐   ┌─────────────────┐   ┌───────────┐   ┌──────────────┐
//! │ Ingress │──▶│ Admission queue │──▶│ Heartbeat │──▶│ Dispatch     │
//! └─────────┘   │ (bounded FIFO)  │   │ (ticker)  │   │ workers (≤D) │
//!               └─────────────────┘   └───────────┘   └──────┬───────┘
//!                                                            │
//!                       ┌────────────┐   ┌──────────────────┐│
//!                       │ State loop │◀──│ Notification     │◀┘
//!                       │ (counters, │   │ workers (≤N)     │
//!                       │  index)    │   └──────────────────┘
//!                       └────────────┘
//! ```
//!
//! The pending set survives restarts through a snapshot file written at
//! shutdown and replayed with `--load`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admission;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod notify;
pub mod snapshot;

pub use admission::{AdmissionQueue, ScanStep};
pub use dispatch::{DispatchClient, DispatchResponse};
pub use engine::{Engine, EngineConfig, EngineCounters, EngineStatus};
pub use error::{DispatchError, EngineError, Result, SnapshotError};
pub use notify::Notification;
pub use snapshot::SnapshotStore;

/// Default capacity of the admission queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default number of concurrently active outbound dispatches.
pub const DEFAULT_DISPATCH_CAPACITY: usize = 16;

/// Default number of concurrently active notification POSTs.
pub const DEFAULT_NOTIFY_CAPACITY: usize = 16;
