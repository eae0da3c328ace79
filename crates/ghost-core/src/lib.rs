//! Core domain models for the Ghost deferred dispatcher.
//!
//! Provides the scheduled request record, strongly-typed identifiers, and
//! the clock abstraction shared by the engine and the HTTP surface. All
//! other crates depend on these foundational types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod models;
pub mod time;

pub use models::{RequestId, ScheduledRequest, STATUS_TIME_FORMAT};
pub use time::{Clock, SystemClock};
