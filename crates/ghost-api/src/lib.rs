//! HTTP ingress and status surface for the Ghost dispatcher.
//!
//! Exposes `/clone` for admitting deferred requests and `/status` for
//! operator telemetry. The engine is passed in as an explicit dependency;
//! this crate holds no state of its own.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod handlers;
pub mod server;

pub use handlers::clone::{clone_request, CloneError};
pub use server::{create_router, start_server};
