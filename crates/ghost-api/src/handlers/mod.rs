//! Request handlers for the ingress and status routes.

pub mod clone;
pub mod status;

pub use clone::handle_clone;
pub use status::{handle_request_status, handle_status};
