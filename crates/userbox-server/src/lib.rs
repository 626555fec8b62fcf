//! HTTP control API for userbox
//!
//! Exposes the container manager's create/destroy/restart/health/list
//! operations as JSON endpoints.

pub mod api;
mod error;
mod handlers;
pub mod server;

pub use api::{create_router, AppState};
pub use error::ApiError;
pub use server::{serve, shutdown_signal};
