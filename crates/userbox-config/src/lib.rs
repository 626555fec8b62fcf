//! Configuration for userbox
//!
//! A single `ManagerConfig` is loaded once at startup (`~/.config/userbox/config.toml`
//! by default) and handed to the container manager and the HTTP server.

mod error;
mod manager;

pub use error::*;
pub use manager::*;
