//! Core logic for userbox per-user container lifecycle management
//!
//! This crate provides:
//! - Identity mapping between user ids, container names and host ports
//! - Runtime probing, with the container runtime as the source of truth
//! - Provisioning through an external script and data directory cleanup
//! - Port reachability probes for health reports
//! - The lifecycle manager composing these into create/destroy/restart/health/list

mod container;
mod error;
mod identity;
mod locks;
mod manager;
mod probe;
mod provision;
mod reachability;

pub use container::*;
pub use error::*;
pub use identity::*;
pub use locks::*;
pub use manager::*;
pub use probe::*;
pub use provision::*;
pub use reachability::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
