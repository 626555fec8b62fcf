//! Container runtime gateway for userbox
//!
//! This crate provides a narrow abstraction over container runtimes (Docker,
//! Podman): listing, inspection, resource stats, restart and compose teardown.
//! Callers must treat container names as opaque tokens and compare them
//! exactly; runtime-side name filters are only a prefilter.

mod cli_provider;
mod error;
mod types;

pub use cli_provider::CliRuntime;
pub use error::*;
pub use types::*;

use async_trait::async_trait;
use userbox_config::RuntimeConfig;

/// Trait for container runtimes (Docker, Podman, etc.)
#[async_trait]
pub trait RuntimeGateway: Send + Sync {
    /// List containers, optionally including stopped ones and prefiltered by name
    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContainerSummary>>;

    /// Get state metadata for a container
    async fn inspect(&self, id: &ContainerId) -> Result<ContainerDetails>;

    /// Get a single resource usage sample for a running container
    async fn stats(&self, id: &ContainerId) -> Result<ContainerStats>;

    /// Restart a container
    async fn restart(&self, id: &ContainerId) -> Result<()>;

    /// Stop and remove every container of a compose project
    async fn teardown(&self, project: &str) -> Result<()>;

    /// Check if the runtime is available/connected
    async fn ping(&self) -> Result<()>;

    /// Get runtime information
    fn info(&self) -> ProviderInfo;
}

/// Create the runtime described by the `[runtime]` config section,
/// optionally overriding the command with a specific provider type
pub fn create_runtime(
    config: &RuntimeConfig,
    provider_override: Option<ProviderType>,
) -> Result<Box<dyn RuntimeGateway>> {
    let mut config = config.clone();
    if let Some(provider_type) = provider_override {
        config.command = provider_type.to_string();
    }
    let runtime = CliRuntime::from_config(&config)?;
    tracing::debug!(
        "Using {} runtime via '{}'",
        runtime.info().provider_type,
        config.command
    );
    Ok(Box::new(runtime))
}

/// Returns Ok(true) if the runtime answered, Ok(false) if it is not reachable
pub async fn test_runtime_connectivity(runtime: &dyn RuntimeGateway) -> bool {
    match runtime.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Runtime ping failed: {}", e);
            false
        }
    }
}
