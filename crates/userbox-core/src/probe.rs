//! Runtime probe: the runtime's view of a container, queried fresh each time
//!
//! Listings may be prefiltered by the runtime, but membership is always
//! decided by exact name equality here.

use crate::identity::ContainerName;
use chrono::{DateTime, Utc};
use userbox_provider::{ContainerStats, ListFilter, ProviderError, RuntimeGateway};

pub struct RuntimeProbe {
    runtime: Box<dyn RuntimeGateway>,
}

impl RuntimeProbe {
    pub fn new(runtime: Box<dyn RuntimeGateway>) -> Self {
        Self { runtime }
    }

    /// The underlying runtime, for mutations
    pub fn gateway(&self) -> &dyn RuntimeGateway {
        self.runtime.as_ref()
    }

    /// True if a container with exactly this name exists in any state
    pub async fn exists(&self, name: &ContainerName) -> Result<bool, ProviderError> {
        let listing = self
            .runtime
            .list(&ListFilter::all_named(name.as_str()))
            .await?;
        Ok(listing.iter().any(|c| c.has_name(name.as_str())))
    }

    /// True if a container with exactly this name is running
    pub async fn is_running(&self, name: &ContainerName) -> Result<bool, ProviderError> {
        let listing = self
            .runtime
            .list(&ListFilter::running_named(name.as_str()))
            .await?;
        Ok(listing.iter().any(|c| c.has_name(name.as_str())))
    }

    /// When the container was last started; `None` on any failure
    pub async fn started_at(&self, name: &ContainerName) -> Option<DateTime<Utc>> {
        match self.runtime.inspect(&name.to_container_id()).await {
            Ok(details) => details.started_at,
            Err(e) => {
                tracing::debug!("Could not read start time of {}: {}", name, e);
                None
            }
        }
    }

    /// Resource usage of a running container; `None` when stopped or on any failure
    pub async fn stats(&self, name: &ContainerName) -> Option<ContainerStats> {
        match self.is_running(name).await {
            Ok(true) => self.sample_stats(name).await,
            Ok(false) => None,
            Err(e) => {
                tracing::debug!("Could not check running state of {}: {}", name, e);
                None
            }
        }
    }

    /// Resource usage without re-checking the running state
    pub(crate) async fn sample_stats(&self, name: &ContainerName) -> Option<ContainerStats> {
        match self.runtime.stats(&name.to_container_id()).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::debug!("Could not read stats of {}: {}", name, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NamingScheme;
    use crate::test_support::*;

    fn name(n: i64) -> ContainerName {
        NamingScheme::default().container_name_for(n).unwrap()
    }

    #[tokio::test]
    async fn test_exists_requires_exact_match() {
        let runtime = MockRuntime::new();
        runtime.add(MockContainer::running("dify_11-api-1"));
        runtime.add(MockContainer::stopped("dify_1-api-10"));
        let probe = RuntimeProbe::new(Box::new(runtime.clone()));

        // The runtime-side filter matches both by substring; neither is dify_1-api-1
        assert!(!probe.exists(&name(1)).await.unwrap());
        assert!(probe.exists(&name(11)).await.unwrap());
        assert!(runtime.was_called(&MockCall::List {
            all: true,
            name: Some("dify_1-api-1".to_string()),
        }));
    }

    #[tokio::test]
    async fn test_is_running_ignores_stopped() {
        let runtime = MockRuntime::new();
        runtime.add(MockContainer::stopped("dify_2-api-1"));
        let probe = RuntimeProbe::new(Box::new(runtime));

        assert!(probe.exists(&name(2)).await.unwrap());
        assert!(!probe.is_running(&name(2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_query_failure_propagates() {
        let runtime = MockRuntime::new();
        runtime.fail_list(ProviderError::RuntimeError("daemon down".into()));
        let probe = RuntimeProbe::new(Box::new(runtime));
        assert!(probe.exists(&name(1)).await.is_err());
        assert!(probe.is_running(&name(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_started_at_degrades_to_none() {
        let runtime = MockRuntime::new();
        let probe = RuntimeProbe::new(Box::new(runtime.clone()));
        // Unknown container: inspect fails
        assert!(probe.started_at(&name(4)).await.is_none());

        let started = "2024-01-15T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        runtime.add(MockContainer::running("dify_4-api-1").with_started_at(started));
        assert_eq!(probe.started_at(&name(4)).await, Some(started));
    }

    #[tokio::test]
    async fn test_stats_only_when_running() {
        let runtime = MockRuntime::new();
        runtime.add(MockContainer::stopped("dify_5-api-1").with_stats(sample_stats()));
        let probe = RuntimeProbe::new(Box::new(runtime.clone()));

        assert!(probe.stats(&name(5)).await.is_none());
        assert!(!runtime
            .get_calls()
            .iter()
            .any(|c| matches!(c, MockCall::Stats { .. })));
    }

    #[tokio::test]
    async fn test_stats_parse_failure_is_none() {
        let runtime = MockRuntime::new();
        // Running but the runtime's stats output is unusable
        runtime.add(MockContainer::running("dify_6-api-1"));
        let probe = RuntimeProbe::new(Box::new(runtime));
        assert!(probe.stats(&name(6)).await.is_none());
    }

    #[tokio::test]
    async fn test_stats_running() {
        let runtime = MockRuntime::new();
        runtime.add(MockContainer::running("dify_6-api-1").with_stats(sample_stats()));
        let probe = RuntimeProbe::new(Box::new(runtime));
        assert_eq!(probe.stats(&name(6)).await, Some(sample_stats()));
    }
}
