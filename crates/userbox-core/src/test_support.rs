//! Test support utilities for userbox-core
//!
//! Provides an in-memory runtime, provisioner and reachability checker so the
//! ContainerManager can be exercised without Docker, Podman or a real script.
//! The mocks share one call log and one container table, so a test can
//! assert on the exact sequence of side effects.

use crate::identity::{NamingScheme, UserId};
use crate::manager::ContainerManager;
use crate::provision::{Credential, ProvisionError, Provisioner};
use crate::reachability::ReachabilityCheck;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use userbox_provider::*;

/// Records which methods were called on the mocks
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    List { all: bool, name: Option<String> },
    Inspect { id: String },
    Stats { id: String },
    Restart { id: String },
    Teardown { project: String },
    Ping,
    Provision { user: u32 },
    TeardownVolume { user: u32 },
    CheckWeb { port: u16 },
    CheckSecondary { port: u16 },
}

impl MockCall {
    /// True for calls that change runtime or filesystem state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Restart { .. }
                | Self::Teardown { .. }
                | Self::Provision { .. }
                | Self::TeardownVolume { .. }
        )
    }
}

/// A container known to the mock runtime
#[derive(Debug, Clone, PartialEq)]
pub struct MockContainer {
    pub name: String,
    pub running: bool,
    pub created: String,
    pub started_at: Option<DateTime<Utc>>,
    /// `None` makes `stats` fail as if the output were unparseable
    pub stats: Option<ContainerStats>,
}

impl MockContainer {
    pub fn running(name: &str) -> Self {
        Self {
            name: name.to_string(),
            running: true,
            created: "2024-01-15 10:00:00 +0000 UTC".to_string(),
            started_at: None,
            stats: None,
        }
    }

    pub fn stopped(name: &str) -> Self {
        Self {
            running: false,
            ..Self::running(name)
        }
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn with_stats(mut self, stats: ContainerStats) -> Self {
        self.stats = Some(stats);
        self
    }
}

/// Stats sample used across tests
pub fn sample_stats() -> ContainerStats {
    ContainerStats {
        cpu_percent: "0.25%".to_string(),
        memory_usage: "120.5MiB / 7.6GiB".to_string(),
        memory_percent: "1.55%".to_string(),
    }
}

/// Clone a ProviderError (thiserror types don't implement Clone)
fn clone_provider_error(e: &ProviderError) -> ProviderError {
    match e {
        ProviderError::ConnectionError(s) => ProviderError::ConnectionError(s.clone()),
        ProviderError::ContainerNotFound(s) => ProviderError::ContainerNotFound(s.clone()),
        ProviderError::RuntimeError(s) => ProviderError::RuntimeError(s.clone()),
        ProviderError::ParseError(s) => ProviderError::ParseError(s.clone()),
        ProviderError::Timeout { operation, secs } => ProviderError::Timeout {
            operation: operation.clone(),
            secs: *secs,
        },
        ProviderError::ConfigError(e) => ProviderError::RuntimeError(e.to_string()),
        ProviderError::IoError(e) => ProviderError::RuntimeError(e.to_string()),
    }
}

fn take_error(slot: &Mutex<Option<ProviderError>>) -> Option<ProviderError> {
    slot.lock().unwrap().as_ref().map(clone_provider_error)
}

/// In-memory container runtime
#[derive(Clone, Default)]
pub struct MockRuntime {
    pub calls: Arc<Mutex<Vec<MockCall>>>,
    pub containers: Arc<Mutex<Vec<MockContainer>>>,
    /// Error returned by every `list` call while set
    pub list_error: Arc<Mutex<Option<ProviderError>>>,
    pub inspect_error: Arc<Mutex<Option<ProviderError>>>,
    pub restart_error: Arc<Mutex<Option<ProviderError>>>,
    pub teardown_error: Arc<Mutex<Option<ProviderError>>>,
    pub ping_error: Arc<Mutex<Option<ProviderError>>>,
    /// Restart leaves the container stopped, as when its entrypoint crashes
    pub restart_stops_container: Arc<Mutex<bool>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call
    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Check if a specific call was made
    pub fn was_called(&self, call: &MockCall) -> bool {
        self.calls.lock().unwrap().contains(call)
    }

    /// Number of recorded calls matching `pred`
    pub fn count_calls(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn add(&self, container: MockContainer) {
        let mut containers = self.containers.lock().unwrap();
        containers.retain(|c| c.name != container.name);
        containers.push(container);
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.containers.lock().unwrap().iter().any(|c| c.name == name)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.name == name && c.running)
    }

    pub fn fail_list(&self, err: ProviderError) {
        *self.list_error.lock().unwrap() = Some(err);
    }

    pub fn fail_inspect(&self, err: ProviderError) {
        *self.inspect_error.lock().unwrap() = Some(err);
    }

    pub fn fail_restart(&self, err: ProviderError) {
        *self.restart_error.lock().unwrap() = Some(err);
    }

    pub fn fail_teardown(&self, err: ProviderError) {
        *self.teardown_error.lock().unwrap() = Some(err);
    }

    pub fn fail_ping(&self, err: ProviderError) {
        *self.ping_error.lock().unwrap() = Some(err);
    }

    fn find(&self, id: &ContainerId) -> Option<MockContainer> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.name == id.0)
            .cloned()
    }
}

#[async_trait]
impl RuntimeGateway for MockRuntime {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContainerSummary>> {
        self.record(MockCall::List {
            all: filter.all,
            name: filter.name.clone(),
        });
        if let Some(err) = take_error(&self.list_error) {
            return Err(err);
        }
        // Substring matching, like Docker's name filter
        let containers = self.containers.lock().unwrap();
        Ok(containers
            .iter()
            .filter(|c| filter.all || c.running)
            .filter(|c| filter.name.as_ref().map_or(true, |n| c.name.contains(n.as_str())))
            .map(|c| ContainerSummary {
                id: ContainerId::new(format!("id-{}", c.name)),
                names: vec![c.name.clone()],
                state: if c.running { "running" } else { "exited" }.to_string(),
                created: c.created.clone(),
            })
            .collect())
    }

    async fn inspect(&self, id: &ContainerId) -> Result<ContainerDetails> {
        self.record(MockCall::Inspect { id: id.0.clone() });
        if let Some(err) = take_error(&self.inspect_error) {
            return Err(err);
        }
        let c = self
            .find(id)
            .ok_or_else(|| ProviderError::ContainerNotFound(id.0.clone()))?;
        Ok(ContainerDetails {
            id: ContainerId::new(format!("id-{}", c.name)),
            name: c.name.clone(),
            status: if c.running {
                ContainerStatus::Running
            } else {
                ContainerStatus::Exited
            },
            running: c.running,
            started_at: c.started_at,
            exit_code: if c.running { None } else { Some(0) },
        })
    }

    async fn stats(&self, id: &ContainerId) -> Result<ContainerStats> {
        self.record(MockCall::Stats { id: id.0.clone() });
        let c = self
            .find(id)
            .ok_or_else(|| ProviderError::ContainerNotFound(id.0.clone()))?;
        c.stats
            .ok_or_else(|| ProviderError::ParseError("stats output missing fields".to_string()))
    }

    async fn restart(&self, id: &ContainerId) -> Result<()> {
        self.record(MockCall::Restart { id: id.0.clone() });
        if let Some(err) = take_error(&self.restart_error) {
            return Err(err);
        }
        let stops = *self.restart_stops_container.lock().unwrap();
        let mut containers = self.containers.lock().unwrap();
        let c = containers
            .iter_mut()
            .find(|c| c.name == id.0)
            .ok_or_else(|| ProviderError::ContainerNotFound(id.0.clone()))?;
        c.running = !stops;
        Ok(())
    }

    async fn teardown(&self, project: &str) -> Result<()> {
        self.record(MockCall::Teardown {
            project: project.to_string(),
        });
        if let Some(err) = take_error(&self.teardown_error) {
            return Err(err);
        }
        let member = format!("{}-", project);
        self.containers
            .lock()
            .unwrap()
            .retain(|c| !c.name.starts_with(&member));
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.record(MockCall::Ping);
        match take_error(&self.ping_error) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider_type: ProviderType::Docker,
            command: "mock".to_string(),
        }
    }
}

/// Provisioner that adds a running container to a [`MockRuntime`]
#[derive(Clone)]
pub struct MockProvisioner {
    naming: NamingScheme,
    calls: Arc<Mutex<Vec<MockCall>>>,
    containers: Arc<Mutex<Vec<MockContainer>>>,
    pub error: Arc<Mutex<Option<ProvisionError>>>,
    /// When false, provisioning "succeeds" without a container appearing
    pub starts_container: Arc<Mutex<bool>>,
    pub volume_error: Arc<Mutex<Option<std::io::ErrorKind>>>,
    /// Simulated script duration
    pub delay: Arc<Mutex<Option<Duration>>>,
}

impl MockProvisioner {
    pub fn new(runtime: &MockRuntime, naming: NamingScheme) -> Self {
        Self {
            naming,
            calls: Arc::clone(&runtime.calls),
            containers: Arc::clone(&runtime.containers),
            error: Arc::new(Mutex::new(None)),
            starts_container: Arc::new(Mutex::new(true)),
            volume_error: Arc::new(Mutex::new(None)),
            delay: Arc::new(Mutex::new(None)),
        }
    }

    pub fn fail_with(&self, err: ProvisionError) {
        *self.error.lock().unwrap() = Some(err);
    }

    pub fn set_starts_container(&self, starts: bool) {
        *self.starts_container.lock().unwrap() = starts;
    }

    pub fn fail_volume(&self, kind: std::io::ErrorKind) {
        *self.volume_error.lock().unwrap() = Some(kind);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn provision(&self, user: UserId, _credential: &Credential) -> std::result::Result<(), ProvisionError> {
        self.calls
            .lock()
            .unwrap()
            .push(MockCall::Provision { user: user.get() });

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.error.lock().unwrap().clone() {
            return Err(err);
        }

        if *self.starts_container.lock().unwrap() {
            let name = self.naming.container_name(user).to_string();
            let mut containers = self.containers.lock().unwrap();
            containers.retain(|c| c.name != name);
            containers.push(MockContainer::running(&name).with_stats(sample_stats()));
        }
        Ok(())
    }

    async fn teardown_volume(&self, user: UserId) -> std::io::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(MockCall::TeardownVolume { user: user.get() });
        match *self.volume_error.lock().unwrap() {
            Some(kind) => Err(std::io::Error::new(kind, "mock volume removal failure")),
            None => Ok(()),
        }
    }
}

/// Reachability checker with fixed answers
#[derive(Clone)]
pub struct MockReachability {
    calls: Arc<Mutex<Vec<MockCall>>>,
    pub web: Arc<Mutex<bool>>,
    pub secondary: Arc<Mutex<bool>>,
}

impl MockReachability {
    pub fn new(runtime: &MockRuntime) -> Self {
        Self {
            calls: Arc::clone(&runtime.calls),
            web: Arc::new(Mutex::new(true)),
            secondary: Arc::new(Mutex::new(true)),
        }
    }

    pub fn set(&self, web: bool, secondary: bool) {
        *self.web.lock().unwrap() = web;
        *self.secondary.lock().unwrap() = secondary;
    }
}

#[async_trait]
impl ReachabilityCheck for MockReachability {
    async fn check_web(&self, port: u16) -> bool {
        self.calls.lock().unwrap().push(MockCall::CheckWeb { port });
        *self.web.lock().unwrap()
    }

    async fn check_secondary(&self, port: u16) -> bool {
        self.calls
            .lock()
            .unwrap()
            .push(MockCall::CheckSecondary { port });
        *self.secondary.lock().unwrap()
    }
}

/// A manager wired to fresh mocks, with handles for setup and assertions
pub struct TestHarness {
    pub runtime: MockRuntime,
    pub provisioner: MockProvisioner,
    pub reachability: MockReachability,
    pub manager: ContainerManager,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_naming(NamingScheme::default())
    }

    pub fn with_naming(naming: NamingScheme) -> Self {
        let runtime = MockRuntime::new();
        let provisioner = MockProvisioner::new(&runtime, naming.clone());
        let reachability = MockReachability::new(&runtime);
        let manager = ContainerManager::new(
            naming,
            Box::new(runtime.clone()),
            Box::new(provisioner.clone()),
            Box::new(reachability.clone()),
        );
        Self {
            runtime,
            provisioner,
            reachability,
            manager,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
