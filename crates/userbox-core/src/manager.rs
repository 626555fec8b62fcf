//! Container manager - coordinates the per-user container lifecycle
//!
//! Every operation re-derives state from the runtime; nothing about a
//! container is cached between calls. Mutations on the same container are
//! serialized through [`ContainerLocks`].

use crate::container::{
    ContainerEntry, ContainerList, CreateOutcome, CreateStatus, DestroyOutcome, HealthReport,
    RunState, ServiceHealth, ServiceReport,
};
use crate::identity::{ContainerName, NamingScheme};
use crate::locks::ContainerLocks;
use crate::probe::RuntimeProbe;
use crate::provision::{Credential, Provisioner, ScriptProvisioner};
use crate::reachability::{NetworkProbe, ReachabilityCheck};
use crate::{CoreError, Result};
use userbox_config::ManagerConfig;
use userbox_provider::{ListFilter, ProviderError, ProviderInfo, RuntimeGateway};

/// Main container manager
pub struct ContainerManager {
    naming: NamingScheme,
    probe: RuntimeProbe,
    provisioner: Box<dyn Provisioner>,
    reachability: Box<dyn ReachabilityCheck>,
    locks: ContainerLocks,
}

impl ContainerManager {
    pub fn new(
        naming: NamingScheme,
        runtime: Box<dyn RuntimeGateway>,
        provisioner: Box<dyn Provisioner>,
        reachability: Box<dyn ReachabilityCheck>,
    ) -> Self {
        Self {
            naming,
            probe: RuntimeProbe::new(runtime),
            provisioner,
            reachability,
            locks: ContainerLocks::new(),
        }
    }

    /// Build a manager with the script provisioner and network probes from config
    pub fn from_config(config: &ManagerConfig, runtime: Box<dyn RuntimeGateway>) -> Result<Self> {
        let provisioner = ScriptProvisioner::from_config(&config.provisioner)?;
        let reachability = NetworkProbe::from_config(&config.reachability)
            .map_err(|e| CoreError::Setup(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::new(
            NamingScheme::from_config(&config.naming),
            runtime,
            Box::new(provisioner),
            Box::new(reachability),
        ))
    }

    pub fn naming(&self) -> &NamingScheme {
        &self.naming
    }

    pub fn runtime_info(&self) -> ProviderInfo {
        self.probe.gateway().info()
    }

    /// Whether the container runtime answers at all
    pub async fn ping(&self) -> bool {
        userbox_provider::test_runtime_connectivity(self.probe.gateway()).await
    }

    /// Provision a user's container unless it is already running
    pub async fn create(&self, user_id: i64, credential: &Credential) -> Result<CreateOutcome> {
        let user = self.naming.user_id(user_id)?;
        let container = self.naming.container_name(user);
        let ports = user.ports();
        let _guard = self.locks.acquire(&container).await;

        if self.probe.is_running(&container).await? {
            tracing::info!(container = %container, "Container already running");
            return Ok(CreateOutcome {
                container,
                user_id: user,
                ports,
                status: CreateStatus::AlreadyRunning,
            });
        }

        tracing::info!(container = %container, user = %user, "Provisioning container");
        self.provisioner
            .provision(user, credential)
            .await
            .map_err(|source| {
                tracing::error!(container = %container, "Provisioning failed: {}", source);
                CoreError::Provision {
                    container: container.to_string(),
                    source,
                }
            })?;

        if !self.probe.is_running(&container).await? {
            tracing::warn!(container = %container, "Provisioning succeeded but container is not running");
            return Err(CoreError::InconsistentState(format!(
                "Container {} was created but is not running",
                container
            )));
        }

        tracing::info!(container = %container, http_port = ports.http_port, "Container running");
        Ok(CreateOutcome {
            container,
            user_id: user,
            ports,
            status: CreateStatus::Running,
        })
    }

    /// Tear down a user's containers and remove their data directory
    pub async fn destroy(&self, container_id: &str) -> Result<DestroyOutcome> {
        let container = self.naming.parse_name(container_id)?;
        let user = self.naming.user_of(&container)?;
        let _guard = self.locks.acquire(&container).await;

        if !self.probe.exists(&container).await? {
            tracing::info!(container = %container, "Nothing to destroy");
            return Ok(DestroyOutcome::NotFound(container));
        }

        // Both steps run even if the first fails
        let project = self.naming.project_name(user);
        let runtime = match self.probe.gateway().teardown(&project).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(container = %container, project = %project, "Runtime teardown failed: {}", e);
                Some(e.to_string())
            }
        };
        let volume = match self.provisioner.teardown_volume(user).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(container = %container, "Volume removal failed: {}", e);
                Some(e.to_string())
            }
        };

        if runtime.is_some() || volume.is_some() {
            return Err(CoreError::TeardownFailed {
                container: container.to_string(),
                runtime,
                volume,
            });
        }

        tracing::info!(container = %container, "Container destroyed");
        Ok(DestroyOutcome::Destroyed(container))
    }

    /// Restart an existing container and confirm it came back up
    pub async fn restart(&self, container_id: &str) -> Result<ContainerName> {
        let container = self.naming.parse_name(container_id)?;
        let _guard = self.locks.acquire(&container).await;

        if !self.probe.exists(&container).await? {
            return Err(CoreError::ContainerNotFound(container.to_string()));
        }

        self.probe
            .gateway()
            .restart(&container.to_container_id())
            .await
            .map_err(|e| match e {
                // Removed between the existence check and the restart
                ProviderError::ContainerNotFound(_) => {
                    CoreError::ContainerNotFound(container.to_string())
                }
                other => other.into(),
            })?;

        if !self.probe.is_running(&container).await? {
            tracing::warn!(container = %container, "Restart succeeded but container is not running");
            return Err(CoreError::InconsistentState(format!(
                "Container {} was restarted but is not running",
                container
            )));
        }

        tracing::info!(container = %container, "Container restarted");
        Ok(container)
    }

    /// Aggregate runtime state, usage and reachability of a container
    pub async fn health(&self, container_id: &str) -> Result<HealthReport> {
        let container = self.naming.parse_name(container_id)?;

        if !self.probe.exists(&container).await? {
            return Err(CoreError::ContainerNotFound(container.to_string()));
        }

        let running = match self.probe.is_running(&container).await {
            Ok(running) => running,
            Err(e) => {
                tracing::debug!(container = %container, "Running check failed: {}", e);
                false
            }
        };

        if !running {
            return Ok(HealthReport {
                container_id: container,
                status: RunState::Stopped,
                started_at: None,
                usage: None,
                services: None,
            });
        }

        // Reachability only for names whose user is in range
        let user = self.naming.user_of(&container).ok();
        let services = async {
            let ports = user?.ports();
            let (web, websocket) = tokio::join!(
                self.reachability.check_web(ports.http_port),
                self.reachability.check_secondary(ports.https_port),
            );
            Some(ServiceReport {
                web_service: ServiceHealth::from(web),
                websocket_service: ServiceHealth::from(websocket),
                ports,
            })
        };

        let (started_at, stats, services) = tokio::join!(
            self.probe.started_at(&container),
            self.probe.sample_stats(&container),
            services,
        );

        Ok(HealthReport {
            container_id: container,
            status: RunState::Running,
            started_at,
            usage: stats.map(Into::into),
            services,
        })
    }

    /// All managed containers in any state, ordered by user id
    pub async fn list(&self) -> Result<ContainerList> {
        let filter = ListFilter::all_named(format!("{}_", self.naming.prefix()));
        let summaries = self.probe.gateway().list(&filter).await?;

        let mut entries: Vec<ContainerEntry> = summaries
            .iter()
            .filter_map(|summary| {
                let (name, user) = summary.names.iter().find_map(|raw| {
                    let name = self.naming.parse_name(raw).ok()?;
                    let user = self.naming.user_of(&name).ok()?;
                    Some((name, user))
                })?;
                let ports = user.ports();
                Some(ContainerEntry {
                    container_id: name.to_string(),
                    user_id: user,
                    status: summary.state.clone(),
                    created: summary.created.clone(),
                    http_port: ports.http_port,
                    https_port: ports.https_port,
                })
            })
            .collect();

        entries.sort_by(|a, b| {
            a.user_id
                .cmp(&b.user_id)
                .then_with(|| a.container_id.cmp(&b.container_id))
        });
        Ok(ContainerList::new(entries))
    }
}
