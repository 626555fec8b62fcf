//! Results of lifecycle operations
//!
//! These serialize to the wire shapes the control API returns, so the server
//! can hand them to `Json` directly.

use crate::identity::{ContainerName, PortAssignment, UserId};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use userbox_provider::ContainerStats;

/// Shown in place of a start time the runtime could not provide
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateStatus {
    /// Provisioned by this call and confirmed running
    Running,
    /// Was already running; nothing was provisioned
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateOutcome {
    #[serde(rename = "container_id", serialize_with = "as_name")]
    pub container: ContainerName,
    #[serde(skip)]
    pub user_id: UserId,
    #[serde(flatten)]
    pub ports: PortAssignment,
    pub status: CreateStatus,
}

impl CreateOutcome {
    pub fn created(&self) -> bool {
        self.status == CreateStatus::Running
    }

    pub fn message(&self) -> &'static str {
        match self.status {
            CreateStatus::Running => "Container created successfully",
            CreateStatus::AlreadyRunning => "Container is already running",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestroyOutcome {
    Destroyed(ContainerName),
    /// Nothing to destroy; not an error so retries are safe
    NotFound(ContainerName),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealth {
    Healthy,
    Unhealthy,
}

impl From<bool> for ServiceHealth {
    fn from(reachable: bool) -> Self {
        if reachable {
            Self::Healthy
        } else {
            Self::Unhealthy
        }
    }
}

/// Resource usage as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceUsage {
    pub cpu_usage: String,
    pub memory_usage: String,
    pub memory_percent: String,
}

impl From<ContainerStats> for ResourceUsage {
    fn from(stats: ContainerStats) -> Self {
        Self {
            cpu_usage: stats.cpu_percent,
            memory_usage: stats.memory_usage,
            memory_percent: stats.memory_percent,
        }
    }
}

/// Reachability of a running user's published services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    pub web_service: ServiceHealth,
    pub websocket_service: ServiceHealth,
    #[serde(flatten)]
    pub ports: PortAssignment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    #[serde(serialize_with = "as_name")]
    pub container_id: ContainerName,
    pub status: RunState,
    #[serde(serialize_with = "as_timestamp_or_unknown")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub usage: Option<ResourceUsage>,
    #[serde(flatten)]
    pub services: Option<ServiceReport>,
}

impl HealthReport {
    pub fn is_running(&self) -> bool {
        self.status == RunState::Running
    }
}

/// One managed container in a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerEntry {
    pub container_id: String,
    pub user_id: UserId,
    /// Runtime state string, as the runtime reports it
    pub status: String,
    /// Creation time, as the runtime reports it
    pub created: String,
    pub http_port: u16,
    pub https_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerList {
    pub total: usize,
    pub containers: Vec<ContainerEntry>,
}

impl ContainerList {
    pub fn new(containers: Vec<ContainerEntry>) -> Self {
        Self {
            total: containers.len(),
            containers,
        }
    }
}

fn as_name<S: Serializer>(name: &ContainerName, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(name.as_str())
}

fn as_timestamp_or_unknown<S: Serializer>(
    at: &Option<DateTime<Utc>>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match at {
        Some(at) => s.serialize_str(&at.to_rfc3339()),
        None => s.serialize_str(UNKNOWN),
    }
}
