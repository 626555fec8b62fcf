//! Common types for container runtimes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Container ID or name, passed to the runtime as a single argument
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Container runtime type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Docker,
    Podman,
}

impl ProviderType {
    /// Guess the runtime flavour from the configured command (`/usr/bin/podman` → Podman)
    pub fn from_command(command: &str) -> Self {
        let binary = std::path::Path::new(command)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(command);
        if binary.contains("podman") {
            Self::Podman
        } else {
            Self::Docker
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::Podman => write!(f, "podman"),
        }
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            _ => Err(format!("Unknown provider type: {}", s)),
        }
    }
}

/// Container status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Restarting => write!(f, "restarting"),
            Self::Removing => write!(f, "removing"),
            Self::Exited => write!(f, "exited"),
            Self::Dead => write!(f, "dead"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<&str> for ContainerStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" | "stopped" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }
}

/// Which containers a listing should return
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Include stopped containers (`ps -a`)
    pub all: bool,
    /// Runtime-side name filter. Docker treats this as an unanchored match,
    /// so callers must still compare names exactly.
    pub name: Option<String>,
}

impl ListFilter {
    pub fn all() -> Self {
        Self {
            all: true,
            name: None,
        }
    }

    pub fn all_named(name: impl Into<String>) -> Self {
        Self {
            all: true,
            name: Some(name.into()),
        }
    }

    pub fn running_named(name: impl Into<String>) -> Self {
        Self {
            all: false,
            name: Some(name.into()),
        }
    }
}

/// One row of a container listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: ContainerId,
    /// All names the runtime reports for the container, without leading `/`
    pub names: Vec<String>,
    /// Raw runtime state string ("running", "exited", ...)
    pub state: String,
    /// Creation time as the runtime formats it
    pub created: String,
}

impl ContainerSummary {
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn status(&self) -> ContainerStatus {
        ContainerStatus::from(self.state.as_str())
    }
}

/// Subset of `inspect` output the manager relies on
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDetails {
    pub id: ContainerId,
    pub name: String,
    pub status: ContainerStatus,
    pub running: bool,
    /// `None` when the runtime reports the zero time or an unparseable value
    pub started_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i64>,
}

/// Point-in-time resource usage, kept as the runtime formats it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStats {
    /// e.g. "0.25%"
    pub cpu_percent: String,
    /// e.g. "120.5MiB / 7.6GiB"
    pub memory_usage: String,
    /// e.g. "1.55%"
    pub memory_percent: String,
}

/// Runtime information
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub provider_type: ProviderType,
    pub command: String,
}
