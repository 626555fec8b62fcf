//! Manager configuration for userbox
//!
//! Located at `~/.config/userbox/config.toml`. Every section is optional and
//! falls back to the defaults below.

use crate::{ConfigError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Highest `max_users` that keeps the HTTP and HTTPS port bands (1000 apart) disjoint
pub const MAX_USERS_LIMIT: u32 = 999;

/// Top-level userbox configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub server: ServerConfig,
    pub naming: NamingConfig,
    pub runtime: RuntimeConfig,
    pub provisioner: ProvisionerConfig,
    pub reachability: ReachabilityConfig,
}

/// HTTP control API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the control API binds to
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:9080".to_string(),
        }
    }
}

/// Container naming scheme: `<prefix>_<user>-<suffix>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Leading part of every managed container name, also the compose project prefix
    pub prefix: String,
    /// Trailing part, the compose service and replica index (`api-1`)
    pub suffix: String,
    /// Highest valid user id
    pub max_users: u32,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            prefix: "dify".to_string(),
            suffix: "api-1".to_string(),
            max_users: 100,
        }
    }
}

/// Container runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runtime CLI ("docker" or "podman")
    pub command: String,
    /// Compose file used for `compose down`; the project name alone is used when unset
    pub compose_file: Option<String>,
    /// Timeout for read-only queries (ps, inspect, stats)
    pub query_timeout_secs: u64,
    /// Timeout for restart and compose teardown
    pub mutation_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command: "docker".to_string(),
            compose_file: None,
            query_timeout_secs: 10,
            mutation_timeout_secs: 120,
        }
    }
}

impl RuntimeConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_secs(self.mutation_timeout_secs)
    }

    /// Compose file with `~` and environment variables expanded
    pub fn compose_file_path(&self) -> Result<Option<PathBuf>> {
        self.compose_file.as_deref().map(expand_path).transpose()
    }
}

/// External provisioning script settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// Interpreter the script is run with
    pub shell: String,
    /// Script invoked as `<shell> <script> <user_id> <password>`
    pub script: String,
    /// Parent of the per-user `user_<id>` data directories
    pub data_dir: String,
    /// Upper bound for a single provisioning run
    pub timeout_secs: u64,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            script: "./start_dify_multi_user.sh".to_string(),
            data_dir: "~/dify_data".to_string(),
            timeout_secs: 600,
        }
    }
}

impl ProvisionerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn script_path(&self) -> Result<PathBuf> {
        expand_path(&self.script)
    }

    pub fn data_dir_path(&self) -> Result<PathBuf> {
        expand_path(&self.data_dir)
    }
}

/// Port probe settings used by health checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReachabilityConfig {
    /// Host the published ports are probed on
    pub host: String,
    /// Per-probe timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            timeout_ms: 2000,
        }
    }
}

impl ReachabilityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ManagerConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path, using defaults when it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load configuration from a path the user asked for explicitly; a missing file is an error
    pub fn load_required(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::load_from(path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "userbox").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Reject settings that would produce unsafe container names or overlapping ports
    pub fn validate(&self) -> Result<()> {
        let naming = &self.naming;

        if !is_valid_prefix(&naming.prefix) {
            return Err(ConfigError::Invalid(format!(
                "naming.prefix '{}' must start with a lowercase letter or digit and contain only [a-z0-9_-]",
                naming.prefix
            )));
        }
        if !is_valid_suffix(&naming.suffix) {
            return Err(ConfigError::Invalid(format!(
                "naming.suffix '{}' must be non-empty and contain only [A-Za-z0-9_.-]",
                naming.suffix
            )));
        }
        if naming.max_users == 0 || naming.max_users > MAX_USERS_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "naming.max_users must be between 1 and {}, got {}",
                MAX_USERS_LIMIT, naming.max_users
            )));
        }

        if self.runtime.command.trim().is_empty() {
            return Err(ConfigError::Invalid("runtime.command must not be empty".into()));
        }
        if self.provisioner.shell.trim().is_empty() {
            return Err(ConfigError::Invalid("provisioner.shell must not be empty".into()));
        }
        if self.provisioner.script.trim().is_empty() {
            return Err(ConfigError::Invalid("provisioner.script must not be empty".into()));
        }
        if self.provisioner.data_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("provisioner.data_dir must not be empty".into()));
        }

        let timeouts = [
            ("runtime.query_timeout_secs", self.runtime.query_timeout_secs),
            ("runtime.mutation_timeout_secs", self.runtime.mutation_timeout_secs),
            ("provisioner.timeout_secs", self.provisioner.timeout_secs),
            ("reachability.timeout_ms", self.reachability.timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
            }
        }

        Ok(())
    }
}

/// Compose project names must be lowercase, and the prefix is the start of one.
fn is_valid_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

fn is_valid_suffix(suffix: &str) -> bool {
    !suffix.is_empty()
        && suffix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Expand `~` and `$VAR` references in a configured path
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    shellexpand::full(raw)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| ConfigError::PathExpansion {
            path: raw.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:9080");
        assert_eq!(config.naming.prefix, "dify");
        assert_eq!(config.naming.suffix, "api-1");
        assert_eq!(config.naming.max_users, 100);
        assert_eq!(config.runtime.command, "docker");
        assert!(config.runtime.compose_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[naming]
max_users = 20

[runtime]
command = "podman"
compose_file = "/srv/dify/docker-compose.yaml"

[reachability]
timeout_ms = 500
"#;

        let config: ManagerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.naming.max_users, 20);
        assert_eq!(config.naming.prefix, "dify");
        assert_eq!(config.runtime.command, "podman");
        assert_eq!(
            config.runtime.compose_file.as_deref(),
            Some("/srv/dify/docker-compose.yaml")
        );
        assert_eq!(config.runtime.query_timeout_secs, 10);
        assert_eq!(config.reachability.timeout(), Duration::from_millis(500));
        assert_eq!(config.provisioner.shell, "bash");
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ManagerConfig::load_from(&tmp.path().join("nope.toml")).unwrap();
        assert_eq!(config, ManagerConfig::default());
    }

    #[test]
    fn test_load_required_missing_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let result = ManagerConfig::load_required(&tmp.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_from_invalid_toml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[naming\nprefix = ").unwrap();
        let result = ManagerConfig::load_from(&path);
        assert!(matches!(result, Err(ConfigError::TomlParseError { .. })));
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        let mut config = ManagerConfig::default();
        config.naming.max_users = 42;
        config.runtime.compose_file = Some("/opt/compose.yaml".to_string());
        config.save_to(&path).unwrap();

        let loaded = ManagerConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_rejects_bad_prefix() {
        for prefix in ["", "Dify", "_dify", "di fy", "dify/../x", "dify;rm"] {
            let mut config = ManagerConfig::default();
            config.naming.prefix = prefix.to_string();
            assert!(config.validate().is_err(), "prefix {:?} should be rejected", prefix);
        }
    }

    #[test]
    fn test_validate_rejects_bad_suffix() {
        for suffix in ["", "api 1", "api/1", "api-1$"] {
            let mut config = ManagerConfig::default();
            config.naming.suffix = suffix.to_string();
            assert!(config.validate().is_err(), "suffix {:?} should be rejected", suffix);
        }
    }

    #[test]
    fn test_validate_max_users_bounds() {
        let mut config = ManagerConfig::default();
        config.naming.max_users = 0;
        assert!(config.validate().is_err());
        config.naming.max_users = MAX_USERS_LIMIT + 1;
        assert!(config.validate().is_err());
        config.naming.max_users = MAX_USERS_LIMIT;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = ManagerConfig::default();
        config.provisioner.timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("provisioner.timeout_secs"));
    }

    #[test]
    fn test_expand_path_plain() {
        let path = expand_path("/var/lib/userbox").unwrap();
        assert_eq!(path, PathBuf::from("/var/lib/userbox"));
    }

    #[test]
    fn test_expand_path_unknown_variable_fails() {
        let result = expand_path("$USERBOX_SURELY_UNSET_VARIABLE_123/data");
        assert!(matches!(result, Err(ConfigError::PathExpansion { .. })));
    }
}
