//! User identity ↔ container name ↔ port mapping
//!
//! Pure functions, no I/O. Names follow `<prefix>_<user>-<suffix>` and are
//! matched against the whole string, so prefixes, suffixes, extra path
//! segments or shell metacharacters never slip through.

use crate::{CoreError, Result};
use serde::Serialize;
use userbox_config::NamingConfig;
use userbox_provider::ContainerId;

/// Base of the HTTP port band: user `n` gets `HTTP_PORT_BASE + n`
pub const HTTP_PORT_BASE: u16 = 50000;
/// Base of the HTTPS/websocket port band: user `n` gets `HTTPS_PORT_BASE + n`
pub const HTTPS_PORT_BASE: u16 = 51000;

/// Longest digit run accepted in a container name; keeps the value inside `u32`
const MAX_USER_DIGITS: usize = 9;

/// A user id known to be within `1..=max_users`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(u32);

impl UserId {
    pub fn get(self) -> u32 {
        self.0
    }

    /// Published ports for this user
    pub fn ports(self) -> PortAssignment {
        // max_users is capped at 999 by config validation, so this cannot overflow
        let offset = self.0 as u16;
        PortAssignment {
            http_port: HTTP_PORT_BASE + offset,
            https_port: HTTPS_PORT_BASE + offset,
        }
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host ports published by a user's container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PortAssignment {
    pub http_port: u16,
    pub https_port: u16,
}

/// A container name that matched the naming pattern.
///
/// The numeric part is well-formed but not necessarily within `max_users`;
/// use [`NamingScheme::user_of`] for the range check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerName {
    name: String,
    number: u32,
}

impl ContainerName {
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The number embedded in the name, unchecked against `max_users`
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn to_container_id(&self) -> ContainerId {
        ContainerId::new(self.name.clone())
    }
}

impl std::fmt::Display for ContainerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Naming scheme and valid user range, built once from config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    prefix: String,
    suffix: String,
    max_users: u32,
}

impl NamingScheme {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>, max_users: u32) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            max_users,
        }
    }

    pub fn from_config(config: &NamingConfig) -> Self {
        Self::new(config.prefix.clone(), config.suffix.clone(), config.max_users)
    }

    pub fn max_users(&self) -> u32 {
        self.max_users
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Validate a raw user id from a request
    pub fn user_id(&self, raw: i64) -> Result<UserId> {
        if raw < 1 || raw > i64::from(self.max_users) {
            return Err(CoreError::Validation(format!(
                "Invalid user_id. Must be between 1 and {}",
                self.max_users
            )));
        }
        // In range, so it fits in u32
        Ok(UserId(raw as u32))
    }

    /// Container name of a validated user
    pub fn container_name(&self, user: UserId) -> ContainerName {
        ContainerName {
            name: format!("{}_{}-{}", self.prefix, user.0, self.suffix),
            number: user.0,
        }
    }

    /// Container name for a raw user id, rejecting ids outside the valid range
    pub fn container_name_for(&self, raw: i64) -> Result<ContainerName> {
        self.user_id(raw).map(|user| self.container_name(user))
    }

    /// Ports for a raw user id, rejecting ids outside the valid range
    pub fn ports(&self, raw: i64) -> Result<PortAssignment> {
        self.user_id(raw).map(UserId::ports)
    }

    /// Compose project owning a user's containers
    pub fn project_name(&self, user: UserId) -> String {
        format!("{}_{}", self.prefix, user.0)
    }

    /// Check that `raw` is exactly `<prefix>_<digits>-<suffix>`.
    ///
    /// Digits must be canonical (no sign, no leading zero) so that each
    /// accepted name maps back to exactly one user id.
    pub fn parse_name(&self, raw: &str) -> Result<ContainerName> {
        let invalid = || CoreError::Validation("Invalid container_id format".to_string());

        let digits = raw
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|rest| rest.strip_suffix(self.suffix.as_str()))
            .and_then(|rest| rest.strip_suffix('-'))
            .ok_or_else(invalid)?;

        if digits.is_empty()
            || digits.len() > MAX_USER_DIGITS
            || !digits.bytes().all(|b| b.is_ascii_digit())
            || digits.starts_with('0')
        {
            return Err(invalid());
        }

        let number: u32 = digits.parse().map_err(|_| invalid())?;
        Ok(ContainerName {
            name: raw.to_string(),
            number,
        })
    }

    /// Range-check the user embedded in an already parsed name
    pub fn user_of(&self, name: &ContainerName) -> Result<UserId> {
        self.user_id(i64::from(name.number))
    }

    /// Inverse of [`container_name`](Self::container_name)
    pub fn parse_user_id(&self, raw: &str) -> Result<UserId> {
        let name = self.parse_name(raw)?;
        self.user_of(&name)
    }
}

impl Default for NamingScheme {
    fn default() -> Self {
        Self::from_config(&NamingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn scheme() -> NamingScheme {
        NamingScheme::default()
    }

    #[test]
    fn test_container_name_format() {
        let naming = scheme();
        let name = naming.container_name_for(7).unwrap();
        assert_eq!(name.as_str(), "dify_7-api-1");
        assert_eq!(name.number(), 7);
    }

    #[test]
    fn test_round_trip_all_users() {
        let naming = scheme();
        for raw in 1..=i64::from(naming.max_users()) {
            let name = naming.container_name_for(raw).unwrap();
            let user = naming.parse_user_id(name.as_str()).unwrap();
            assert_eq!(i64::from(user.get()), raw);
        }
    }

    #[test]
    fn test_ports_never_collide() {
        let naming = NamingScheme::new("dify", "api-1", 999);
        let mut seen = HashSet::new();
        for raw in 1..=999 {
            let ports = naming.ports(raw).unwrap();
            assert!(seen.insert(ports.http_port), "http port {} reused", ports.http_port);
            assert!(seen.insert(ports.https_port), "https port {} reused", ports.https_port);
        }
    }

    #[test]
    fn test_ports_formula() {
        let ports = scheme().ports(1).unwrap();
        assert_eq!(ports.http_port, 50001);
        assert_eq!(ports.https_port, 51001);
        let ports = scheme().ports(100).unwrap();
        assert_eq!(ports.http_port, 50100);
        assert_eq!(ports.https_port, 51100);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let naming = scheme();
        for raw in [0, -1, 101, i64::MAX, i64::MIN] {
            assert!(matches!(naming.container_name_for(raw), Err(CoreError::Validation(_))));
            assert!(matches!(naming.ports(raw), Err(CoreError::Validation(_))));
        }
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        let naming = scheme();
        let bad = [
            "",
            "dify_-api-1",
            "dify_1-api-1; rm -rf /",
            "dify_1-api-1\n",
            " dify_1-api-1",
            "xdify_1-api-1",
            "dify_1-api-10",
            "dify_1-api-1/../x",
            "../dify_1-api-1",
            "dify_1/api-1",
            "dify_1-api",
            "dify_1",
            "dify_+1-api-1",
            "dify_-1-api-1",
            "dify_01-api-1",
            "dify_1a-api-1",
            "dify_1 -api-1",
            "dify_$(id)-api-1",
            "dify_1234567890-api-1",
            "dify_１-api-1",
            "bad id",
        ];
        for raw in bad {
            assert!(
                matches!(naming.parse_name(raw), Err(CoreError::Validation(_))),
                "{:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_parse_format_ok_but_out_of_range() {
        let naming = scheme();
        let name = naming.parse_name("dify_500-api-1").unwrap();
        assert_eq!(name.number(), 500);
        assert!(naming.user_of(&name).is_err());
        assert!(naming.parse_user_id("dify_500-api-1").is_err());
    }

    #[test]
    fn test_custom_scheme() {
        let naming = NamingScheme::new("tenant", "web-1", 10);
        let name = naming.container_name_for(3).unwrap();
        assert_eq!(name.as_str(), "tenant_3-web-1");
        assert_eq!(naming.parse_user_id("tenant_3-web-1").unwrap().get(), 3);
        assert!(naming.parse_name("dify_3-api-1").is_err());
        assert_eq!(naming.project_name(naming.user_id(3).unwrap()), "tenant_3");
    }

    #[test]
    fn test_project_name() {
        let naming = scheme();
        let user = naming.user_id(42).unwrap();
        assert_eq!(naming.project_name(user), "dify_42");
        assert_eq!(user.to_string(), "42");
    }
}
