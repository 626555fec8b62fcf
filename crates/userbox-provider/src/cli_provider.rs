//! CLI-based container runtime for Docker and Podman
//!
//! Every call runs the runtime binary directly with an argument vector, never
//! through a shell, and is bounded by a timeout. Container names are passed as
//! single arguments so they cannot be reinterpreted by the runtime or a shell.

use crate::{
    ContainerDetails, ContainerId, ContainerStats, ContainerStatus, ContainerSummary, ListFilter,
    ProviderError, ProviderInfo, ProviderType, Result, RuntimeGateway,
};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use userbox_config::RuntimeConfig;

/// CLI-based container runtime
pub struct CliRuntime {
    /// Command to use ("docker" or "podman")
    cmd: String,
    provider_type: ProviderType,
    /// Compose file passed to `compose down`
    compose_file: Option<PathBuf>,
    query_timeout: Duration,
    mutation_timeout: Duration,
}

impl CliRuntime {
    /// Create a runtime for the given command with default timeouts
    pub fn new(cmd: impl Into<String>) -> Self {
        let cmd = cmd.into();
        let defaults = RuntimeConfig::default();
        Self {
            provider_type: ProviderType::from_command(&cmd),
            cmd,
            compose_file: None,
            query_timeout: defaults.query_timeout(),
            mutation_timeout: defaults.mutation_timeout(),
        }
    }

    /// Create a runtime from the `[runtime]` config section
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        Ok(Self::new(config.command.clone())
            .with_compose_file(config.compose_file_path()?)
            .with_timeouts(config.query_timeout(), config.mutation_timeout()))
    }

    pub fn with_compose_file(mut self, compose_file: Option<PathBuf>) -> Self {
        self.compose_file = compose_file;
        self
    }

    pub fn with_timeouts(mut self, query: Duration, mutation: Duration) -> Self {
        self.query_timeout = query;
        self.mutation_timeout = mutation;
        self
    }

    /// Run a command and get its stdout, failing on nonzero exit or timeout
    async fn run_cmd(&self, args: &[&str], timeout: Duration) -> Result<String> {
        let mut cmd = Command::new(&self.cmd);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Running {} {}", self.cmd, args.join(" "));

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProviderError::ConnectionError(format!(
                    "'{}' executable not found",
                    self.cmd
                )));
            }
            Ok(Err(e)) => return Err(ProviderError::RuntimeError(e.to_string())),
            Err(_) => {
                return Err(ProviderError::Timeout {
                    operation: format!("{} {}", self.cmd, args.first().unwrap_or(&"")),
                    secs: timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(classify_failure(stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Arguments for `compose down` scoped to one project
    fn compose_down_args(&self, project: &str) -> Vec<String> {
        let mut args = vec!["compose".to_string()];
        if let Some(ref file) = self.compose_file {
            args.push("-f".to_string());
            args.push(file.to_string_lossy().to_string());
        }
        args.push("-p".to_string());
        args.push(project.to_string());
        args.push("down".to_string());
        args
    }
}

#[async_trait]
impl RuntimeGateway for CliRuntime {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContainerSummary>> {
        let name_filter = filter.name.as_ref().map(|n| format!("name={}", n));

        let mut args = vec!["ps"];
        if filter.all {
            args.push("-a");
        }
        args.push("--no-trunc");
        if let Some(ref f) = name_filter {
            args.push("--filter");
            args.push(f);
        }
        args.push("--format");
        args.push("{{json .}}");

        let output = self.run_cmd(&args, self.query_timeout).await?;
        Ok(parse_list_output(&output))
    }

    async fn inspect(&self, id: &ContainerId) -> Result<ContainerDetails> {
        let output = self
            .run_cmd(&["container", "inspect", &id.0], self.query_timeout)
            .await?;
        parse_inspect_output(&output, id)
    }

    async fn stats(&self, id: &ContainerId) -> Result<ContainerStats> {
        let output = self
            .run_cmd(
                &["stats", "--no-stream", "--format", "{{json .}}", &id.0],
                self.query_timeout,
            )
            .await?;
        parse_stats_output(&output)
    }

    async fn restart(&self, id: &ContainerId) -> Result<()> {
        self.run_cmd(&["restart", &id.0], self.mutation_timeout)
            .await?;
        Ok(())
    }

    async fn teardown(&self, project: &str) -> Result<()> {
        let args = self.compose_down_args(project);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_cmd(&args, self.mutation_timeout)
            .await
            .map_err(|e| match e {
                ProviderError::RuntimeError(detail) => ProviderError::RuntimeError(format!(
                    "{} compose down failed: {}",
                    self.cmd, detail
                )),
                other => other,
            })?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.run_cmd(&["version"], self.query_timeout)
            .await
            .map_err(|e| match e {
                ProviderError::RuntimeError(detail) => ProviderError::ConnectionError(detail),
                other => other,
            })?;
        Ok(())
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider_type: self.provider_type,
            command: self.cmd.clone(),
        }
    }
}

/// Map a failed command's stderr to the most specific error
fn classify_failure(stderr: String) -> ProviderError {
    let lower = stderr.to_lowercase();
    if lower.contains("no such container") || lower.contains("no such object") {
        ProviderError::ContainerNotFound(stderr)
    } else {
        ProviderError::RuntimeError(stderr)
    }
}

/// Parse line-delimited JSON from `ps --format {{json .}}`.
/// Lines that are not JSON objects are skipped.
fn parse_list_output(output: &str) -> Vec<ContainerSummary> {
    let mut containers = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("Skipping unparseable ps line ({}): {:?}", e, line);
                continue;
            }
        };
        if let Some(summary) = summary_from_json(&value) {
            containers.push(summary);
        }
    }
    containers
}

fn summary_from_json(value: &serde_json::Value) -> Option<ContainerSummary> {
    let obj = value.as_object()?;

    // Docker: "a,b" string. Podman: ["a", "b"].
    let names: Vec<String> = match obj.get("Names") {
        Some(serde_json::Value::String(s)) => s
            .split(',')
            .map(|n| n.trim().trim_start_matches('/').to_string())
            .filter(|n| !n.is_empty())
            .collect(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(serde_json::Value::as_str)
            .map(|n| n.trim_start_matches('/').to_string())
            .collect(),
        _ => return None,
    };
    if names.is_empty() {
        return None;
    }

    let id = obj
        .get("ID")
        .or_else(|| obj.get("Id"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("")
        .to_string();

    let state = obj
        .get("State")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    let created = match obj.get("CreatedAt") {
        Some(serde_json::Value::String(s)) => s.clone(),
        _ => obj
            .get("Created")
            .and_then(serde_json::Value::as_i64)
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default(),
    };

    Some(ContainerSummary {
        id: ContainerId::new(id),
        names,
        state,
        created,
    })
}

/// Parse JSON output of `container inspect`.
/// Accepts either the common array form (`[ {...} ]`) or a single object.
fn parse_inspect_output(output: &str, id: &ContainerId) -> Result<ContainerDetails> {
    let trimmed = output.trim();
    let parsed: serde_json::Value =
        serde_json::from_str(trimmed).map_err(|e: serde_json::Error| {
            let preview = trimmed
                .lines()
                .next()
                .unwrap_or("")
                .chars()
                .take(200)
                .collect::<String>();
            ProviderError::ParseError(format!(
                "inspect output was not valid JSON: {} (output preview: {:?})",
                e, preview
            ))
        })?;

    let info = match &parsed {
        serde_json::Value::Array(items) => items
            .first()
            .ok_or_else(|| ProviderError::ContainerNotFound(id.0.clone()))?,
        serde_json::Value::Object(_) => &parsed,
        _ => {
            return Err(ProviderError::ParseError(
                "inspect JSON must be an object or array".to_string(),
            ));
        }
    };

    let state = info.get("State").and_then(serde_json::Value::as_object);

    let status = state
        .and_then(|s| s.get("Status"))
        .and_then(serde_json::Value::as_str)
        .map(ContainerStatus::from)
        .unwrap_or(ContainerStatus::Unknown);

    let running = state
        .and_then(|s| s.get("Running"))
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(status == ContainerStatus::Running);

    let started_at = state
        .and_then(|s| s.get("StartedAt"))
        .and_then(serde_json::Value::as_str)
        .and_then(parse_runtime_timestamp);

    let exit_code = state
        .and_then(|s| s.get("ExitCode"))
        .and_then(serde_json::Value::as_i64);

    let name = info
        .get("Name")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("")
        .trim_start_matches('/')
        .to_string();

    let full_id = info
        .get("Id")
        .and_then(serde_json::Value::as_str)
        .map(ContainerId::new)
        .unwrap_or_else(|| id.clone());

    Ok(ContainerDetails {
        id: full_id,
        name,
        status,
        running,
        started_at,
        exit_code,
    })
}

/// Parse an RFC 3339 runtime timestamp. The zero time (`0001-01-01T00:00:00Z`)
/// means "never started" and yields `None`.
fn parse_runtime_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim()).ok()?;
    let utc = parsed.with_timezone(&Utc);
    if utc.year() <= 1 {
        None
    } else {
        Some(utc)
    }
}

/// Parse the first JSON object of `stats --no-stream --format {{json .}}`.
/// All three fields must be present; partial data is an error.
fn parse_stats_output(output: &str) -> Result<ContainerStats> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| ProviderError::ParseError("stats output was empty".to_string()))?;

    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| ProviderError::ParseError(format!("stats output was not valid JSON: {}", e)))?;

    let field = |key: &str| -> Result<String> {
        value
            .get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProviderError::ParseError(format!("stats output missing {}", key)))
    };

    Ok(ContainerStats {
        cpu_percent: field("CPUPerc")?,
        memory_usage: field("MemUsage")?,
        memory_percent: field("MemPerc")?,
    })
}
