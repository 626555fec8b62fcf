//! Provisioner adapter
//!
//! Runs the external provisioning script that builds and starts a user's
//! containers, and removes a user's persistent data directory. Success of
//! `provision` only means the script exited cleanly; the manager confirms the
//! container is actually running by asking the runtime afterwards.

use crate::identity::UserId;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use userbox_config::{ConfigError, ProvisionerConfig};

/// Keep at most this much script output in error diagnostics
const MAX_DIAGNOSTIC_CHARS: usize = 4000;

/// Password handed to the provisioning script. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("provisioning script failed ({status})")]
    Failed { status: String, diagnostics: String },

    #[error("failed to launch provisioning script: {0}")]
    Launch(String),

    #[error("provisioning script timed out after {0}s")]
    Timeout(u64),
}

impl ProvisionError {
    /// Captured script output, if the script ran
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Failed { diagnostics, .. } if !diagnostics.is_empty() => Some(diagnostics),
            _ => None,
        }
    }
}

/// Creates and cleans up the external side of a user's instance
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Build and start the containers for `user`
    async fn provision(&self, user: UserId, credential: &Credential) -> Result<(), ProvisionError>;

    /// Remove the user's persistent data directory; a missing directory is success
    async fn teardown_volume(&self, user: UserId) -> std::io::Result<()>;
}

/// Provisioner backed by a shell script: `<shell> <script> <user_id> <password>`
pub struct ScriptProvisioner {
    shell: String,
    script: PathBuf,
    data_dir: PathBuf,
    timeout: Duration,
}

impl ScriptProvisioner {
    pub fn new(
        shell: impl Into<String>,
        script: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            shell: shell.into(),
            script: script.into(),
            data_dir: data_dir.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ProvisionerConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.shell.clone(),
            config.script_path()?,
            config.data_dir_path()?,
            config.timeout(),
        ))
    }

    /// Data directory of a user; only ever derived from a validated id
    pub fn volume_path(&self, user: UserId) -> PathBuf {
        self.data_dir.join(format!("user_{}", user))
    }
}

#[async_trait]
impl Provisioner for ScriptProvisioner {
    async fn provision(&self, user: UserId, credential: &Credential) -> Result<(), ProvisionError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(&self.script)
            .arg(user.to_string())
            .arg(credential.expose())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(user = %user, script = %self.script.display(), "Running provisioning script");

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ProvisionError::Launch(e.to_string())),
            Err(_) => return Err(ProvisionError::Timeout(self.timeout.as_secs())),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stdout.lines() {
            tracing::debug!(user = %user, "provision: {}", line);
        }

        if !output.status.success() {
            let diagnostics = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            return Err(ProvisionError::Failed {
                status: output.status.to_string(),
                diagnostics: tail_chars(diagnostics, MAX_DIAGNOSTIC_CHARS),
            });
        }

        tracing::info!(user = %user, "Provisioning script finished");
        Ok(())
    }

    async fn teardown_volume(&self, user: UserId) -> std::io::Result<()> {
        let path = self.volume_path(user);
        tracing::info!(user = %user, path = %path.display(), "Removing data directory");
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Data directory {} already absent", path.display());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Last `max` characters of `s`; the end of a script's output is where the error usually is
fn tail_chars(s: &str, max: usize) -> String {
    let count = s.chars().count();
    if count <= max {
        s.to_string()
    } else {
        s.chars().skip(count - max).collect()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::identity::NamingScheme;
    use std::fs;
    use tempfile::TempDir;

    fn user(n: i64) -> UserId {
        NamingScheme::default().user_id(n).unwrap()
    }

    /// Write a script into a temp dir and build a provisioner running it with `sh`
    fn provisioner_with_script(body: &str, timeout: Duration) -> (ScriptProvisioner, TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("start.sh");
        fs::write(&script, body).unwrap();
        let data = tmp.path().join("data");
        fs::create_dir_all(&data).unwrap();
        (ScriptProvisioner::new("sh", script, data, timeout), tmp)
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("hunter2");
        let shown = format!("{:?}", credential);
        assert!(!shown.contains("hunter2"));
        assert_eq!(credential.expose(), "hunter2");
    }

    #[tokio::test]
    async fn test_provision_success_passes_arguments_literally() {
        let (provisioner, tmp) = provisioner_with_script(
            "printf '%s|%s' \"$1\" \"$2\" > \"$(dirname \"$0\")/args.txt\"\n",
            Duration::from_secs(10),
        );
        let credential = Credential::new("p; touch pwned");

        provisioner.provision(user(7), &credential).await.unwrap();

        let args = fs::read_to_string(tmp.path().join("args.txt")).unwrap();
        assert_eq!(args, "7|p; touch pwned");
        assert!(!tmp.path().join("pwned").exists());
    }

    #[tokio::test]
    async fn test_provision_failure_captures_stderr() {
        let (provisioner, _tmp) = provisioner_with_script(
            "echo starting\necho 'port 50003 already allocated' >&2\nexit 3\n",
            Duration::from_secs(10),
        );
        let err = provisioner
            .provision(user(3), &Credential::new("p"))
            .await
            .unwrap_err();
        match err {
            ProvisionError::Failed { diagnostics, .. } => {
                assert_eq!(diagnostics, "port 50003 already allocated");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_provision_failure_falls_back_to_stdout() {
        let (provisioner, _tmp) =
            provisioner_with_script("echo 'compose file missing'\nexit 1\n", Duration::from_secs(10));
        let err = provisioner
            .provision(user(1), &Credential::new("p"))
            .await
            .unwrap_err();
        assert_eq!(err.diagnostics(), Some("compose file missing"));
    }

    #[tokio::test]
    async fn test_provision_timeout() {
        let (provisioner, _tmp) =
            provisioner_with_script("sleep 5\n", Duration::from_millis(200));
        let err = provisioner
            .provision(user(1), &Credential::new("p"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_provision_missing_shell() {
        let tmp = tempfile::tempdir().unwrap();
        let provisioner = ScriptProvisioner::new(
            "userbox-no-such-shell",
            tmp.path().join("start.sh"),
            tmp.path(),
            Duration::from_secs(1),
        );
        let err = provisioner
            .provision(user(1), &Credential::new("p"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Launch(_)));
    }

    #[tokio::test]
    async fn test_teardown_volume_removes_only_user_dir() {
        let (provisioner, _tmp) = provisioner_with_script("exit 0\n", Duration::from_secs(1));
        let target = provisioner.volume_path(user(7));
        let sibling = provisioner.volume_path(user(70));
        fs::create_dir_all(target.join("db")).unwrap();
        fs::write(target.join("db").join("data.bin"), b"x").unwrap();
        fs::create_dir_all(&sibling).unwrap();

        provisioner.teardown_volume(user(7)).await.unwrap();

        assert!(!target.exists());
        assert!(sibling.exists());
    }

    #[tokio::test]
    async fn test_teardown_volume_missing_is_ok() {
        let (provisioner, _tmp) = provisioner_with_script("exit 0\n", Duration::from_secs(1));
        provisioner.teardown_volume(user(9)).await.unwrap();
    }

    #[test]
    fn test_volume_path_layout() {
        let provisioner = ScriptProvisioner::new(
            "bash",
            "/opt/start.sh",
            "/srv/dify_data",
            Duration::from_secs(1),
        );
        assert_eq!(
            provisioner.volume_path(user(12)),
            PathBuf::from("/srv/dify_data/user_12")
        );
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("héllo", 4), "éllo");
    }
}
