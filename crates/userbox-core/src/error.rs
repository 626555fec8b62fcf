//! Error types for userbox-core

use crate::ProvisionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] userbox_config::ConfigError),

    #[error("Runtime error: {0}")]
    Provider(#[from] userbox_provider::ProviderError),

    /// Malformed or out-of-range identity; rejected before any side effect
    #[error("{0}")]
    Validation(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Failed to create container {container}: {source}")]
    Provision {
        container: String,
        source: ProvisionError,
    },

    /// A mutation reported success but the runtime disagrees
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    #[error("Failed to destroy container {container}: {}", teardown_detail(.runtime, .volume))]
    TeardownFailed {
        container: String,
        runtime: Option<String>,
        volume: Option<String>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Setup failed: {0}")]
    Setup(String),
}

impl CoreError {
    /// Diagnostic output worth showing to an operator, if any
    pub fn details(&self) -> Option<String> {
        match self {
            Self::Provision { source, .. } => source.diagnostics().map(str::to_string),
            Self::TeardownFailed {
                runtime, volume, ..
            } => Some(teardown_detail(runtime, volume)),
            Self::InconsistentState(_) => {
                Some("Check the container runtime logs for more information".to_string())
            }
            _ => None,
        }
    }
}

fn teardown_detail(runtime: &Option<String>, volume: &Option<String>) -> String {
    match (runtime, volume) {
        (Some(r), Some(v)) => format!("runtime teardown failed: {}; volume removal failed: {}", r, v),
        (Some(r), None) => format!("runtime teardown failed: {}", r),
        (None, Some(v)) => format!("volume removal failed: {}", v),
        (None, None) => "unknown teardown failure".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_message_names_failed_steps() {
        let err = CoreError::TeardownFailed {
            container: "dify_1-api-1".to_string(),
            runtime: Some("compose down failed".to_string()),
            volume: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("dify_1-api-1"));
        assert!(msg.contains("runtime teardown failed: compose down failed"));
        assert!(!msg.contains("volume"));

        let err = CoreError::TeardownFailed {
            container: "dify_1-api-1".to_string(),
            runtime: Some("a".to_string()),
            volume: Some("b".to_string()),
        };
        assert_eq!(
            err.details().as_deref(),
            Some("runtime teardown failed: a; volume removal failed: b")
        );
    }

    #[test]
    fn test_provision_details_carry_diagnostics() {
        let err = CoreError::Provision {
            container: "dify_2-api-1".to_string(),
            source: ProvisionError::Failed {
                status: "exit status: 1".to_string(),
                diagnostics: "port already allocated".to_string(),
            },
        };
        assert_eq!(err.details().as_deref(), Some("port already allocated"));
    }
}
