//! Error types for the control API

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use userbox_core::CoreError;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request body
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ApiError {
    /// Returns the HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Core(CoreError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Core(CoreError::ContainerNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            container_id: None,
        }
    }
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::Core(CoreError::ContainerNotFound(name)) => ErrorResponse {
                container_id: Some(name.clone()),
                ..ErrorResponse::new("Container not found")
            },
            ApiError::Core(CoreError::TeardownFailed { container, .. }) => ErrorResponse {
                details: err_details(err),
                container_id: Some(container.clone()),
                ..ErrorResponse::new(err.to_string())
            },
            _ => ErrorResponse {
                details: err_details(err),
                ..ErrorResponse::new(err.to_string())
            },
        }
    }
}

fn err_details(err: &ApiError) -> Option<String> {
    match err {
        ApiError::Core(core) => core.details(),
        ApiError::BadRequest(_) => None,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, axum::Json(ErrorResponse::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use userbox_core::ProvisionError;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Core(CoreError::Validation("bad".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::BadRequest("bad body".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Core(CoreError::ContainerNotFound("dify_1-api-1".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Core(CoreError::InconsistentState("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_body() {
        let err = ApiError::Core(CoreError::ContainerNotFound("dify_1-api-1".into()));
        let body = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"error": "Container not found", "container_id": "dify_1-api-1"})
        );
    }

    #[test]
    fn test_provision_body_has_details() {
        let err = ApiError::Core(CoreError::Provision {
            container: "dify_1-api-1".into(),
            source: ProvisionError::Failed {
                status: "exit status: 2".into(),
                diagnostics: "no space left on device".into(),
            },
        });
        let body = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
        assert_eq!(body["details"], "no space left on device");
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to create container dify_1-api-1"));
        assert!(body.get("container_id").is_none());
    }
}
