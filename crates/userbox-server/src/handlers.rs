//! Control API request handlers

use crate::api::AppState;
use crate::error::{ApiError, ErrorResponse, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::any::Any;
use userbox_core::{ContainerList, CreateOutcome, Credential, DestroyOutcome, HealthReport};

/// Body of `POST /create`
#[derive(Deserialize)]
pub struct CreateRequest {
    pub user_id: Option<i64>,
    pub password: Option<String>,
    /// Caller's session reference; only logged
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct CreateResponse {
    #[serde(flatten)]
    pub outcome: CreateOutcome,
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
    pub container_id: String,
}

/// `GET /`
pub async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "userbox container manager",
        "version": env!("CARGO_PKG_VERSION"),
        "architecture": "One container per user session",
        "endpoints": {
            "POST /create": "Create a user's container, or report it as already running",
            "POST /destroy/{container_id}": "Destroy a container and its data",
            "GET /health/{container_id}": "Health check for a container",
            "GET /list": "List all managed containers",
            "POST /restart/{container_id}": "Restart a container",
        }
    }))
}

/// `POST /create`
pub async fn create_container(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateResponse>)> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let max_users = state.manager.naming().max_users();
    let user_id = request.user_id.ok_or_else(|| {
        ApiError::BadRequest(format!("Invalid user_id. Must be between 1 and {}", max_users))
    })?;
    let password = request
        .password
        .ok_or_else(|| ApiError::BadRequest("Missing password".to_string()))?;

    tracing::info!(
        user_id,
        session_id = request.session_id.as_deref().unwrap_or(""),
        "Create requested"
    );

    let outcome = state
        .manager
        .create(user_id, &Credential::new(password))
        .await?;

    let status = if outcome.created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let message = outcome.message();
    Ok((status, Json(CreateResponse { outcome, message })))
}

/// `POST /destroy/{container_id}`
pub async fn destroy_container(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
) -> Result<Response> {
    tracing::info!(container_id = %container_id, "Destroy requested");

    let response = match state.manager.destroy(&container_id).await? {
        DestroyOutcome::Destroyed(name) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Container destroyed successfully",
                container_id: name.to_string(),
            }),
        ),
        DestroyOutcome::NotFound(name) => (
            StatusCode::NOT_FOUND,
            Json(MessageResponse {
                message: "Container not found",
                container_id: name.to_string(),
            }),
        ),
    };
    Ok(response.into_response())
}

/// `POST /restart/{container_id}`
pub async fn restart_container(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
) -> Result<Json<MessageResponse>> {
    tracing::info!(container_id = %container_id, "Restart requested");

    let name = state.manager.restart(&container_id).await?;
    Ok(Json(MessageResponse {
        message: "Container restarted successfully",
        container_id: name.to_string(),
    }))
}

/// `GET /health/{container_id}`
pub async fn container_health(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
) -> Result<Json<HealthReport>> {
    Ok(Json(state.manager.health(&container_id).await?))
}

/// `GET /list`
pub async fn list_containers(State(state): State<AppState>) -> Result<Json<ContainerList>> {
    Ok(Json(state.manager.list().await?))
}

/// Turns a handler panic into a 500 JSON response
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!("Handler panicked: {}", detail);

    let body = ErrorResponse::new(format!("Internal server error: {}", detail));
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
