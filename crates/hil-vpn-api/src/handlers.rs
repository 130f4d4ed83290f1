use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use hil_vpn_control::LifecycleError;
use hil_vpn_proto::UniqueId;

use crate::models::*;
use crate::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (status, Json(ErrorResponse::new(error, code)))
}

fn internal_error() -> ApiError {
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal error",
        "INTERNAL_ERROR",
    )
}

/// Map a lifecycle failure onto a response. Privileged failures are logged
/// in full and reported without detail.
fn lifecycle_error(err: LifecycleError) -> ApiError {
    match err {
        LifecycleError::InvalidVlan(e) => {
            api_error(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_VLAN")
        }
        LifecycleError::NoFreePorts => api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            LifecycleError::NoFreePorts.to_string(),
            "NO_FREE_PORTS",
        ),
        LifecycleError::NotFound(id) => api_error(
            StatusCode::BAD_REQUEST,
            format!("no such vpn {}", id),
            "VPN_NOT_FOUND",
        ),
        e @ LifecycleError::Privileged { .. } => {
            error!(error = %e, "Privileged operation failed");
            internal_error()
        }
    }
}

/// Create and start a vpn
#[utoipa::path(
    post,
    path = "/vpns/new",
    request_body = CreateVpnRequest,
    responses(
        (status = 200, description = "Vpn created and started", body = CreateVpnResponse),
        (status = 400, description = "Invalid VLAN or malformed request", body = ErrorResponse),
        (status = 503, description = "No free ports", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "vpns"
)]
pub async fn create_vpn(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateVpnRequest>, JsonRejection>,
) -> Result<Json<CreateVpnResponse>, ApiError> {
    let Json(req) = body.map_err(|rejection| {
        debug!(error = %rejection, "Rejected create request body");
        api_error(
            StatusCode::BAD_REQUEST,
            rejection.body_text(),
            "INVALID_REQUEST",
        )
    })?;

    info!(vlan = req.vlan, "Create vpn requested");

    // The flow runs to completion even if the client goes away.
    let manager = state.manager.clone();
    let created = tokio::spawn(async move { manager.create_vpn(req.vlan).await })
        .await
        .map_err(|e| {
            error!(error = %e, "Create task did not complete");
            internal_error()
        })?
        .map_err(lifecycle_error)?;

    Ok(Json(CreateVpnResponse {
        key: created.key,
        id: created.id.to_string(),
        port: created.port,
    }))
}

/// Stop and delete a vpn
#[utoipa::path(
    delete,
    path = "/vpns/{id}",
    params(
        ("id" = String, Path, description = "Hex-encoded vpn identity")
    ),
    responses(
        (status = 200, description = "Vpn stopped and deleted"),
        (status = 400, description = "Malformed or unknown id", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "vpns"
)]
pub async fn delete_vpn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: UniqueId = id.parse().map_err(|e| {
        warn!(id = %id, error = %e, "Rejected malformed vpn id");
        api_error(
            StatusCode::BAD_REQUEST,
            format!("invalid vpn id: {}", e),
            "INVALID_ID",
        )
    })?;

    info!(%id, "Delete vpn requested");

    let manager = state.manager.clone();
    tokio::spawn(async move { manager.delete_vpn(id).await })
        .await
        .map_err(|e| {
            error!(error = %e, "Delete task did not complete");
            internal_error()
        })?
        .map_err(lifecycle_error)?;

    Ok(StatusCode::OK)
}

/// Health check and port pool usage
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let summary = state.manager.summary();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        used_ports: summary.used,
        free_ports: summary.free,
        retired_ports: summary.retired,
    })
}
