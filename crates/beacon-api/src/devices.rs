use axum::{Extension, Json, extract::State};
use tracing::info;

use beacon_push::target::PushTarget;
use beacon_types::api::{BadgeRequest, Claims, DeviceTokenRequest, StatusResponse};

use crate::error::ApiError;
use crate::state::AppState;

/// `POST /v1/user/device_token`: replaces the caller's push target.
pub async fn register_device_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeviceTokenRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let device_token = req.device_token.trim();
    let device_type = req.device_type.trim();
    let bundle_id = req.bundle_id.trim();
    if device_token.is_empty() {
        return Err(ApiError::bad_request("device_token must not be empty"));
    }
    if device_type.is_empty() {
        return Err(ApiError::bad_request("device_type must not be empty"));
    }
    if bundle_id.is_empty() {
        return Err(ApiError::bad_request("bundle_id must not be empty"));
    }

    state
        .targets
        .register(
            &claims.sub,
            &PushTarget {
                device_type: device_type.to_string(),
                device_token: device_token.to_string(),
                bundle_id: bundle_id.to_string(),
            },
        )
        .await?;
    info!(uid = %claims.sub, device_type, bundle_id, "Push target registered");
    Ok(Json(StatusResponse::ok()))
}

/// `DELETE /v1/user/device_token`
pub async fn unregister_device_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.targets.unregister(&claims.sub).await?;
    Ok(Json(StatusResponse::ok()))
}

/// `PUT /v1/user/device_badge`: the client reports its unread count.
pub async fn set_device_badge(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BadgeRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.targets.set_badge(&claims.sub, req.badge).await?;
    Ok(Json(StatusResponse::ok()))
}
