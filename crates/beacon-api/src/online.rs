use std::time::Duration;

use axum::{
    Json,
    extract::{Path, State},
};

use beacon_types::api::{DeviceOnlineResponse, OnlineCountResponse, OnlineStatusResp};
use beacon_types::models::DeviceFlag;

use crate::error::ApiError;
use crate::state::AppState;

/// Users offline for longer than this are left out of batch lookups.
const RECENT_OFFLINE: Duration = Duration::from_secs(24 * 60 * 60);

/// `POST /v1/users/online`
pub async fn users_online(
    State(state): State<AppState>,
    Json(uids): Json<Vec<String>>,
) -> Result<Json<Vec<OnlineStatusResp>>, ApiError> {
    if uids.is_empty() {
        return Ok(Json(vec![]));
    }
    let statuses = state.presence.last_statuses(uids, Some(RECENT_OFFLINE)).await?;
    Ok(Json(statuses))
}

/// `GET /v1/users/{uid}/devices/{flag}/online`
pub async fn device_online(
    State(state): State<AppState>,
    Path((uid, flag)): Path<(String, u8)>,
) -> Result<Json<DeviceOnlineResponse>, ApiError> {
    let online = state.presence.device_online(&uid, DeviceFlag(flag)).await?;
    Ok(Json(DeviceOnlineResponse {
        online: i32::from(online),
    }))
}

/// `GET /v1/users/online/count`
pub async fn online_count(State(state): State<AppState>) -> Result<Json<OnlineCountResponse>, ApiError> {
    let count = state.presence.online_count().await?;
    Ok(Json(OnlineCountResponse { count }))
}
