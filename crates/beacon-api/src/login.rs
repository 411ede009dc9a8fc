use std::time::Duration;

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;
use tracing::info;

use beacon_types::api::{Claims, LoginUuidResponse, QrLoginState, StatusResponse};

use crate::error::ApiError;
use crate::state::AppState;

const POLL_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct UuidQuery {
    #[serde(default)]
    pub uuid: String,
}

/// `GET /v1/user/loginuuid`
pub async fn login_uuid(State(state): State<AppState>) -> Result<Json<LoginUuidResponse>, ApiError> {
    let uuid = state.qr.create().await?;
    Ok(Json(LoginUuidResponse {
        qrcode: format!("login://{}", uuid),
        uuid,
    }))
}

/// `GET /v1/user/loginstatus?uuid=`: long poll, answers within `POLL_WAIT`.
pub async fn login_status(
    State(state): State<AppState>,
    Query(query): Query<UuidQuery>,
) -> Result<Json<QrLoginState>, ApiError> {
    if query.uuid.is_empty() {
        return Err(ApiError::bad_request("uuid must not be empty"));
    }
    let login = state.qr.wait(&query.uuid, POLL_WAIT).await?;
    Ok(Json(login))
}

/// `POST /v1/user/grant_login?uuid=`: the scanning device authorizes the login.
pub async fn grant_login(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<UuidQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    if query.uuid.is_empty() {
        return Err(ApiError::bad_request("uuid must not be empty"));
    }
    state.qr.grant(&query.uuid, &claims.sub).await?;
    info!(uid = %claims.sub, "QR login granted");
    Ok(Json(StatusResponse::ok()))
}
