use axum::{
    Json,
    extract::{Query, State},
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

use beacon_types::events::EVENT_MSG_NOTIFY;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    #[serde(default)]
    pub event: String,
}

/// `POST /v1/webhook?event=<kind>` and its `/v2` twin.
pub async fn webhook(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let result = state.ingress.handle(&query.event, &body).await?;
    Ok(Json(result))
}

/// `POST /v1/webhook/message/notify`: a `msg.notify` batch without the query string.
pub async fn message_notify(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let result = state.ingress.handle(EVENT_MSG_NOTIFY, &body).await?;
    Ok(Json(result))
}
