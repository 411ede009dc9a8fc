use axum::{Json, http::StatusCode, response::IntoResponse};

use beacon_db::cache::CacheError;
use beacon_presence::PresenceError;
use beacon_types::api::ErrorResponse;

use crate::ingress::IngressError;
use crate::qrlogin::QrError;

/// Handler error rendered as `{"msg": ..., "status": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub msg: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            msg: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorResponse {
            msg: self.msg,
            status: self.status.as_u16(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<IngressError> for ApiError {
    fn from(e: IngressError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<PresenceError> for ApiError {
    fn from(e: PresenceError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<CacheError> for ApiError {
    fn from(e: CacheError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<QrError> for ApiError {
    fn from(e: QrError) -> Self {
        Self::bad_request(e.to_string())
    }
}
