use serde::{Deserialize, Serialize};

use crate::models::DeviceFlag;

// -- JWT Claims --

/// Bearer token claims for the user-facing endpoints. `sub` is the uid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Webhook responses --

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: u16,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self { status: 200 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub msg: String,
    pub status: u16,
}

// -- Push registration --

#[derive(Debug, Deserialize)]
pub struct DeviceTokenRequest {
    #[serde(default)]
    pub device_token: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub bundle_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BadgeRequest {
    pub badge: i64,
}

// -- Presence --

/// Last known state of one device, as the IM core and our own queries report it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineStatusResp {
    pub uid: String,
    pub device_flag: DeviceFlag,
    #[serde(default)]
    pub last_offline: i64,
    #[serde(default)]
    pub online: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceOnlineResponse {
    pub online: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OnlineCountResponse {
    pub count: i64,
}

// -- QR login --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QrStatus {
    WaitScan,
    Authed,
    Expired,
}

/// State behind a login correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrLoginState {
    pub status: QrStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginUuidResponse {
    pub uuid: String,
    pub qrcode: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qr_state_wire_format() {
        let s = QrLoginState { status: QrStatus::WaitScan, uid: None };
        assert_eq!(serde_json::to_string(&s).unwrap(), r#"{"status":"waitScan"}"#);

        let authed: QrLoginState = serde_json::from_str(r#"{"status":"authed","uid":"u1"}"#).unwrap();
        assert_eq!(authed.status, QrStatus::Authed);
        assert_eq!(authed.uid.as_deref(), Some("u1"));
    }

    #[test]
    fn online_status_resp_from_im_core() {
        let raw = r#"[{"uid":"u1","device_flag":1,"last_offline":0,"online":1}]"#;
        let list: Vec<OnlineStatusResp> = serde_json::from_str(raw).unwrap();
        assert_eq!(list[0].device_flag, DeviceFlag::WEB);
        assert_eq!(list[0].online, 1);
    }
}
