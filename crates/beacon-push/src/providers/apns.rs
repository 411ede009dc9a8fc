use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Pusher, base, http_client};
use crate::PushError;
use crate::payload::{Payload, PayloadKind};

pub const PRODUCTION_URL: &str = "https://api.push.apple.com";
pub const SANDBOX_URL: &str = "https://api.sandbox.push.apple.com";

/// Apple rejects provider tokens older than an hour.
const TOKEN_LIFETIME: Duration = Duration::from_secs(50 * 60);

#[derive(Debug, Clone)]
pub struct ApnsConfig {
    /// Contents of the `.p8` signing key.
    pub key_pem: String,
    pub key_id: String,
    pub team_id: String,
    /// App bundle id, sent as `apns-topic`.
    pub topic: String,
    pub base_url: String,
}

#[derive(Serialize)]
struct ProviderClaims<'a> {
    iss: &'a str,
    iat: i64,
}

#[derive(Deserialize)]
struct ApnsError {
    #[serde(default)]
    reason: String,
}

pub struct ApnsPusher {
    config: ApnsConfig,
    key: EncodingKey,
    client: reqwest::Client,
    token: Mutex<Option<(String, Instant)>>,
}

impl ApnsPusher {
    pub fn new(config: ApnsConfig) -> Result<Self, PushError> {
        let key = EncodingKey::from_ec_pem(config.key_pem.as_bytes())?;
        Ok(Self {
            config,
            key,
            client: http_client()?,
            token: Mutex::new(None),
        })
    }

    fn provider_token(&self) -> Result<String, PushError> {
        let mut slot = self
            .token
            .lock()
            .map_err(|_| PushError::Config("apns token lock poisoned".into()))?;
        if let Some((token, issued)) = slot.as_ref() {
            if issued.elapsed() < TOKEN_LIFETIME {
                return Ok(token.clone());
            }
        }

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.config.key_id.clone());
        let claims = ProviderClaims {
            iss: &self.config.team_id,
            iat: chrono::Utc::now().timestamp(),
        };
        let token = encode(&header, &claims, &self.key)?;
        *slot = Some((token.clone(), Instant::now()));
        Ok(token)
    }
}

/// APNs JSON body and the push type header that goes with it.
pub fn apns_body(payload: &Payload) -> (serde_json::Value, &'static str) {
    match &payload.info.kind {
        PayloadKind::RtcCall {
            call_type,
            operation,
            from_uid,
        } => (
            json!({
                "aps": {
                    "content-available": 1,
                    "alert": "",
                    "badge": payload.badge(),
                    "sound": "default",
                },
                "content": payload.content(),
                "call_type": call_type.code(),
                "operation": operation.as_str(),
                "from_uid": from_uid,
            }),
            "background",
        ),
        PayloadKind::Base => (
            json!({
                "aps": {
                    "alert": {
                        "title": payload.title(),
                        "body": payload.content(),
                    },
                    "badge": payload.badge(),
                    "sound": "default",
                }
            }),
            "alert",
        ),
    }
}

#[async_trait]
impl Pusher for ApnsPusher {
    fn name(&self) -> &'static str {
        "apns"
    }

    async fn push(&self, device_token: &str, payload: &Payload) -> Result<(), PushError> {
        let (body, push_type) = apns_body(payload);
        let priority = if push_type == "background" { "5" } else { "10" };
        let token = self.provider_token()?;

        let resp = self
            .client
            .post(format!("{}/3/device/{}", base(&self.config.base_url), device_token))
            .bearer_auth(token)
            .header("apns-topic", &self.config.topic)
            .header("apns-push-type", push_type)
            .header("apns-priority", priority)
            .json(&body)
            .send()
            .await?;

        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status();
        let reason = resp
            .json::<ApnsError>()
            .await
            .map(|e| e.reason)
            .unwrap_or_else(|_| status.to_string());
        Err(PushError::Rejected {
            provider: "apns",
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{CallType, PayloadInfo, RtcOperation};
    use crate::providers::mock::{Captured, record, serve};
    use axum::Router;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::routing::post;

    const KEY: &str = include_str!("../../testdata/apns_test_key.p8");

    fn payload(kind: PayloadKind) -> Payload {
        Payload {
            info: PayloadInfo {
                title: "Alice".into(),
                content: "hello".into(),
                badge: 3,
                kind,
            },
            notify_id: "7".into(),
        }
    }

    async fn pusher(status: StatusCode) -> (ApnsPusher, Captured) {
        let captured = Captured::default();
        let app = Router::new()
            .route(
                "/3/device/{token}",
                post(
                    move |State(c): State<Captured>, uri: Uri, headers: HeaderMap, body: String| async move {
                        record(&c, &uri, &headers, body);
                        if status.is_success() {
                            (status, String::new())
                        } else {
                            (status, r#"{"reason":"BadDeviceToken"}"#.to_string())
                        }
                    },
                ),
            )
            .with_state(captured.clone());
        let url = serve(app).await;
        let p = ApnsPusher::new(ApnsConfig {
            key_pem: KEY.into(),
            key_id: "KEY123".into(),
            team_id: "TEAM42".into(),
            topic: "com.example.chat".into(),
            base_url: url,
        })
        .unwrap();
        (p, captured)
    }

    #[test]
    fn rtc_body_is_background() {
        let (body, kind) = apns_body(&payload(PayloadKind::RtcCall {
            call_type: CallType::Video,
            operation: RtcOperation::Invite,
            from_uid: "alice".into(),
        }));
        assert_eq!(kind, "background");
        assert_eq!(body["aps"]["content-available"], 1);
        assert_eq!(body["call_type"], 1);
        assert_eq!(body["from_uid"], "alice");
    }

    #[tokio::test]
    async fn sends_alert_with_token_auth() {
        let (p, captured) = pusher(StatusCode::OK).await;
        p.push("devtok", &payload(PayloadKind::Base)).await.unwrap();

        let reqs = captured.lock().unwrap();
        let (path, headers, body) = &reqs[0];
        assert_eq!(path, "/3/device/devtok");
        assert_eq!(headers["apns-topic"], "com.example.chat");
        assert_eq!(headers["apns-push-type"], "alert");
        assert!(headers["authorization"].to_str().unwrap().starts_with("Bearer "));

        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["aps"]["alert"]["title"], "Alice");
        assert_eq!(body["aps"]["badge"], 3);
    }

    #[tokio::test]
    async fn provider_token_is_reused() {
        let (p, _) = pusher(StatusCode::OK).await;
        assert_eq!(p.provider_token().unwrap(), p.provider_token().unwrap());
    }

    #[tokio::test]
    async fn rejection_carries_reason() {
        let (p, _) = pusher(StatusCode::BAD_REQUEST).await;
        let err = p.push("devtok", &payload(PayloadKind::Base)).await.unwrap_err();
        match err {
            PushError::Rejected { provider, reason } => {
                assert_eq!(provider, "apns");
                assert_eq!(reason, "BadDeviceToken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
