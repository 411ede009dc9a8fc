use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use beacon_db::cache::FastCache;

use super::{Pusher, base, cached_token, http_client};
use crate::PushError;
use crate::payload::Payload;

pub const DEFAULT_AUTH_URL: &str = "https://oauth-login.cloud.huawei.com/oauth2/v2/token";
pub const DEFAULT_BASE_URL: &str = "https://push-api.cloud.huawei.com";
const TOKEN_CACHE_KEY: &str = "hms_accesstoken";
const SUCCESS_CODE: &str = "80000000";

#[derive(Debug, Clone)]
pub struct HmsConfig {
    pub app_id: String,
    pub app_secret: String,
    pub package_name: String,
    pub msg_channel_id: String,
    pub rtc_channel_id: String,
    pub auth_url: String,
    pub base_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    msg: String,
}

pub struct HmsPusher {
    config: HmsConfig,
    cache: Arc<dyn FastCache>,
    client: reqwest::Client,
}

impl HmsPusher {
    pub fn new(config: HmsConfig, cache: Arc<dyn FastCache>) -> Result<Self, PushError> {
        Ok(Self {
            config,
            cache,
            client: http_client()?,
        })
    }

    async fn fetch_access_token(&self) -> Result<(String, Duration), PushError> {
        let resp = self
            .client
            .post(&self.config.auth_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_secret", self.config.app_secret.as_str()),
                ("client_id", self.config.app_id.as_str()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PushError::Auth {
                provider: "hms",
                reason: resp.text().await.unwrap_or_default(),
            });
        }
        let token: TokenResponse = resp.json().await?;
        let expires_in = if token.expires_in <= 0 { 3600 } else { token.expires_in as u64 };
        Ok((token.access_token, Duration::from_secs(expires_in)))
    }

    fn body(&self, device_token: &str, payload: &Payload) -> serde_json::Value {
        let (channel_id, sound, category) = if payload.is_ringing() {
            (self.config.rtc_channel_id.as_str(), "/raw/newrtc", "VOIP")
        } else {
            (self.config.msg_channel_id.as_str(), "/raw/newmsg", "IM")
        };

        json!({
            "validate_only": false,
            "message": {
                "token": [device_token],
                "android": {
                    "category": category,
                    "notification": {
                        "visibility": "PUBLIC",
                        "title": payload.title(),
                        "body": payload.content(),
                        "sound": sound,
                        "importance": "NORMAL",
                        "default_sound": true,
                        "channel_id": channel_id,
                        "click_action": { "type": 3 },
                        "badge": {
                            "add_num": 1,
                            "class": format!("{}.MainActivity", self.config.package_name),
                        },
                    },
                },
            },
        })
    }
}

#[async_trait]
impl Pusher for HmsPusher {
    fn name(&self) -> &'static str {
        "hms"
    }

    async fn push(&self, device_token: &str, payload: &Payload) -> Result<(), PushError> {
        let token = cached_token(self.cache.as_ref(), TOKEN_CACHE_KEY, || self.fetch_access_token()).await?;

        let resp = self
            .client
            .post(format!("{}/v1/{}/messages:send", base(&self.config.base_url), self.config.app_id))
            .bearer_auth(token)
            .json(&self.body(device_token, payload))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(PushError::Rejected {
                provider: "hms",
                reason: text,
            });
        }
        debug!(body = %text, "HMS push response");

        let result: SendResponse = serde_json::from_str(&text).map_err(|e| PushError::Rejected {
            provider: "hms",
            reason: format!("unreadable response: {}", e),
        })?;
        match result.code.as_deref() {
            Some(code) if code != SUCCESS_CODE => Err(PushError::Rejected {
                provider: "hms",
                reason: result.msg,
            }),
            _ => Ok(()),
        }
    }
}
