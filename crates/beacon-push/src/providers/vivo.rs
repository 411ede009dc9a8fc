use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::Deserialize;
use serde_json::json;

use beacon_db::cache::FastCache;

use super::{Pusher, base, cached_token, http_client};
use crate::PushError;
use crate::payload::Payload;

pub const DEFAULT_BASE_URL: &str = "https://api-push.vivo.com.cn";
const TOKEN_CACHE_KEY: &str = "vivo_auth_token";
const TOKEN_TTL: Duration = Duration::from_secs(20 * 3600);

#[derive(Debug, Clone)]
pub struct VivoConfig {
    pub app_id: String,
    pub app_key: String,
    pub app_secret: String,
    pub package_name: String,
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VivoResponse {
    result: i64,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    auth_token: String,
}

pub fn sign(app_id: &str, app_key: &str, timestamp_ms: i64, app_secret: &str) -> String {
    hex::encode(Md5::digest(
        format!("{}{}{}{}", app_id, app_key, timestamp_ms, app_secret).as_bytes(),
    ))
}

pub struct VivoPusher {
    config: VivoConfig,
    cache: Arc<dyn FastCache>,
    client: reqwest::Client,
}

impl VivoPusher {
    pub fn new(config: VivoConfig, cache: Arc<dyn FastCache>) -> Result<Self, PushError> {
        Ok(Self {
            config,
            cache,
            client: http_client()?,
        })
    }

    async fn fetch_auth_token(&self) -> Result<(String, Duration), PushError> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let c = &self.config;
        let resp = self
            .client
            .post(format!("{}/message/auth", base(&c.base_url)))
            .json(&json!({
                "appId": c.app_id,
                "appKey": c.app_key,
                "sign": sign(&c.app_id, &c.app_key, timestamp, &c.app_secret),
                "timestamp": timestamp.to_string(),
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PushError::Auth {
                provider: "vivo",
                reason: resp.status().to_string(),
            });
        }

        let body: VivoResponse = resp.json().await?;
        if body.result != 0 || body.auth_token.is_empty() {
            return Err(PushError::Auth {
                provider: "vivo",
                reason: body.desc,
            });
        }
        Ok((body.auth_token, TOKEN_TTL))
    }
}

#[async_trait]
impl Pusher for VivoPusher {
    fn name(&self) -> &'static str {
        "vivo"
    }

    async fn push(&self, device_token: &str, payload: &Payload) -> Result<(), PushError> {
        let auth_token = cached_token(self.cache.as_ref(), TOKEN_CACHE_KEY, || self.fetch_auth_token()).await?;

        let resp = self
            .client
            .post(format!("{}/message/send", base(&self.config.base_url)))
            .header("authToken", auth_token)
            .json(&json!({
                "regId": device_token,
                "notifyType": "4",
                "title": payload.title(),
                "content": payload.content(),
                "skipType": "1",
                "classification": "1",
                "pushMode": "1",
                "requestId": uuid::Uuid::new_v4().to_string(),
            }))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(PushError::Rejected {
                provider: "vivo",
                reason: text,
            });
        }
        let body: VivoResponse = serde_json::from_str(&text).map_err(|e| PushError::Rejected {
            provider: "vivo",
            reason: format!("unreadable response: {}", e),
        })?;
        if body.result != 0 {
            return Err(PushError::Rejected {
                provider: "vivo",
                reason: body.desc,
            });
        }
        Ok(())
    }
}
