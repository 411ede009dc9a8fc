use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use beacon_db::cache::FastCache;

use super::{Pusher, base, cached_token, http_client};
use crate::PushError;
use crate::payload::Payload;

pub const DEFAULT_BASE_URL: &str = "https://api.push.oppomobile.com";
const TOKEN_CACHE_KEY: &str = "oppo_auth_token";
const TOKEN_TTL: Duration = Duration::from_secs(20 * 3600);

#[derive(Debug, Clone)]
pub struct OppoConfig {
    pub app_key: String,
    pub master_secret: String,
    pub package_name: String,
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
struct AuthData {
    auth_token: String,
}

#[derive(Debug, Deserialize)]
struct OppoResponse<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

pub fn sign(app_key: &str, timestamp_ms: i64, master_secret: &str) -> String {
    hex::encode(Sha256::digest(format!("{}{}{}", app_key, timestamp_ms, master_secret).as_bytes()))
}

pub struct OppoPusher {
    config: OppoConfig,
    cache: Arc<dyn FastCache>,
    client: reqwest::Client,
}

impl OppoPusher {
    pub fn new(config: OppoConfig, cache: Arc<dyn FastCache>) -> Result<Self, PushError> {
        Ok(Self {
            config,
            cache,
            client: http_client()?,
        })
    }

    async fn fetch_auth_token(&self) -> Result<(String, Duration), PushError> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let sign = sign(&self.config.app_key, timestamp, &self.config.master_secret);
        let timestamp = timestamp.to_string();

        let resp: OppoResponse<AuthData> = self
            .client
            .post(format!("{}/server/v1/auth", base(&self.config.base_url)))
            .form(&[
                ("app_key", self.config.app_key.as_str()),
                ("sign", sign.as_str()),
                ("timestamp", timestamp.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;

        match resp.data {
            Some(data) if resp.code == 0 && !data.auth_token.is_empty() => Ok((data.auth_token, TOKEN_TTL)),
            _ => Err(PushError::Auth {
                provider: "oppo",
                reason: resp.message,
            }),
        }
    }
}

#[async_trait]
impl Pusher for OppoPusher {
    fn name(&self) -> &'static str {
        "oppo"
    }

    async fn push(&self, device_token: &str, payload: &Payload) -> Result<(), PushError> {
        let auth_token = cached_token(self.cache.as_ref(), TOKEN_CACHE_KEY, || self.fetch_auth_token()).await?;
        let message = json!({
            "target_type": 2,
            "target_value": device_token,
            "notification": {
                "title": payload.title(),
                "content": payload.content(),
            },
        })
        .to_string();

        let resp: OppoResponse<serde_json::Value> = self
            .client
            .post(format!(
                "{}/server/v1/message/notification/unicast",
                base(&self.config.base_url)
            ))
            .form(&[("auth_token", auth_token.as_str()), ("message", message.as_str())])
            .send()
            .await?
            .json()
            .await?;

        if resp.code == 0 {
            return Ok(());
        }
        Err(PushError::Rejected {
            provider: "oppo",
            reason: resp.message,
        })
    }
}
