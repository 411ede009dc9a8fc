use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use beacon_db::cache::FastCache;

use super::{Pusher, base, cached_token, http_client};
use crate::PushError;
use crate::payload::Payload;

pub const DEFAULT_BASE_URL: &str = "https://fcm.googleapis.com";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const TOKEN_CACHE_KEY: &str = "fcm_access_token";
const SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// The fields of a Google service-account key file this adapter uses.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub account: ServiceAccount,
    pub package_name: String,
    /// Android notification channel, when the app defines one.
    pub channel_id: Option<String>,
    pub base_url: String,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

pub struct FcmPusher {
    config: FcmConfig,
    key: EncodingKey,
    cache: Arc<dyn FastCache>,
    client: reqwest::Client,
}

impl FcmPusher {
    pub fn new(config: FcmConfig, cache: Arc<dyn FastCache>) -> Result<Self, PushError> {
        let key = EncodingKey::from_rsa_pem(config.account.private_key.as_bytes())?;
        Ok(Self {
            config,
            key,
            cache,
            client: http_client()?,
        })
    }

    async fn access_token(&self) -> Result<String, PushError> {
        cached_token(self.cache.as_ref(), TOKEN_CACHE_KEY, || self.fetch_access_token()).await
    }

    async fn fetch_access_token(&self) -> Result<(String, Duration), PushError> {
        let account = &self.config.account;
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &account.client_email,
            scope: SCOPE,
            aud: &account.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.key)?;

        let resp = self
            .client
            .post(&account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PushError::Auth {
                provider: "fcm",
                reason: resp.text().await.unwrap_or_default(),
            });
        }
        let token: TokenResponse = resp.json().await?;
        let ttl = token.expires_in.saturating_sub(60).max(1);
        Ok((token.access_token, Duration::from_secs(ttl)))
    }
}

pub fn fcm_body(device_token: &str, payload: &Payload, channel_id: Option<&str>) -> serde_json::Value {
    let mut android_notification = json!({ "notification_count": payload.badge() });
    if let Some(channel) = channel_id {
        android_notification["channel_id"] = json!(channel);
    }
    let priority = if payload.is_ringing() { "HIGH" } else { "NORMAL" };

    json!({
        "message": {
            "token": device_token,
            "notification": {
                "title": payload.title(),
                "body": payload.content(),
            },
            "android": {
                "priority": priority,
                "notification": android_notification,
            },
        }
    })
}

#[async_trait]
impl Pusher for FcmPusher {
    fn name(&self) -> &'static str {
        "fcm"
    }

    async fn push(&self, device_token: &str, payload: &Payload) -> Result<(), PushError> {
        let token = self.access_token().await?;
        let body = fcm_body(device_token, payload, self.config.channel_id.as_deref());

        let resp = self
            .client
            .post(format!(
                "{}/v1/projects/{}/messages:send",
                base(&self.config.base_url),
                self.config.account.project_id
            ))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        if resp.status().is_success() {
            return Ok(());
        }
        Err(PushError::Rejected {
            provider: "fcm",
            reason: resp.text().await.unwrap_or_default(),
        })
    }
}
