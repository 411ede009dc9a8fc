use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{Pusher, base, http_client};
use crate::PushError;
use crate::payload::Payload;

pub const DEFAULT_BASE_URL: &str = "https://api.xmpush.xiaomi.com";

#[derive(Debug, Clone)]
pub struct MiConfig {
    pub app_secret: String,
    pub package_name: String,
    pub channel_id: String,
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
struct MiResponse {
    #[serde(default)]
    result: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    description: String,
}

pub struct MiPusher {
    config: MiConfig,
    client: reqwest::Client,
}

impl MiPusher {
    pub fn new(config: MiConfig) -> Result<Self, PushError> {
        Ok(Self {
            config,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl Pusher for MiPusher {
    fn name(&self) -> &'static str {
        "mi"
    }

    async fn push(&self, device_token: &str, payload: &Payload) -> Result<(), PushError> {
        let sound_uri = format!("android.resource://{}/raw/newmsg", self.config.package_name);
        let badge = payload.badge().to_string();
        let form = [
            ("registration_id", device_token),
            ("payload", payload.content()),
            ("restricted_package_name", self.config.package_name.as_str()),
            ("pass_through", "0"),
            ("notify_type", "-1"),
            ("title", payload.title()),
            ("notify_id", payload.notify_id.as_str()),
            ("description", payload.content()),
            ("extra.sound_uri", sound_uri.as_str()),
            ("extra.badge", badge.as_str()),
            ("extra.notify_effect", "1"),
            ("extra.channel_id", self.config.channel_id.as_str()),
        ];

        let resp: MiResponse = self
            .client
            .post(format!("{}/v4/message/regid", base(&self.config.base_url)))
            .header("Authorization", format!("key={}", self.config.app_secret))
            .form(&form)
            .send()
            .await?
            .json()
            .await?;
        debug!(?resp, "MI push response");

        if resp.result == "ok" {
            return Ok(());
        }
        Err(PushError::Rejected {
            provider: "mi",
            reason: resp.reason.unwrap_or(resp.description),
        })
    }
}
