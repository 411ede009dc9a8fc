use std::time::Duration;

use anyhow::Context;

use beacon_push::locale::Locale;
use beacon_push::providers::{apns, fcm, hms, mi, oppo, vivo};
use beacon_push::registry::PushConfig;

/// Runtime settings, read from `BEACON_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Listener for the gRPC webhook service.
    pub grpc_addr: String,
    pub db_path: String,
    /// In-process cache when unset.
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub im_api_url: String,
    pub message_table_count: u32,
    pub name_cache_ttl: Duration,
    pub push_workers: usize,
    pub push_queue: usize,
    pub push_detail: bool,
    pub push_locale: Locale,
    pub sweep_interval_secs: u64,
    pub push: PushConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        Ok(Self {
            host: env.or("BEACON_HOST", "0.0.0.0"),
            port: env.parse("BEACON_PORT", 8090)?,
            grpc_addr: env.or("BEACON_GRPC_ADDR", "0.0.0.0:6979"),
            db_path: env.or("BEACON_DB_PATH", "beacon.db"),
            redis_url: env.opt("BEACON_REDIS_URL"),
            jwt_secret: env.or("BEACON_JWT_SECRET", "dev-secret-change-me"),
            im_api_url: env.or("BEACON_IM_API_URL", "http://127.0.0.1:5001"),
            message_table_count: env.parse("BEACON_MESSAGE_TABLE_COUNT", 5)?,
            name_cache_ttl: Duration::from_secs(env.parse("BEACON_NAME_CACHE_TTL_SECS", 7 * 24 * 60 * 60)?),
            push_workers: env.parse("BEACON_PUSH_WORKERS", 100)?,
            push_queue: env.parse("BEACON_PUSH_QUEUE", 1024)?,
            push_detail: env.parse("BEACON_PUSH_DETAIL", true)?,
            push_locale: env
                .or("BEACON_PUSH_LOCALE", "en")
                .parse()
                .map_err(|e: String| anyhow::anyhow!("BEACON_PUSH_LOCALE: {}", e))?,
            sweep_interval_secs: env.parse("BEACON_SWEEP_INTERVAL_SECS", 300)?,
            push: push_config(&env)?,
        })
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Set and non-blank.
    fn opt(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> anyhow::Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.opt(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid {}={:?}: {}", key, raw, e)),
            None => Ok(default),
        }
    }

    fn read_file(&self, key: &str) -> anyhow::Result<String> {
        let path = self
            .opt(key)
            .with_context(|| format!("{} is required", key))?;
        std::fs::read_to_string(&path).with_context(|| format!("failed to read {} ({})", key, path))
    }
}

/// A provider block is only built when its app identifier is set.
fn push_config<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> anyhow::Result<PushConfig> {
    let mut push = PushConfig::default();

    if let Some(topic) = env.opt("BEACON_APNS_TOPIC") {
        let default_url = if env.parse("BEACON_APNS_SANDBOX", false)? {
            apns::SANDBOX_URL
        } else {
            apns::PRODUCTION_URL
        };
        push.apns = Some(apns::ApnsConfig {
            key_pem: env.read_file("BEACON_APNS_KEY_PATH")?,
            key_id: env.or("BEACON_APNS_KEY_ID", ""),
            team_id: env.or("BEACON_APNS_TEAM_ID", ""),
            topic,
            base_url: env.or("BEACON_APNS_URL", default_url),
        });
    }

    if let Some(package_name) = env.opt("BEACON_FCM_PACKAGE_NAME") {
        let raw = env.read_file("BEACON_FCM_CREDENTIALS")?;
        let account: fcm::ServiceAccount =
            serde_json::from_str(&raw).context("BEACON_FCM_CREDENTIALS is not a service account file")?;
        push.fcm = Some(fcm::FcmConfig {
            account,
            package_name,
            channel_id: env.opt("BEACON_FCM_CHANNEL_ID"),
            base_url: env.or("BEACON_FCM_URL", fcm::DEFAULT_BASE_URL),
        });
    }

    if let Some(package_name) = env.opt("BEACON_HMS_PACKAGE_NAME") {
        push.hms = Some(hms::HmsConfig {
            app_id: env.or("BEACON_HMS_APP_ID", ""),
            app_secret: env.or("BEACON_HMS_APP_SECRET", ""),
            package_name,
            msg_channel_id: env.or("BEACON_HMS_MSG_CHANNEL_ID", "beacon_new_msg_notification"),
            rtc_channel_id: env.or("BEACON_HMS_RTC_CHANNEL_ID", "beacon_new_rtc_notification"),
            auth_url: env.or("BEACON_HMS_AUTH_URL", hms::DEFAULT_AUTH_URL),
            base_url: env.or("BEACON_HMS_URL", hms::DEFAULT_BASE_URL),
        });
    }

    if let Some(package_name) = env.opt("BEACON_MI_PACKAGE_NAME") {
        push.mi = Some(mi::MiConfig {
            app_secret: env.or("BEACON_MI_APP_SECRET", ""),
            package_name,
            channel_id: env.or("BEACON_MI_CHANNEL_ID", ""),
            base_url: env.or("BEACON_MI_URL", mi::DEFAULT_BASE_URL),
        });
    }

    if let Some(package_name) = env.opt("BEACON_OPPO_PACKAGE_NAME") {
        push.oppo = Some(oppo::OppoConfig {
            app_key: env.or("BEACON_OPPO_APP_KEY", ""),
            master_secret: env.or("BEACON_OPPO_MASTER_SECRET", ""),
            package_name,
            base_url: env.or("BEACON_OPPO_URL", oppo::DEFAULT_BASE_URL),
        });
    }

    if let Some(package_name) = env.opt("BEACON_VIVO_PACKAGE_NAME") {
        push.vivo = Some(vivo::VivoConfig {
            app_id: env.or("BEACON_VIVO_APP_ID", ""),
            app_key: env.or("BEACON_VIVO_APP_KEY", ""),
            app_secret: env.or("BEACON_VIVO_APP_SECRET", ""),
            package_name,
            base_url: env.or("BEACON_VIVO_URL", vivo::DEFAULT_BASE_URL),
        });
    }

    Ok(push)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.port, 8090);
        assert_eq!(c.grpc_addr, "0.0.0.0:6979");
        assert_eq!(c.message_table_count, 5);
        assert_eq!(c.push_workers, 100);
        assert_eq!(c.sweep_interval_secs, 300);
        assert_eq!(c.push_locale, Locale::En);
        assert!(c.push_detail);
        assert!(c.redis_url.is_none());
        assert!(c.push.hms.is_none() && c.push.apns.is_none());
    }

    #[test]
    fn provider_needs_its_identifier() {
        let c = config(&[("BEACON_HMS_APP_ID", "123")]).unwrap();
        assert!(c.push.hms.is_none());

        let c = config(&[
            ("BEACON_HMS_PACKAGE_NAME", "com.example.chat"),
            ("BEACON_HMS_APP_ID", "123"),
            ("BEACON_VIVO_PACKAGE_NAME", "com.example.chat"),
        ])
        .unwrap();
        let hms = c.push.hms.unwrap();
        assert_eq!(hms.app_id, "123");
        assert_eq!(hms.base_url, hms::DEFAULT_BASE_URL);
        assert!(c.push.vivo.is_some());
    }

    #[test]
    fn bad_numbers_and_locales_are_errors() {
        assert!(config(&[("BEACON_PORT", "http")]).is_err());
        assert!(config(&[("BEACON_PUSH_LOCALE", "fr")]).is_err());
        assert_eq!(config(&[("BEACON_PUSH_LOCALE", "zh")]).unwrap().push_locale, Locale::Zh);
    }

    #[test]
    fn apns_key_file_is_required() {
        let err = config(&[("BEACON_APNS_TOPIC", "com.example.chat")]).unwrap_err();
        assert!(err.to_string().contains("BEACON_APNS_KEY_PATH"));
    }
}
