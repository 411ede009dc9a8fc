//! Vendor adapters. Each turns a [`Payload`] into one provider HTTP call.

pub mod apns;
pub mod fcm;
pub mod hms;
pub mod mi;
pub mod oppo;
pub mod vivo;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use beacon_db::cache::FastCache;

use crate::PushError;
use crate::payload::Payload;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Pusher: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &'static str;

    async fn push(&self, device_token: &str, payload: &Payload) -> Result<(), PushError>;
}

pub(crate) fn http_client() -> Result<reqwest::Client, PushError> {
    Ok(reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

/// Returns the bearer token stored under `key`, fetching and storing a fresh
/// one on a miss. `fetch` yields the token and how long it stays valid.
pub(crate) async fn cached_token<F, Fut>(cache: &dyn FastCache, key: &str, fetch: F) -> Result<String, PushError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(String, Duration), PushError>>,
{
    if let Some(token) = cache.get(key).await? {
        if !token.trim().is_empty() {
            return Ok(token);
        }
    }

    let (token, ttl) = fetch().await?;
    debug!(key, ttl_secs = ttl.as_secs(), "Fetched provider token");
    cache.set(key, &token, Some(ttl)).await?;
    Ok(token)
}

/// Strips a trailing slash so paths can be appended with `format!`.
pub(crate) fn base(url: &str) -> &str {
    url.trim_end_matches('/')
}
