//! QR-code login: a desktop client polls on a correlation id until a
//! logged-in phone grants it.
//!
//! State lives in the fast cache so any instance can answer a poll; the
//! waiter registry only shortens the wait on the instance that holds it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

use beacon_db::cache::{CacheError, FastCache};
use beacon_types::api::{QrLoginState, QrStatus};

const KEY_PREFIX: &str = "qrcode:";
pub const STATE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("login code expired")]
    Expired,

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("corrupt login state: {0}")]
    Corrupt(#[from] serde_json::Error),
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<QrLoginState>,
}

pub struct QrLogin {
    cache: Arc<dyn FastCache>,
    waiters: Mutex<HashMap<String, Waiter>>,
    next_id: AtomicU64,
}

impl QrLogin {
    pub fn new(cache: Arc<dyn FastCache>) -> Self {
        Self {
            cache,
            waiters: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn key(uuid: &str) -> String {
        format!("{}{}", KEY_PREFIX, uuid)
    }

    /// Creates a new correlation id in the `waitScan` state.
    pub async fn create(&self) -> Result<String, QrError> {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        self.store(
            &uuid,
            &QrLoginState {
                status: QrStatus::WaitScan,
                uid: None,
            },
        )
        .await?;
        Ok(uuid)
    }

    async fn store(&self, uuid: &str, state: &QrLoginState) -> Result<(), QrError> {
        let raw = serde_json::to_string(state)?;
        self.cache.set(&Self::key(uuid), &raw, Some(STATE_TTL)).await?;
        Ok(())
    }

    /// Current state, `None` once the id has expired.
    pub async fn state(&self, uuid: &str) -> Result<Option<QrLoginState>, QrError> {
        match self.cache.get(&Self::key(uuid)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Waits up to `timeout` for a grant. Returns immediately when the id is
    /// unknown or already past `waitScan`.
    pub async fn wait(&self, uuid: &str, timeout: Duration) -> Result<QrLoginState, QrError> {
        let Some(current) = self.state(uuid).await? else {
            return Ok(expired());
        };
        if current.status != QrStatus::WaitScan {
            return Ok(current);
        }

        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.waiters.lock().await.insert(uuid.to_string(), Waiter { id, tx });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(delivered)) => Ok(delivered),
            Ok(Err(_)) | Err(_) => {
                self.remove_waiter(uuid, id).await;
                Ok(self.state(uuid).await?.unwrap_or_else(expired))
            }
        }
    }

    async fn remove_waiter(&self, uuid: &str, id: u64) {
        let mut waiters = self.waiters.lock().await;
        if waiters.get(uuid).is_some_and(|w| w.id == id) {
            waiters.remove(uuid);
        }
    }

    /// Marks the id as authorized by `uid` and wakes its waiter.
    pub async fn grant(&self, uuid: &str, uid: &str) -> Result<(), QrError> {
        if self.state(uuid).await?.is_none() {
            return Err(QrError::Expired);
        }
        let state = QrLoginState {
            status: QrStatus::Authed,
            uid: Some(uid.to_string()),
        };
        self.store(uuid, &state).await?;

        if let Some(waiter) = self.waiters.lock().await.remove(uuid) {
            if waiter.tx.send(state).is_err() {
                warn!(uuid, "QR login waiter went away before delivery");
            }
        } else {
            debug!(uuid, "No local QR login waiter");
        }
        Ok(())
    }

    #[cfg(test)]
    async fn waiter_count(&self) -> usize {
        self.waiters.lock().await.len()
    }
}

fn expired() -> QrLoginState {
    QrLoginState {
        status: QrStatus::Expired,
        uid: None,
    }
}
