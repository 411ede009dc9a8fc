//! Durable per-device online state.
//!
//! One row per `(uid, device_flag)`. Every write carries a microsecond
//! version and the store keeps whichever write has the highest version, so
//! webhook batches and the sweep can race without rolling each other back.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};

use beacon_db::Database;
use beacon_db::models::{PresenceRow, PresenceWrite};
use beacon_types::api::OnlineStatusResp;
use beacon_types::events::{OnlineStatus, PresenceListener};
use beacon_types::models::DeviceFlag;

use crate::PresenceError;
use crate::weights::DeviceWeights;

/// The device a user's contacts should see as current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MainDevice {
    pub flag: DeviceFlag,
    /// No device is online; `flag` is then the one that just changed.
    pub all_offline: bool,
}

pub struct PresenceTracker {
    db: Arc<Database>,
    weights: Arc<DeviceWeights>,
}

impl PresenceTracker {
    pub fn new(db: Arc<Database>, weights: Arc<DeviceWeights>) -> Self {
        Self { db, weights }
    }

    pub fn weights(&self) -> &DeviceWeights {
        &self.weights
    }

    pub async fn refresh_weights(&self) -> Result<(), PresenceError> {
        let weights = self.weights.clone();
        self.blocking(move |db| weights.refresh(db)).await
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, PresenceError>
    where
        F: FnOnce(&Database) -> Result<T, PresenceError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| PresenceError::Storage(anyhow::anyhow!("spawn_blocking join error: {}", e)))?
    }

    // -- Writes --

    /// Persists a batch of transitions in one transaction and returns how
    /// many rows were written. An offline transition while other connections
    /// of the same flag remain open is ignored.
    pub async fn apply(&self, statuses: &[OnlineStatus]) -> Result<usize, PresenceError> {
        let now = chrono::Utc::now();
        let mut writes: Vec<PresenceWrite> = statuses
            .iter()
            .filter(|s| s.online || s.online_count <= 0)
            .map(|s| PresenceWrite {
                uid: s.uid.clone(),
                device_flag: s.device_flag.0,
                online: s.online,
                at: now.timestamp(),
                version: 0,
            })
            .collect();

        let count = writes.len();
        if count == 0 {
            return Ok(0);
        }
        let base_version = reserve_versions(count);
        for (i, write) in writes.iter_mut().enumerate() {
            write.version = base_version + i as i64;
        }
        self.blocking(move |db| db.apply_presence(&writes).map_err(PresenceError::Storage))
            .await?;
        debug!(received = statuses.len(), written = count, "Applied presence batch");
        Ok(count)
    }

    /// Flips the given devices offline with a fresh version.
    pub async fn mark_offline(&self, devices: Vec<(String, DeviceFlag)>) -> Result<usize, PresenceError> {
        if devices.is_empty() {
            return Ok(0);
        }
        let now = chrono::Utc::now();
        let base_version = reserve_versions(devices.len());
        let writes: Vec<PresenceWrite> = devices
            .into_iter()
            .enumerate()
            .map(|(i, (uid, flag))| PresenceWrite {
                uid,
                device_flag: flag.0,
                online: false,
                at: now.timestamp(),
                version: base_version + i as i64,
            })
            .collect();
        let count = writes.len();
        self.blocking(move |db| db.apply_presence(&writes).map_err(PresenceError::Storage))
            .await?;
        Ok(count)
    }

    // -- Main device --

    /// Highest-weight online device of `uid`.
    pub async fn main_device(&self, uid: &str) -> Result<Option<PresenceRow>, PresenceError> {
        let uid = uid.to_string();
        self.blocking(move |db| db.query_max_weight_online(&uid).map_err(PresenceError::Storage))
            .await
    }

    /// Which device to announce after `status` was applied.
    pub async fn main_device_after(&self, status: &OnlineStatus) -> Result<MainDevice, PresenceError> {
        let primary = self.weights.primary();
        if status.online && status.device_flag == primary {
            return Ok(MainDevice {
                flag: primary,
                all_offline: false,
            });
        }
        Ok(match self.main_device(&status.uid).await? {
            Some(row) => MainDevice {
                flag: DeviceFlag(row.device_flag),
                all_offline: false,
            },
            None => MainDevice {
                flag: status.device_flag,
                all_offline: true,
            },
        })
    }

    // -- Queries --

    /// The device most relevant to `uid`: an online one, else the most
    /// recently disconnected.
    pub async fn last_device(&self, uid: &str) -> Result<Option<PresenceRow>, PresenceError> {
        let uid = uid.to_string();
        self.blocking(move |db| db.query_last_device(&uid).map_err(PresenceError::Storage))
            .await
    }

    /// One status per uid. With `within`, users offline for longer are left out.
    pub async fn last_statuses(
        &self,
        uids: Vec<String>,
        within: Option<Duration>,
    ) -> Result<Vec<OnlineStatusResp>, PresenceError> {
        let now = chrono::Utc::now().timestamp();
        let within = within.map(|d| d.as_secs() as i64);
        let rows = self
            .blocking(move |db| {
                db.query_last_statuses(&uids, now, within)
                    .map_err(PresenceError::Storage)
            })
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| OnlineStatusResp {
                uid: r.row.uid,
                device_flag: DeviceFlag(r.row.device_flag),
                last_offline: r.row.last_offline,
                online: i32::from(r.row.online),
            })
            .collect())
    }

    pub async fn device_online(&self, uid: &str, flag: DeviceFlag) -> Result<bool, PresenceError> {
        let uid = uid.to_string();
        self.blocking(move |db| db.device_online(&uid, flag.0).map_err(PresenceError::Storage))
            .await
    }

    pub async fn online_count(&self) -> Result<i64, PresenceError> {
        self.blocking(|db| db.online_count().map_err(PresenceError::Storage))
            .await
    }

    /// Online rows whose last online transition is older than `older_than`.
    pub async fn stale_onlines(&self, older_than: Duration, limit: u32) -> Result<Vec<PresenceRow>, PresenceError> {
        let now = chrono::Utc::now().timestamp();
        let older_than = older_than.as_secs() as i64;
        self.blocking(move |db| {
            db.query_stale_onlines(now, older_than, limit)
                .map_err(PresenceError::Storage)
        })
        .await
    }
}

/// Highest presence version handed out by this process.
static LAST_VERSION: AtomicI64 = AtomicI64::new(0);

/// Reserves `n` consecutive versions and returns the first. Versions are
/// microsecond timestamps, and a range never overlaps or precedes one
/// reserved earlier, however large that batch was.
fn reserve_versions(n: usize) -> i64 {
    let n = n.max(1) as i64;
    let now = chrono::Utc::now().timestamp_micros();
    let mut last = LAST_VERSION.load(Ordering::Relaxed);
    loop {
        let base = now.max(last + 1);
        match LAST_VERSION.compare_exchange_weak(last, base + n - 1, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return base,
            Err(current) => last = current,
        }
    }
}

#[async_trait]
impl PresenceListener for PresenceTracker {
    async fn on_presence(&self, statuses: &[OnlineStatus]) {
        match self.apply(statuses).await {
            Ok(n) if n > 0 => info!(written = n, "Presence updated"),
            Ok(_) => {}
            Err(e) => error!("Failed to persist presence batch: {}", e),
        }
    }
}
