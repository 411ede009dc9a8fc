use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use beacon_types::directory::ImCore;
use beacon_types::models::DeviceFlag;

use crate::{PresenceError, PresenceTracker};

/// Online rows untouched for this long get checked against the IM core.
pub const STALE_AFTER: Duration = Duration::from_secs(60);
/// Rows examined per tick.
pub const SWEEP_BATCH: u32 = 1000;

/// Background task that reconciles stored presence with the IM core.
///
/// Any device we still think is online but the IM core no longer holds a
/// connection for is flipped offline. A failed tick changes nothing.
pub async fn run_sweep_loop(tracker: Arc<PresenceTracker>, im: Arc<dyn ImCore>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        match sweep_stale(&tracker, im.as_ref()).await {
            Ok(count) => {
                if count > 0 {
                    info!("Sweep: marked {} stale devices offline", count);
                }
            }
            Err(e) => {
                warn!("Sweep error: {}", e);
            }
        }
    }
}

pub async fn sweep_stale(tracker: &PresenceTracker, im: &dyn ImCore) -> Result<usize, PresenceError> {
    let stale = tracker.stale_onlines(STALE_AFTER, SWEEP_BATCH).await?;
    if stale.is_empty() {
        return Ok(0);
    }

    let mut uids: Vec<String> = stale.iter().map(|r| r.uid.clone()).collect();
    uids.sort();
    uids.dedup();

    // Any device the IM core still lists counts as connected.
    let live = im.online_status(&uids).await.map_err(PresenceError::ImCore)?;
    let live: HashSet<(String, DeviceFlag)> = live.into_iter().map(|s| (s.uid, s.device_flag)).collect();

    let gone: Vec<(String, DeviceFlag)> = stale
        .into_iter()
        .map(|r| (r.uid, DeviceFlag(r.device_flag)))
        .filter(|key| !live.contains(key))
        .collect();
    debug!(checked = uids.len(), gone = gone.len(), "Sweep checked stale devices");

    tracker.mark_offline(gone).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use beacon_db::models::PresenceWrite;

    use crate::testutil::{MockImCore, tracker};

    fn old_online(uid: &str, flag: u8) -> PresenceWrite {
        let at = chrono::Utc::now().timestamp() - 300;
        PresenceWrite {
            uid: uid.into(),
            device_flag: flag,
            online: true,
            at,
            version: at * 1_000_000,
        }
    }

    #[tokio::test]
    async fn flips_devices_the_im_core_lost() {
        let (t, db) = tracker();
        db.apply_presence(&[old_online("u1", 0), old_online("u1", 1), old_online("u2", 0)])
            .unwrap();
        let im = MockImCore::default();
        im.connect("u1", DeviceFlag::APP);

        assert_eq!(sweep_stale(&t, &im).await.unwrap(), 2);
        assert!(db.get_presence("u1", 0).unwrap().unwrap().online);
        assert!(!db.get_presence("u1", 1).unwrap().unwrap().online);
        assert!(!db.get_presence("u2", 0).unwrap().unwrap().online);
        assert_eq!(im.queried.lock().unwrap()[0], vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn listed_devices_stay_online_whatever_their_flag() {
        let (t, db) = tracker();
        db.apply_presence(&[old_online("u1", 1)]).unwrap();
        let im = MockImCore::default();
        im.report("u1", DeviceFlag::WEB, 0);

        assert_eq!(sweep_stale(&t, &im).await.unwrap(), 0);
        assert!(db.get_presence("u1", 1).unwrap().unwrap().online);
    }

    #[tokio::test]
    async fn fresh_rows_are_left_alone() {
        let (t, _) = tracker();
        t.apply(&[crate::testutil::status("u1", 0, true, 1)]).await.unwrap();
        let im = MockImCore::default();

        assert_eq!(sweep_stale(&t, &im).await.unwrap(), 0);
        assert!(im.queried.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn im_core_failure_aborts_the_tick() {
        let (t, db) = tracker();
        db.apply_presence(&[old_online("u1", 0)]).unwrap();
        let im = MockImCore::default();
        im.fail.store(true, Ordering::SeqCst);

        assert!(matches!(sweep_stale(&t, &im).await, Err(PresenceError::ImCore(_))));
        assert!(db.get_presence("u1", 0).unwrap().unwrap().online);
    }
}
