//! Tells a user's friends (and the user's other devices) which of the
//! user's devices is now the main one.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use beacon_types::directory::{CmdRequest, ImCore, UserDirectory};
use beacon_types::events::{OnlineStatus, PresenceListener};
use beacon_types::models::DeviceFlag;

use crate::PresenceError;
use crate::tracker::{MainDevice, PresenceTracker};

pub const CMD_ONLINE_STATUS: &str = "onlineStatus";

pub struct OnlineAnnouncer {
    tracker: Arc<PresenceTracker>,
    users: Arc<dyn UserDirectory>,
    im: Arc<dyn ImCore>,
}

impl OnlineAnnouncer {
    pub fn new(tracker: Arc<PresenceTracker>, users: Arc<dyn UserDirectory>, im: Arc<dyn ImCore>) -> Self {
        Self { tracker, users, im }
    }

    /// Sends one `onlineStatus` command for `status`. Returns whether a
    /// command was sent; nothing is sent to a user without friends.
    pub async fn announce(&self, status: &OnlineStatus) -> Result<bool, PresenceError> {
        let main = self.tracker.main_device_after(status).await?;

        let mut subscribers = self
            .users
            .friend_uids(&status.uid)
            .await
            .map_err(PresenceError::Directory)?;
        if subscribers.is_empty() {
            return Ok(false);
        }
        // Other devices of the same user follow web and pc logins.
        if status.device_flag != DeviceFlag::APP {
            subscribers.push(status.uid.clone());
        }

        let req = CmdRequest {
            no_persist: true,
            from_uid: String::new(),
            channel_id: String::new(),
            channel_type: 0,
            subscribers,
            cmd: CMD_ONLINE_STATUS.to_string(),
            param: online_param(status, main),
        };
        self.im.send_cmd(req).await.map_err(PresenceError::ImCore)?;
        Ok(true)
    }
}

fn online_param(status: &OnlineStatus, main: MainDevice) -> serde_json::Value {
    let mut param = json!({
        "online": i32::from(status.online),
        "device_flag": status.device_flag,
        "uid": status.uid,
        "main_device_flag": main.flag,
    });
    if main.all_offline {
        param["all_offline"] = json!(1);
    }
    param
}

#[async_trait]
impl PresenceListener for OnlineAnnouncer {
    async fn on_presence(&self, statuses: &[OnlineStatus]) {
        for status in statuses {
            if !status.online && status.online_count > 0 {
                continue;
            }
            match self.announce(status).await {
                Ok(true) => debug!(uid = %status.uid, online = status.online, "Announced online status"),
                Ok(false) => {}
                Err(e) => warn!(uid = %status.uid, "Failed to announce online status: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FriendDirectory, MockImCore, status, tracker};

    fn setup(friends: &[(&str, &[&str])]) -> (Arc<PresenceTracker>, OnlineAnnouncer, Arc<MockImCore>) {
        let (t, _) = tracker();
        let t = Arc::new(t);
        let im = Arc::new(MockImCore::default());
        let announcer = OnlineAnnouncer::new(t.clone(), Arc::new(FriendDirectory::with(friends)), im.clone());
        (t, announcer, im)
    }

    #[tokio::test]
    async fn web_login_reaches_friends_and_self() {
        let (t, announcer, im) = setup(&[("u1", &["f1", "f2"])]);
        let batch = [status("u1", 0, true, 1), status("u1", 1, true, 1)];
        t.on_presence(&batch).await;
        announcer.on_presence(&batch).await;

        let cmds = im.cmds();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].subscribers, vec!["f1", "f2"]);
        assert_eq!(cmds[1].subscribers, vec!["f1", "f2", "u1"]);
        assert_eq!(cmds[1].cmd, CMD_ONLINE_STATUS);
        assert!(cmds[1].no_persist);
        assert_eq!(cmds[1].param["device_flag"], 1);
        assert_eq!(cmds[1].param["main_device_flag"], 0);
        assert!(cmds[1].param.get("all_offline").is_none());
    }

    #[tokio::test]
    async fn last_device_offline_sets_all_offline() {
        let (t, announcer, im) = setup(&[("u1", &["f1"])]);
        t.on_presence(&[status("u1", 0, true, 1)]).await;

        let off = [status("u1", 0, false, 0)];
        t.on_presence(&off).await;
        announcer.on_presence(&off).await;

        let cmds = im.cmds();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].param["online"], 0);
        assert_eq!(cmds[0].param["main_device_flag"], 0);
        assert_eq!(cmds[0].param["all_offline"], 1);
    }

    #[tokio::test]
    async fn no_audience_no_command() {
        let (t, announcer, im) = setup(&[]);
        let batch = [status("u1", 0, true, 1)];
        t.on_presence(&batch).await;
        announcer.on_presence(&batch).await;
        assert!(im.cmds().is_empty());
    }

    #[tokio::test]
    async fn friendless_web_login_is_not_announced() {
        let (t, announcer, im) = setup(&[]);
        let batch = [status("u1", 1, true, 1)];
        t.on_presence(&batch).await;
        assert!(!announcer.announce(&batch[0]).await.unwrap());
        assert!(im.cmds().is_empty());
    }

    #[tokio::test]
    async fn partial_disconnect_is_not_announced() {
        let (_, announcer, im) = setup(&[("u1", &["f1"])]);
        announcer.on_presence(&[status("u1", 1, false, 2)]).await;
        assert!(im.cmds().is_empty());
    }
}
