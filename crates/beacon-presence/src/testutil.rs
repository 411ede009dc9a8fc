use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use beacon_db::Database;
use beacon_types::api::OnlineStatusResp;
use beacon_types::directory::{CmdRequest, ImCore, MuteSetting, UserDirectory, UserNotice};
use beacon_types::events::OnlineStatus;
use beacon_types::models::DeviceFlag;

use crate::PresenceTracker;
use crate::weights::DeviceWeights;

pub fn tracker() -> (PresenceTracker, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory(1).unwrap());
    let weights = Arc::new(DeviceWeights::load(&db).unwrap());
    (PresenceTracker::new(db.clone(), weights), db)
}

pub fn status(uid: &str, flag: u8, online: bool, online_count: i64) -> OnlineStatus {
    OnlineStatus {
        uid: uid.into(),
        device_flag: DeviceFlag(flag),
        online,
        socket_id: 1,
        online_count,
        total_online_count: online_count,
    }
}

/// IM core double: reports the configured connections and records commands.
#[derive(Default)]
pub struct MockImCore {
    pub connected: Mutex<Vec<(String, DeviceFlag, i32)>>,
    pub cmds: Mutex<Vec<CmdRequest>>,
    pub queried: Mutex<Vec<Vec<String>>>,
    pub fail: AtomicBool,
}

impl MockImCore {
    pub fn connect(&self, uid: &str, flag: DeviceFlag) {
        self.report(uid, flag, 1);
    }

    /// Lists the device in `online_status` answers with the given flag.
    pub fn report(&self, uid: &str, flag: DeviceFlag, online: i32) {
        self.connected.lock().unwrap().push((uid.into(), flag, online));
    }

    pub fn cmds(&self) -> Vec<CmdRequest> {
        self.cmds.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImCore for MockImCore {
    async fn online_status(&self, uids: &[String]) -> anyhow::Result<Vec<OnlineStatusResp>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("im core unavailable");
        }
        self.queried.lock().unwrap().push(uids.to_vec());
        Ok(self
            .connected
            .lock()
            .unwrap()
            .iter()
            .filter(|(uid, _, _)| uids.contains(uid))
            .map(|(uid, flag, online)| OnlineStatusResp {
                uid: uid.clone(),
                device_flag: *flag,
                last_offline: 0,
                online: *online,
            })
            .collect())
    }

    async fn send_cmd(&self, req: CmdRequest) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("im core unavailable");
        }
        self.cmds.lock().unwrap().push(req);
        Ok(())
    }
}

/// Friend lists only; the other directory calls are unused here.
#[derive(Default)]
pub struct FriendDirectory {
    pub friends: HashMap<String, Vec<String>>,
}

impl FriendDirectory {
    pub fn with(pairs: &[(&str, &[&str])]) -> Self {
        Self {
            friends: pairs
                .iter()
                .map(|(uid, fs)| (uid.to_string(), fs.iter().map(|f| f.to_string()).collect()))
                .collect(),
        }
    }
}

#[async_trait]
impl UserDirectory for FriendDirectory {
    async fn get_users(&self, _uids: &[String]) -> anyhow::Result<Vec<UserNotice>> {
        Ok(vec![])
    }

    async fn peer_settings(&self, _uids: &[String], _peer_uid: &str) -> anyhow::Result<Vec<MuteSetting>> {
        Ok(vec![])
    }

    async fn friend_uids(&self, uid: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.friends.get(uid).cloned().unwrap_or_default())
    }
}
