use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use beacon_db::Database;
use beacon_db::cache::FastCache;
use beacon_db::directory::SqlDirectory;
use beacon_types::directory::{GroupDirectory, MuteSetting, UserDirectory, UserNotice};
use beacon_types::events::{Message, OfflineNotify};

use crate::PushError;
use crate::locale::Locale;
use crate::payload::{Payload, PayloadBuilder};
use crate::providers::Pusher;
use crate::resolver::NameAndBadgeResolver;

#[derive(Default)]
pub struct RecordingPusher {
    sent: Mutex<Vec<(String, Payload)>>,
}

impl RecordingPusher {
    pub fn sent(&self) -> Vec<(String, Payload)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pusher for RecordingPusher {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn push(&self, device_token: &str, payload: &Payload) -> Result<(), PushError> {
        self.sent.lock().unwrap().push((device_token.to_string(), payload.clone()));
        Ok(())
    }
}

/// Builder over a directory where `alice` exists and group `g1` is "Hiking".
pub fn builder(cache: Arc<dyn FastCache>) -> PayloadBuilder {
    let db = Arc::new(Database::open_in_memory(1).unwrap());
    db.upsert_user("alice", "Alice", true, true).unwrap();
    db.upsert_group("g1", "Hiking").unwrap();
    let resolver = NameAndBadgeResolver::new(cache, Arc::new(SqlDirectory::new(db)), Duration::from_secs(60));
    PayloadBuilder::new(resolver, Locale::En, true)
}

pub fn user(uid: &str, new_msg_notice: bool) -> UserNotice {
    UserNotice {
        uid: uid.into(),
        name: uid.into(),
        new_msg_notice,
        show_detail: true,
    }
}

/// A notice from `alice`.
pub fn notice(channel_type: u8, channel_id: &str, to_uids: &[&str], payload: &str) -> OfflineNotify {
    OfflineNotify {
        message: Message {
            message_id: 100,
            message_seq: 7,
            from_uid: "alice".into(),
            channel_id: channel_id.into(),
            channel_type,
            payload: payload.as_bytes().to_vec(),
            ..Default::default()
        },
        to_uids: to_uids.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

/// In-memory user and group directory.
#[derive(Default)]
pub struct MockDirectory {
    pub users: Vec<UserNotice>,
    /// `(uid, peer)` pairs muted in 1:1 chats.
    pub peer_mutes: Vec<(String, String)>,
    /// `(uid, group)` pairs muted in groups.
    pub group_mutes: Vec<(String, String)>,
    pub fail: AtomicBool,
    pub settings_calls: AtomicUsize,
}

impl MockDirectory {
    fn check(&self) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("directory unavailable");
        }
        Ok(())
    }

    fn mutes(pairs: &[(String, String)], uids: &[String], key: &str) -> Vec<MuteSetting> {
        let muted: HashMap<&str, &str> = pairs.iter().map(|(u, k)| (u.as_str(), k.as_str())).collect();
        uids.iter()
            .filter(|u| muted.get(u.as_str()) == Some(&key))
            .map(|u| MuteSetting { uid: u.clone(), mute: true })
            .collect()
    }
}

#[async_trait]
impl UserDirectory for MockDirectory {
    async fn get_users(&self, uids: &[String]) -> anyhow::Result<Vec<UserNotice>> {
        self.check()?;
        Ok(self.users.iter().filter(|u| uids.contains(&u.uid)).cloned().collect())
    }

    async fn peer_settings(&self, uids: &[String], peer_uid: &str) -> anyhow::Result<Vec<MuteSetting>> {
        self.check()?;
        self.settings_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::mutes(&self.peer_mutes, uids, peer_uid))
    }

    async fn friend_uids(&self, _uid: &str) -> anyhow::Result<Vec<String>> {
        self.check()?;
        Ok(vec![])
    }
}

#[async_trait]
impl GroupDirectory for MockDirectory {
    async fn settings_with_uids(&self, group_no: &str, uids: &[String]) -> anyhow::Result<Vec<MuteSetting>> {
        self.check()?;
        self.settings_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::mutes(&self.group_mutes, uids, group_no))
    }
}
