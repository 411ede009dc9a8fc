use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{ChannelType, DeviceFlag, MessageHeader, Setting, base64_bytes};

pub const EVENT_MSG_NOTIFY: &str = "msg.notify";
pub const EVENT_ONLINE_STATUS: &str = "user.onlinestatus";
pub const EVENT_MSG_OFFLINE: &str = "msg.offline";

/// The event kinds the IM core emits that we act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    MsgNotify,
    OnlineStatus,
    MsgOffline,
}

impl EventKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            EVENT_MSG_NOTIFY => Some(Self::MsgNotify),
            EVENT_ONLINE_STATUS => Some(Self::OnlineStatus),
            EVENT_MSG_OFFLINE => Some(Self::MsgOffline),
            _ => None,
        }
    }
}

/// A message envelope as delivered by the IM core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub header: MessageHeader,
    #[serde(default)]
    pub setting: Setting,
    #[serde(default)]
    pub client_msg_no: String,
    pub message_id: i64,
    #[serde(default)]
    pub message_seq: u32,
    #[serde(default)]
    pub from_uid: String,
    #[serde(default)]
    pub to_uid: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub channel_type: u8,
    #[serde(default)]
    pub expire: u32,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, with = "base64_bytes")]
    pub payload: Vec<u8>,
}

impl Message {
    pub fn channel_type(&self) -> ChannelType {
        ChannelType::from(self.channel_type)
    }

    /// Messages flagged no-persist or sync-once are never written to storage.
    pub fn is_persistable(&self) -> bool {
        self.header.no_persist != 1 && self.header.sync_once != 1
    }

    /// Absolute expiry in seconds, 0 when the message never expires.
    pub fn expire_at(&self) -> i64 {
        if self.expire > 0 {
            self.timestamp + i64::from(self.expire)
        } else {
            0
        }
    }
}

/// Offline-push notice: one message plus the recipients that were offline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfflineNotify {
    #[serde(flatten)]
    pub message: Message,
    #[serde(default)]
    pub to_uids: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compress: String,
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub compress_to_uids: Vec<u8>,
    #[serde(default)]
    pub source_id: i64,
}

/// One decoded device transition from a `user.onlinestatus` batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineStatus {
    pub uid: String,
    pub device_flag: DeviceFlag,
    pub online: bool,
    pub socket_id: i64,
    /// Connections still open under this device flag.
    pub online_count: i64,
    /// Connections still open across all of the user's devices.
    pub total_online_count: i64,
}

impl OnlineStatus {
    /// Parses `uid-deviceFlag-status[-socketID-onlineCount-totalOnlineCount]`.
    ///
    /// Fewer than three fields yields `None`. Numeric fields that fail to
    /// parse read as 0, and the trailing three are only honoured when all six
    /// fields are present.
    pub fn parse(raw: &str) -> Option<Self> {
        let parts: Vec<&str> = raw.split('-').collect();
        if parts.len() < 3 {
            return None;
        }

        let device_flag = parts[1].parse::<u64>().unwrap_or(0) as u8;
        let status = parts[2].parse::<u64>().unwrap_or(0);

        let (socket_id, online_count, total_online_count) = if parts.len() >= 6 {
            (
                parts[3].parse::<i64>().unwrap_or(0),
                parts[4].parse::<i64>().unwrap_or(0),
                parts[5].parse::<i64>().unwrap_or(0),
            )
        } else {
            (0, 0, 0)
        };

        Some(Self {
            uid: parts[0].to_string(),
            device_flag: DeviceFlag(device_flag),
            online: status == 1,
            socket_id,
            online_count,
            total_online_count,
        })
    }
}

/// Receives each committed `msg.notify` batch.
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_messages(&self, messages: &[Message]);
}

/// Receives each decoded `user.onlinestatus` batch.
#[async_trait]
pub trait PresenceListener: Send + Sync {
    async fn on_presence(&self, statuses: &[OnlineStatus]);
}
