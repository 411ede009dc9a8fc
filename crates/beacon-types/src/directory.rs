//! Collaborator seams consumed by the dispatch and presence paths.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::OnlineStatusResp;
use crate::models::{ChannelType, MessageHeader, Setting};

/// The per-user slice of account settings a push decision needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserNotice {
    pub uid: String,
    pub name: String,
    /// Global "notify me of new messages" switch.
    pub new_msg_notice: bool,
    /// Recipient opted in to message previews in notifications.
    pub show_detail: bool,
}

/// A recipient's mute flag toward a single peer or group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuteSetting {
    pub uid: String,
    pub mute: bool,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Users that exist among `uids`. Missing uids are simply absent.
    async fn get_users(&self, uids: &[String]) -> anyhow::Result<Vec<UserNotice>>;

    /// Mute flags each of `uids` holds toward `peer_uid` in 1:1 chats.
    async fn peer_settings(&self, uids: &[String], peer_uid: &str) -> anyhow::Result<Vec<MuteSetting>>;

    async fn friend_uids(&self, uid: &str) -> anyhow::Result<Vec<String>>;
}

#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Mute flags each of `uids` holds toward `group_no`.
    async fn settings_with_uids(&self, group_no: &str, uids: &[String]) -> anyhow::Result<Vec<MuteSetting>>;
}

/// Command message sent through the IM core to a set of subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmdRequest {
    #[serde(skip)]
    pub no_persist: bool,
    #[serde(default)]
    pub from_uid: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub channel_type: u8,
    pub subscribers: Vec<String>,
    pub cmd: String,
    pub param: serde_json::Value,
}

/// Body of the IM core `/message/send` call.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub header: MessageHeader,
    pub setting: Setting,
    pub from_uid: String,
    pub channel_id: String,
    pub channel_type: u8,
    pub subscribers: Vec<String>,
    #[serde(with = "crate::models::base64_bytes")]
    pub payload: Vec<u8>,
}

impl CmdRequest {
    /// Wraps the command as a sync-once message the IM core fans out.
    pub fn into_send_request(self) -> SendMessageRequest {
        let content = serde_json::json!({
            "cmd": self.cmd,
            "type": crate::models::ContentType::Cmd.code(),
            "param": self.param,
        });
        SendMessageRequest {
            header: MessageHeader {
                no_persist: i32::from(self.no_persist),
                red_dot: 0,
                sync_once: 1,
            },
            setting: Setting::default().with_no_update_conversation(),
            from_uid: self.from_uid,
            channel_id: self.channel_id,
            channel_type: if self.channel_type == 0 {
                ChannelType::PERSON
            } else {
                self.channel_type
            },
            subscribers: self.subscribers,
            payload: content.to_string().into_bytes(),
        }
    }
}

/// The IM core's HTTP API, as far as this service needs it.
#[async_trait]
pub trait ImCore: Send + Sync {
    /// Devices the IM core currently holds a connection for, among `uids`.
    async fn online_status(&self, uids: &[String]) -> anyhow::Result<Vec<OnlineStatusResp>>;

    async fn send_cmd(&self, req: CmdRequest) -> anyhow::Result<()>;
}
