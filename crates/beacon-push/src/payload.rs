use serde::Deserialize;
use tracing::error;

use beacon_types::directory::UserNotice;
use beacon_types::events::OfflineNotify;
use beacon_types::models::{ChannelType, ContentType};

use crate::PushError;
use crate::locale::Locale;
use crate::resolver::NameAndBadgeResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RtcOperation {
    Invite,
    Cancel,
}

impl RtcOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invite => "invite",
            Self::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallType {
    Audio,
    Video,
}

impl CallType {
    pub fn from_code(code: i64) -> Self {
        if code == 1 { Self::Video } else { Self::Audio }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Audio => 0,
            Self::Video => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadKind {
    Base,
    RtcCall {
        call_type: CallType,
        operation: RtcOperation,
        from_uid: String,
    },
}

/// Provider-neutral notification content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadInfo {
    pub title: String,
    pub content: String,
    pub badge: i64,
    pub kind: PayloadKind,
}

/// What a pusher sends: the content plus the per-message notify id some
/// vendors use to collapse notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub info: PayloadInfo,
    pub notify_id: String,
}

impl Payload {
    pub fn title(&self) -> &str {
        &self.info.title
    }

    pub fn content(&self) -> &str {
        &self.info.content
    }

    pub fn badge(&self) -> i64 {
        self.info.badge
    }

    pub fn is_rtc(&self) -> bool {
        matches!(self.info.kind, PayloadKind::RtcCall { .. })
    }

    /// Ringing call: an RTC payload that is not a cancellation.
    pub fn is_ringing(&self) -> bool {
        matches!(
            self.info.kind,
            PayloadKind::RtcCall { operation: RtcOperation::Invite, .. }
        )
    }
}

// -- Decoded message body --

#[derive(Debug, Deserialize)]
struct RawRtc {
    operation: RtcOperation,
    #[serde(default)]
    call_type: i64,
}

#[derive(Debug, Deserialize)]
struct RawContent {
    #[serde(rename = "type")]
    content_type: Option<i64>,
    #[serde(default)]
    content: Option<serde_json::Value>,
    #[serde(default)]
    rtc: Option<RawRtc>,
}

/// The parts of an unencrypted payload that matter for a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub type_code: i64,
    pub content_type: Option<ContentType>,
    pub text: Option<String>,
    pub rtc: Option<(RtcOperation, CallType)>,
}

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("payload is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload has no type")]
    MissingType,
}

impl MessageContent {
    pub fn decode(payload: &[u8]) -> Result<Self, ContentError> {
        let raw: RawContent = serde_json::from_slice(payload)?;
        let type_code = raw.content_type.ok_or(ContentError::MissingType)?;
        let text = match raw.content {
            Some(serde_json::Value::String(s)) => Some(s),
            _ => None,
        };
        Ok(Self {
            type_code,
            content_type: ContentType::from_code(type_code),
            text,
            rtc: raw.rtc.map(|r| (r.operation, CallType::from_code(r.call_type))),
        })
    }
}

// -- Builder --

/// Turns an offline notice into the payload a single recipient will see.
#[derive(Clone)]
pub struct PayloadBuilder {
    resolver: NameAndBadgeResolver,
    locale: Locale,
    detail_enabled: bool,
}

impl PayloadBuilder {
    pub fn new(resolver: NameAndBadgeResolver, locale: Locale, detail_enabled: bool) -> Self {
        Self {
            resolver,
            locale,
            detail_enabled,
        }
    }

    /// `content` is `None` for encrypted messages.
    pub async fn build(
        &self,
        notice: &OfflineNotify,
        content: Option<&MessageContent>,
        recipient: &UserNotice,
    ) -> Result<Payload, PushError> {
        let msg = &notice.message;
        let is_group = msg.channel_type() == ChannelType::Group;
        let group_no = is_group.then_some(msg.channel_id.as_str());

        let from_name = self
            .resolver
            .display_name(&msg.from_uid, &recipient.uid, group_no)
            .await?;
        let badge = self.resolver.badge(&recipient.uid).await;
        let mut body = self.alert(notice, content, recipient);

        let title = if let Some(group_no) = group_no {
            let group_name = self.resolver.group_name(group_no).await.map_err(|e| {
                error!(group_no, "Failed to resolve group name: {}", e);
                e
            })?;
            body = format!("{}{}", self.locale.sender_prefix(&from_name), body);
            group_name
        } else {
            from_name
        };

        let kind = match content.and_then(|c| c.rtc) {
            Some((operation, call_type)) => PayloadKind::RtcCall {
                call_type,
                operation,
                from_uid: msg.from_uid.clone(),
            },
            None => PayloadKind::Base,
        };

        Ok(Payload {
            info: PayloadInfo {
                title,
                content: body,
                badge,
                kind,
            },
            notify_id: msg.message_seq.to_string(),
        })
    }

    fn alert(&self, notice: &OfflineNotify, content: Option<&MessageContent>, recipient: &UserNotice) -> String {
        let content = match content {
            Some(c) if !notice.message.setting.signal() && self.detail_enabled && recipient.show_detail => c,
            _ => return self.locale.generic().to_string(),
        };

        match content.content_type {
            Some(ContentType::Text) => content.text.clone().unwrap_or_default(),
            Some(t) => self.locale.placeholder(t).unwrap_or_default().to_string(),
            None => String::new(),
        }
    }
}
