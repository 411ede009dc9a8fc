use std::collections::{HashMap, HashSet};

use beacon_types::directory::{MuteSetting, UserNotice};
use beacon_types::events::Message;
use beacon_types::models::{ChannelType, ContentType};

use crate::payload::MessageContent;

/// Content kinds that may raise a push.
pub const PUSHABLE_TYPES: [ContentType; 12] = [
    ContentType::Text,
    ContentType::Image,
    ContentType::Gif,
    ContentType::Voice,
    ContentType::Video,
    ContentType::Location,
    ContentType::Card,
    ContentType::File,
    ContentType::RedPacket,
    ContentType::MultipleForward,
    ContentType::VectorSticker,
    ContentType::EmojiSticker,
];

/// Why a message or a recipient was not pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppressed {
    SyncOnce,
    UnsupportedContent,
    NoticeOff,
    PeerMuted,
    GroupMuted,
}

/// Mute flags fetched once per message, keyed by recipient uid.
#[derive(Debug, Default)]
pub struct MuteIndex {
    peer: HashSet<String>,
    group: HashSet<String>,
}

impl MuteIndex {
    pub fn new(peer: Vec<MuteSetting>, group: Vec<MuteSetting>) -> Self {
        let muted = |v: Vec<MuteSetting>| v.into_iter().filter(|s| s.mute).map(|s| s.uid).collect();
        Self {
            peer: muted(peer),
            group: muted(group),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    pushable: HashSet<ContentType>,
}

impl Default for EligibilityFilter {
    fn default() -> Self {
        Self {
            pushable: PUSHABLE_TYPES.into_iter().collect(),
        }
    }
}

impl EligibilityFilter {
    /// Message-level check, run before any recipient is looked at.
    ///
    /// `content` is `None` for encrypted messages; those skip the type check
    /// since their body cannot be read.
    pub fn prefilter(&self, message: &Message, content: Option<&MessageContent>) -> Result<(), Suppressed> {
        if message.header.sync_once == 1 {
            return Err(Suppressed::SyncOnce);
        }
        if let Some(content) = content {
            match content.content_type {
                Some(t) if self.pushable.contains(&t) => {}
                _ => return Err(Suppressed::UnsupportedContent),
            }
        }
        Ok(())
    }

    /// Recipient-level check. The first negative rule wins.
    pub fn allow(&self, channel_type: ChannelType, user: &UserNotice, mutes: &MuteIndex) -> Result<(), Suppressed> {
        if !user.new_msg_notice {
            return Err(Suppressed::NoticeOff);
        }
        match channel_type {
            ChannelType::Person if mutes.peer.contains(&user.uid) => Err(Suppressed::PeerMuted),
            ChannelType::Group if mutes.group.contains(&user.uid) => Err(Suppressed::GroupMuted),
            _ => Ok(()),
        }
    }
}

/// Indexes directory users by uid for the per-recipient scan.
pub fn index_users(users: Vec<UserNotice>) -> HashMap<String, UserNotice> {
    users.into_iter().map(|u| (u.uid.clone(), u)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_types::models::MessageHeader;

    fn user(uid: &str, notice: bool) -> UserNotice {
        UserNotice {
            uid: uid.into(),
            name: uid.into(),
            new_msg_notice: notice,
            show_detail: false,
        }
    }

    fn mute(uid: &str, mute: bool) -> MuteSetting {
        MuteSetting { uid: uid.into(), mute }
    }

    #[test]
    fn notice_off_wins_over_everything() {
        let f = EligibilityFilter::default();
        let mutes = MuteIndex::new(vec![mute("a", false)], vec![]);
        assert_eq!(
            f.allow(ChannelType::Person, &user("a", false), &mutes),
            Err(Suppressed::NoticeOff)
        );
    }

    #[test]
    fn peer_mute_only_applies_to_person_chats() {
        let f = EligibilityFilter::default();
        let mutes = MuteIndex::new(vec![mute("a", true)], vec![]);
        assert_eq!(
            f.allow(ChannelType::Person, &user("a", true), &mutes),
            Err(Suppressed::PeerMuted)
        );
        assert_eq!(f.allow(ChannelType::Group, &user("a", true), &mutes), Ok(()));
    }

    #[test]
    fn group_mute() {
        let f = EligibilityFilter::default();
        let mutes = MuteIndex::new(vec![], vec![mute("a", true), mute("b", false)]);
        assert_eq!(
            f.allow(ChannelType::Group, &user("a", true), &mutes),
            Err(Suppressed::GroupMuted)
        );
        assert_eq!(f.allow(ChannelType::Group, &user("b", true), &mutes), Ok(()));
    }

    #[test]
    fn prefilter_rules() {
        let f = EligibilityFilter::default();
        let text = MessageContent::decode(br#"{"type":1}"#).unwrap();
        let transfer = MessageContent::decode(br#"{"type":10}"#).unwrap();
        let unknown = MessageContent::decode(br#"{"type":1000}"#).unwrap();

        let mut msg = Message::default();
        assert_eq!(f.prefilter(&msg, Some(&text)), Ok(()));
        assert_eq!(f.prefilter(&msg, Some(&transfer)), Err(Suppressed::UnsupportedContent));
        assert_eq!(f.prefilter(&msg, Some(&unknown)), Err(Suppressed::UnsupportedContent));
        assert_eq!(f.prefilter(&msg, None), Ok(()));

        msg.header = MessageHeader {
            sync_once: 1,
            ..Default::default()
        };
        assert_eq!(f.prefilter(&msg, Some(&text)), Err(Suppressed::SyncOnce));
    }
}
