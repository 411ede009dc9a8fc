use std::str::FromStr;

use beacon_types::models::ContentType;

/// Language of the fixed strings placed in notification bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "en-us" | "en_us" => Ok(Self::En),
            "zh" | "zh-cn" | "zh_cn" => Ok(Self::Zh),
            other => Err(format!("unsupported locale: {}", other)),
        }
    }
}

impl Locale {
    /// Body used whenever the real content must not be shown.
    pub fn generic(self) -> &'static str {
        match self {
            Self::En => "You have a new message",
            Self::Zh => "您有一条新的消息",
        }
    }

    /// Fixed body for non-text content. `None` for text and unknown kinds.
    pub fn placeholder(self, content_type: ContentType) -> Option<&'static str> {
        use ContentType::*;
        let s = match (self, content_type) {
            (Self::En, Image) => "[Image]",
            (Self::En, Gif) => "[GIF]",
            (Self::En, Voice) => "[Voice]",
            (Self::En, Video) => "[Video]",
            (Self::En, Card) => "[Contact Card]",
            (Self::En, File) => "[File]",
            (Self::En, Location) => "[Location]",
            (Self::En, RedPacket) => "[Red Packet]",
            (Self::En, Transfer) => "[Transfer]",
            (Self::En, VectorSticker) => "[Sticker]",
            (Self::En, EmojiSticker) => "[Emoji]",
            (Self::En, MultipleForward) => "[Chat History]",
            (Self::Zh, Image) => "[图片]",
            (Self::Zh, Gif) => "[GIF]",
            (Self::Zh, Voice) => "[语音]",
            (Self::Zh, Video) => "[视频]",
            (Self::Zh, Card) => "[名片]",
            (Self::Zh, File) => "[文件]",
            (Self::Zh, Location) => "[位置]",
            (Self::Zh, RedPacket) => "[红包]",
            (Self::Zh, Transfer) => "[转账]",
            (Self::Zh, VectorSticker) => "[动画表情]",
            (Self::Zh, EmojiSticker) => "[emoji表情]",
            (Self::Zh, MultipleForward) => "[聊天记录]",
            (_, Text) | (_, Cmd) => return None,
        };
        Some(s)
    }

    /// Prefix for group bodies, e.g. `Alice: hello`.
    pub fn sender_prefix(self, sender: &str) -> String {
        match self {
            Self::En => format!("{}: ", sender),
            Self::Zh => format!("{}：", sender),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_locale_names() {
        assert_eq!("en".parse::<Locale>().unwrap(), Locale::En);
        assert_eq!("zh-CN".parse::<Locale>().unwrap(), Locale::Zh);
        assert!("fr".parse::<Locale>().is_err());
    }

    #[test]
    fn placeholders() {
        assert_eq!(Locale::En.placeholder(ContentType::Image), Some("[Image]"));
        assert_eq!(Locale::Zh.placeholder(ContentType::Voice), Some("[语音]"));
        assert_eq!(Locale::En.placeholder(ContentType::Text), None);
        assert_eq!(Locale::En.sender_prefix("Bob"), "Bob: ");
    }
}
