use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Conversation kind as carried by the IM core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    Person,
    Group,
    Other(u8),
}

impl ChannelType {
    pub const PERSON: u8 = 1;
    pub const GROUP: u8 = 2;

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Person => Self::PERSON,
            Self::Group => Self::GROUP,
            Self::Other(v) => v,
        }
    }
}

impl From<u8> for ChannelType {
    fn from(v: u8) -> Self {
        match v {
            Self::PERSON => Self::Person,
            Self::GROUP => Self::Group,
            other => Self::Other(other),
        }
    }
}

/// Client category tag. Weights for ranking live in the `device_flag` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceFlag(pub u8);

impl DeviceFlag {
    pub const APP: DeviceFlag = DeviceFlag(0);
    pub const WEB: DeviceFlag = DeviceFlag(1);
    pub const PC: DeviceFlag = DeviceFlag(2);
}

impl fmt::Display for DeviceFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Push backend a device registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    #[serde(rename = "IOS")]
    Ios,
    #[serde(rename = "FIREBASE")]
    Firebase,
    #[serde(rename = "HMS")]
    Hms,
    #[serde(rename = "MI")]
    Mi,
    #[serde(rename = "OPPO")]
    Oppo,
    #[serde(rename = "VIVO")]
    Vivo,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ios => "IOS",
            Self::Firebase => "FIREBASE",
            Self::Hms => "HMS",
            Self::Mi => "MI",
            Self::Oppo => "OPPO",
            Self::Vivo => "VIVO",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown device type: {0}")]
pub struct UnknownDeviceType(pub String);

impl FromStr for DeviceType {
    type Err = UnknownDeviceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IOS" => Ok(Self::Ios),
            "FIREBASE" | "FCM" => Ok(Self::Firebase),
            "HMS" => Ok(Self::Hms),
            "MI" => Ok(Self::Mi),
            "OPPO" => Ok(Self::Oppo),
            "VIVO" => Ok(Self::Vivo),
            _ => Err(UnknownDeviceType(s.to_string())),
        }
    }
}

/// Message body kind, read from the `type` field of an unencrypted payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Text,
    Image,
    Gif,
    Voice,
    Video,
    Location,
    Card,
    File,
    RedPacket,
    Transfer,
    MultipleForward,
    VectorSticker,
    EmojiSticker,
    Cmd,
}

impl ContentType {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            1 => Self::Text,
            2 => Self::Image,
            3 => Self::Gif,
            4 => Self::Voice,
            5 => Self::Video,
            6 => Self::Location,
            7 => Self::Card,
            8 => Self::File,
            9 => Self::RedPacket,
            10 => Self::Transfer,
            11 => Self::MultipleForward,
            12 => Self::VectorSticker,
            13 => Self::EmojiSticker,
            99 => Self::Cmd,
            _ => return None,
        })
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Text => 1,
            Self::Image => 2,
            Self::Gif => 3,
            Self::Voice => 4,
            Self::Video => 5,
            Self::Location => 6,
            Self::Card => 7,
            Self::File => 8,
            Self::RedPacket => 9,
            Self::Transfer => 10,
            Self::MultipleForward => 11,
            Self::VectorSticker => 12,
            Self::EmojiSticker => 13,
            Self::Cmd => 99,
        }
    }
}

/// Per-message setting bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Setting(pub u8);

impl Setting {
    pub fn receipt(self) -> bool {
        self.0 >> 7 & 0x01 == 1
    }

    pub fn no_update_conversation(self) -> bool {
        self.0 >> 6 & 0x01 == 1
    }

    /// End-to-end encrypted payload; the body must never be inspected.
    pub fn signal(self) -> bool {
        self.0 >> 5 & 0x01 == 1
    }

    pub fn with_no_update_conversation(self) -> Self {
        Self(self.0 | 1 << 6)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    #[serde(default)]
    pub no_persist: i32,
    #[serde(default)]
    pub red_dot: i32,
    #[serde(default)]
    pub sync_once: i32,
}

/// Serde adapter for byte fields the IM core sends as base64 strings.
/// `null` and a missing field both decode to an empty buffer.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as B64;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&B64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            Some(s) if !s.is_empty() => B64.decode(s.as_bytes()).map_err(serde::de::Error::custom),
            _ => Ok(Vec::new()),
        }
    }
}
