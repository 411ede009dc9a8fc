/// Database row types. These map directly to SQLite rows.
/// Distinct from beacon-types wire models to keep the DB layer independent.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub message_id: String,
    pub message_seq: i64,
    pub client_msg_no: String,
    pub header: String,
    pub setting: u8,
    pub signal: u8,
    pub from_uid: String,
    pub channel_id: String,
    pub channel_type: u8,
    pub expire: u32,
    pub expire_at: i64,
    pub timestamp: i64,
    pub payload: String,
    pub is_deleted: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRow {
    pub uid: String,
    pub device_flag: u8,
    pub last_online: i64,
    pub last_offline: i64,
    pub online: bool,
    pub version: i64,
}

/// A presence row joined with its device weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedPresenceRow {
    pub row: PresenceRow,
    pub weight: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceWeightRow {
    pub device_flag: u8,
    pub weight: i64,
    pub remark: String,
}

/// One device transition to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceWrite {
    pub uid: String,
    pub device_flag: u8,
    pub online: bool,
    /// Seconds; written to `last_online` or `last_offline` depending on `online`.
    pub at: i64,
    pub version: i64,
}

/// Names a recipient could see for a sender.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThirdName {
    pub name: String,
    pub remark: String,
    pub name_in_group: String,
}
