use anyhow::Result;
use rusqlite::Connection;
use tracing::{debug, warn};

use beacon_types::events::Message;
use beacon_types::models::ChannelType;

use crate::models::MessageRow;
use crate::{Database, OptionalExt};

/// Shard 0 keeps the bare name so single-table deployments read naturally.
pub fn shard_table_name(index: u32) -> String {
    if index == 0 {
        "message".to_string()
    } else {
        format!("message{}", index)
    }
}

pub fn shard_index(channel_id: &str, table_count: u32) -> u32 {
    crc32fast::hash(channel_id.as_bytes()) % table_count.max(1)
}

/// Deterministic storage id for a 1:1 conversation: both directions map to
/// the same string. The uid with the larger CRC-32 goes first.
pub fn person_channel_id(from_uid: &str, to_uid: &str) -> String {
    let from_hash = crc32fast::hash(from_uid.as_bytes());
    let to_hash = crc32fast::hash(to_uid.as_bytes());
    let from_first = match from_hash.cmp(&to_hash) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => {
            warn!(from_uid, to_uid, "CRC-32 collision between 1:1 participants");
            from_uid > to_uid
        }
    };
    if from_first {
        format!("{}@{}", from_uid, to_uid)
    } else {
        format!("{}@{}", to_uid, from_uid)
    }
}

/// The channel id a message is stored under.
pub fn storage_channel_id(message: &Message) -> String {
    match message.channel_type() {
        ChannelType::Person => person_channel_id(&message.from_uid, &message.channel_id),
        _ => message.channel_id.clone(),
    }
}

impl MessageRow {
    pub fn from_message(message: &Message) -> Self {
        Self {
            message_id: message.message_id.to_string(),
            message_seq: i64::from(message.message_seq),
            client_msg_no: message.client_msg_no.clone(),
            header: serde_json::to_string(&message.header).unwrap_or_default(),
            setting: message.setting.0,
            signal: u8::from(message.setting.signal()),
            from_uid: message.from_uid.clone(),
            channel_id: storage_channel_id(message),
            channel_type: message.channel_type,
            expire: message.expire,
            expire_at: message.expire_at(),
            timestamp: message.timestamp,
            payload: String::from_utf8_lossy(&message.payload).into_owned(),
            is_deleted: 0,
        }
    }
}

impl Database {
    /// Writes every persistable message of the batch in a single transaction.
    ///
    /// Re-delivered message ids are ignored. Returns the messages that were
    /// eligible for storage, in input order, once the transaction has committed.
    pub fn persist_messages(&self, messages: &[Message]) -> Result<Vec<Message>> {
        let committed: Vec<Message> = messages.iter().filter(|m| m.is_persistable()).cloned().collect();
        if committed.is_empty() {
            return Ok(committed);
        }

        let table_count = self.message_table_count();
        let inserted = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            for message in &committed {
                let row = MessageRow::from_message(message);
                let table = shard_table_name(shard_index(&row.channel_id, table_count));
                inserted += insert_message_row(&tx, &table, &row)?;
            }
            tx.commit()?;
            Ok(inserted)
        })?;

        debug!(
            batch = messages.len(),
            persisted = committed.len(),
            inserted,
            "Message batch committed"
        );
        Ok(committed)
    }

    pub fn get_message(&self, channel_id: &str, message_id: &str) -> Result<Option<MessageRow>> {
        let table = shard_table_name(shard_index(channel_id, self.message_table_count()));
        self.with_conn(|conn| query_message(conn, &table, message_id))
    }

    /// Rows stored for a channel, across the shard it maps to.
    pub fn count_messages(&self, channel_id: &str) -> Result<i64> {
        let table = shard_table_name(shard_index(channel_id, self.message_table_count()));
        self.with_conn(|conn| {
            let n = conn.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE channel_id = ?1", table),
                [channel_id],
                |r| r.get(0),
            )?;
            Ok(n)
        })
    }
}

fn insert_message_row(conn: &Connection, table: &str, row: &MessageRow) -> Result<usize> {
    let n = conn.execute(
        &format!(
            "INSERT INTO {} (message_id, message_seq, client_msg_no, header, setting, signal,
                             from_uid, channel_id, channel_type, expire, expire_at, timestamp,
                             payload, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(message_id) DO NOTHING",
            table
        ),
        rusqlite::params![
            row.message_id,
            row.message_seq,
            row.client_msg_no,
            row.header,
            row.setting,
            row.signal,
            row.from_uid,
            row.channel_id,
            row.channel_type,
            row.expire,
            row.expire_at,
            row.timestamp,
            row.payload,
            row.is_deleted,
        ],
    )?;
    Ok(n)
}

fn query_message(conn: &Connection, table: &str, message_id: &str) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT message_id, message_seq, client_msg_no, header, setting, signal, from_uid,
                channel_id, channel_type, expire, expire_at, timestamp, payload, is_deleted
         FROM {} WHERE message_id = ?1",
        table
    ))?;

    stmt.query_row([message_id], |row| {
        Ok(MessageRow {
            message_id: row.get(0)?,
            message_seq: row.get(1)?,
            client_msg_no: row.get(2)?,
            header: row.get(3)?,
            setting: row.get(4)?,
            signal: row.get(5)?,
            from_uid: row.get(6)?,
            channel_id: row.get(7)?,
            channel_type: row.get(8)?,
            expire: row.get(9)?,
            expire_at: row.get(10)?,
            timestamp: row.get(11)?,
            payload: row.get(12)?,
            is_deleted: row.get(13)?,
        })
    })
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_types::models::MessageHeader;

    fn person_message(id: i64, from: &str, to: &str) -> Message {
        Message {
            message_id: id,
            message_seq: 1,
            from_uid: from.into(),
            channel_id: to.into(),
            channel_type: ChannelType::PERSON,
            timestamp: 1_700_000_000,
            payload: br#"{"type":1,"content":"hi"}"#.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn person_channel_id_is_symmetric() {
        assert_eq!(person_channel_id("alice", "bob"), person_channel_id("bob", "alice"));
        let id = person_channel_id("alice", "bob");
        assert!(id == "alice@bob" || id == "bob@alice");
    }

    #[test]
    fn shard_names() {
        assert_eq!(shard_table_name(0), "message");
        assert_eq!(shard_table_name(3), "message3");
        assert!(shard_index("g1", 5) < 5);
        assert_eq!(shard_index("anything", 1), 0);
    }

    #[test]
    fn replayed_batch_stores_one_row() {
        let db = Database::open_in_memory(5).unwrap();
        let batch = vec![person_message(100, "a", "b")];

        db.persist_messages(&batch).unwrap();
        db.persist_messages(&batch).unwrap();

        let channel = person_channel_id("a", "b");
        assert_eq!(db.count_messages(&channel).unwrap(), 1);
        let row = db.get_message(&channel, "100").unwrap().unwrap();
        assert_eq!(row.from_uid, "a");
        assert_eq!(row.payload, r#"{"type":1,"content":"hi"}"#);
    }

    #[test]
    fn skipped_messages_never_stored() {
        let db = Database::open_in_memory(2).unwrap();
        let mut no_persist = person_message(1, "a", "b");
        no_persist.header = MessageHeader { no_persist: 1, ..Default::default() };
        let mut sync_once = person_message(2, "a", "b");
        sync_once.header = MessageHeader { sync_once: 1, ..Default::default() };
        let kept = person_message(3, "a", "b");

        let committed = db.persist_messages(&[no_persist, sync_once, kept]).unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].message_id, 3);

        let channel = person_channel_id("a", "b");
        assert!(db.get_message(&channel, "1").unwrap().is_none());
        assert!(db.get_message(&channel, "2").unwrap().is_none());
        assert_eq!(db.count_messages(&channel).unwrap(), 1);
    }

    #[test]
    fn group_channel_id_passes_through() {
        let db = Database::open_in_memory(3).unwrap();
        let msg = Message {
            message_id: 9,
            from_uid: "a".into(),
            channel_id: "g1".into(),
            channel_type: ChannelType::GROUP,
            expire: 30,
            timestamp: 100,
            ..Default::default()
        };
        db.persist_messages(&[msg]).unwrap();
        let row = db.get_message("g1", "9").unwrap().unwrap();
        assert_eq!(row.channel_id, "g1");
        assert_eq!(row.expire_at, 130);
    }
}
