use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;

use beacon_types::directory::{GroupDirectory, MuteSetting, UserDirectory, UserNotice};

use crate::models::ThirdName;
use crate::{Database, OptionalExt, placeholders};

impl Database {
    // -- Users --

    pub fn upsert_user(&self, uid: &str, name: &str, new_msg_notice: bool, show_detail: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (uid, name, new_msg_notice, msg_show_detail) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(uid) DO UPDATE SET
                     name = excluded.name,
                     new_msg_notice = excluded.new_msg_notice,
                     msg_show_detail = excluded.msg_show_detail",
                rusqlite::params![uid, name, new_msg_notice, show_detail],
            )?;
            Ok(())
        })
    }

    pub fn get_users(&self, uids: &[String]) -> Result<Vec<UserNotice>> {
        if uids.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT uid, name, new_msg_notice, msg_show_detail FROM users WHERE uid IN ({})",
                placeholders(1, uids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(uids.iter()), |row| {
                    Ok(UserNotice {
                        uid: row.get(0)?,
                        name: row.get(1)?,
                        new_msg_notice: row.get(2)?,
                        show_detail: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Friends --

    pub fn add_friend(&self, uid: &str, to_uid: &str, remark: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO friends (uid, to_uid, remark) VALUES (?1, ?2, ?3)
                 ON CONFLICT(uid, to_uid) DO UPDATE SET remark = excluded.remark",
                rusqlite::params![uid, to_uid, remark],
            )?;
            Ok(())
        })
    }

    pub fn friend_uids(&self, uid: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT to_uid FROM friends WHERE uid = ?1 ORDER BY to_uid")?;
            let rows = stmt
                .query_map([uid], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    // -- Groups --

    pub fn upsert_group(&self, group_no: &str, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_groups (group_no, name) VALUES (?1, ?2)
                 ON CONFLICT(group_no) DO UPDATE SET name = excluded.name",
                rusqlite::params![group_no, name],
            )?;
            Ok(())
        })
    }

    pub fn add_group_member(&self, group_no: &str, uid: &str, remark: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO group_members (group_no, uid, remark, is_deleted) VALUES (?1, ?2, ?3, 0)
                 ON CONFLICT(group_no, uid) DO UPDATE SET remark = excluded.remark, is_deleted = 0",
                rusqlite::params![group_no, uid, remark],
            )?;
            Ok(())
        })
    }

    pub fn group_name(&self, group_no: &str) -> Result<String> {
        self.with_conn(|conn| {
            let name: Option<String> = conn
                .query_row("SELECT name FROM chat_groups WHERE group_no = ?1", [group_no], |r| r.get(0))
                .optional()?;
            Ok(name.unwrap_or_default())
        })
    }

    // -- Mute settings --

    pub fn set_peer_mute(&self, uid: &str, to_uid: &str, mute: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_settings (uid, to_uid, mute) VALUES (?1, ?2, ?3)
                 ON CONFLICT(uid, to_uid) DO UPDATE SET mute = excluded.mute",
                rusqlite::params![uid, to_uid, mute],
            )?;
            Ok(())
        })
    }

    pub fn set_group_mute(&self, group_no: &str, uid: &str, mute: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO group_settings (group_no, uid, mute) VALUES (?1, ?2, ?3)
                 ON CONFLICT(group_no, uid) DO UPDATE SET mute = excluded.mute",
                rusqlite::params![group_no, uid, mute],
            )?;
            Ok(())
        })
    }

    /// Mute flags each of `uids` holds toward `peer_uid`.
    pub fn peer_settings(&self, uids: &[String], peer_uid: &str) -> Result<Vec<MuteSetting>> {
        if uids.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT uid, mute FROM user_settings WHERE to_uid = ?1 AND uid IN ({})",
                placeholders(2, uids.len())
            );
            query_mutes(conn, &sql, peer_uid, uids)
        })
    }

    pub fn group_settings(&self, group_no: &str, uids: &[String]) -> Result<Vec<MuteSetting>> {
        if uids.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT uid, mute FROM group_settings WHERE group_no = ?1 AND uid IN ({})",
                placeholders(2, uids.len())
            );
            query_mutes(conn, &sql, group_no, uids)
        })
    }

    // -- Display names --

    /// Sender's profile name, the recipient's remark for the sender, and the
    /// sender's nickname inside `group_no` when given.
    pub fn third_name(&self, from_uid: &str, to_uid: &str, group_no: Option<&str>) -> Result<ThirdName> {
        if from_uid.is_empty() {
            return Ok(ThirdName::default());
        }
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT users.name,
                            IFNULL(friends.remark, ''),
                            IFNULL(group_members.remark, '')
                     FROM users
                     LEFT JOIN friends
                            ON friends.uid = ?2 AND friends.to_uid = users.uid
                     LEFT JOIN group_members
                            ON group_members.group_no = ?3
                           AND group_members.uid = users.uid
                           AND group_members.is_deleted = 0
                     WHERE users.uid = ?1",
                    rusqlite::params![from_uid, to_uid, group_no.unwrap_or("")],
                    |row| {
                        Ok(ThirdName {
                            name: row.get(0)?,
                            remark: row.get(1)?,
                            name_in_group: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(found.unwrap_or_default())
        })
    }
}

fn query_mutes(conn: &Connection, sql: &str, key: &str, uids: &[String]) -> Result<Vec<MuteSetting>> {
    let mut params: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(uids.len() + 1);
    params.push(&key);
    params.extend(uids.iter().map(|u| u as &dyn rusqlite::types::ToSql));

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params.as_slice(), |row| {
            Ok(MuteSetting {
                uid: row.get(0)?,
                mute: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// SQLite-backed user and group directories. Queries run on the blocking pool.
#[derive(Clone)]
pub struct SqlDirectory {
    db: Arc<Database>,
}

impl SqlDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Runs a query against the database on the blocking pool.
    pub async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?
    }
}

#[async_trait]
impl UserDirectory for SqlDirectory {
    async fn get_users(&self, uids: &[String]) -> Result<Vec<UserNotice>> {
        let uids = uids.to_vec();
        self.blocking(move |db| db.get_users(&uids)).await
    }

    async fn peer_settings(&self, uids: &[String], peer_uid: &str) -> Result<Vec<MuteSetting>> {
        let uids = uids.to_vec();
        let peer = peer_uid.to_string();
        self.blocking(move |db| db.peer_settings(&uids, &peer)).await
    }

    async fn friend_uids(&self, uid: &str) -> Result<Vec<String>> {
        let uid = uid.to_string();
        self.blocking(move |db| db.friend_uids(&uid)).await
    }
}

#[async_trait]
impl GroupDirectory for SqlDirectory {
    async fn settings_with_uids(&self, group_no: &str, uids: &[String]) -> Result<Vec<MuteSetting>> {
        let group_no = group_no.to_string();
        let uids = uids.to_vec();
        self.blocking(move |db| db.group_settings(&group_no, &uids)).await
    }
}
