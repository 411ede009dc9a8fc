use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{Connection, Row};

use crate::models::{DeviceWeightRow, PresenceRow, PresenceWrite, WeightedPresenceRow};
use crate::{Database, OptionalExt, placeholders};

const PRESENCE_COLUMNS: &str =
    "user_online.uid, user_online.device_flag, user_online.last_online, user_online.last_offline, user_online.online, user_online.version";

impl Database {
    // -- Writes --

    /// Applies a batch of transitions in one transaction. A write carrying an
    /// older version than the stored row is a no-op.
    pub fn apply_presence(&self, writes: &[PresenceWrite]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for w in writes {
                upsert_presence(&tx, w)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    // -- Reads --

    pub fn get_presence(&self, uid: &str, device_flag: u8) -> Result<Option<PresenceRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM user_online WHERE uid = ?1 AND device_flag = ?2",
                    PRESENCE_COLUMNS
                ),
                rusqlite::params![uid, device_flag],
                presence_from_row,
            )
            .optional()
        })
    }

    /// Rows still marked online whose last online transition is older than
    /// `older_than_secs` relative to `now`.
    pub fn query_stale_onlines(&self, now: i64, older_than_secs: i64, limit: u32) -> Result<Vec<PresenceRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM user_online
                 WHERE online = 1 AND ?1 - last_online > ?2
                 ORDER BY last_online ASC
                 LIMIT ?3",
                PRESENCE_COLUMNS
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![now, older_than_secs, limit], presence_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Highest-weight online device of a user.
    pub fn query_max_weight_online(&self, uid: &str) -> Result<Option<PresenceRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM user_online
                     LEFT JOIN device_flags ON user_online.device_flag = device_flags.device_flag
                     WHERE user_online.uid = ?1 AND user_online.online = 1
                     ORDER BY IFNULL(device_flags.weight, 0) DESC
                     LIMIT 1",
                    PRESENCE_COLUMNS
                ),
                [uid],
                presence_from_row,
            )
            .optional()
        })
    }

    /// Most relevant device of a user: any online one first, then the most
    /// recently disconnected.
    pub fn query_last_device(&self, uid: &str) -> Result<Option<PresenceRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM user_online
                     WHERE uid = ?1
                     ORDER BY online = 1 DESC, last_offline DESC
                     LIMIT 1",
                    PRESENCE_COLUMNS
                ),
                [uid],
                presence_from_row,
            )
            .optional()
        })
    }

    /// One row per uid: online beats offline, higher weight among onlines,
    /// more recent `last_offline` among offlines.
    ///
    /// With `within_secs`, offline rows older than that window are ignored.
    pub fn query_last_statuses(
        &self,
        uids: &[String],
        now: i64,
        within_secs: Option<i64>,
    ) -> Result<Vec<WeightedPresenceRow>> {
        if uids.is_empty() {
            return Ok(vec![]);
        }

        let rows = self.with_conn(|conn| query_weighted(conn, uids, now, within_secs))?;
        Ok(pick_last_statuses(rows))
    }

    pub fn device_online(&self, uid: &str, device_flag: u8) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM user_online WHERE uid = ?1 AND device_flag = ?2 AND online = 1",
                rusqlite::params![uid, device_flag],
                |r| r.get(0),
            )?;
            Ok(n > 0)
        })
    }

    /// Distinct users with at least one device online.
    pub fn online_count(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(DISTINCT uid) FROM user_online WHERE online = 1",
                [],
                |r| r.get(0),
            )?;
            Ok(n)
        })
    }

    // -- Device weights --

    pub fn device_weights(&self) -> Result<Vec<DeviceWeightRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT device_flag, weight, remark FROM device_flags ORDER BY device_flag")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(DeviceWeightRow {
                        device_flag: row.get(0)?,
                        weight: row.get(1)?,
                        remark: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn set_device_weight(&self, device_flag: u8, weight: i64, remark: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO device_flags (device_flag, weight, remark) VALUES (?1, ?2, ?3)
                 ON CONFLICT(device_flag) DO UPDATE SET weight = excluded.weight, remark = excluded.remark",
                rusqlite::params![device_flag, weight, remark],
            )?;
            Ok(())
        })
    }
}

fn upsert_presence(conn: &Connection, w: &PresenceWrite) -> Result<()> {
    let sql = if w.online {
        "INSERT INTO user_online (uid, device_flag, last_online, online, version, updated_at)
         VALUES (?1, ?2, ?3, 1, ?4, datetime('now'))
         ON CONFLICT(uid, device_flag) DO UPDATE SET
             last_online = excluded.last_online,
             online = 1,
             version = excluded.version,
             updated_at = excluded.updated_at
         WHERE excluded.version >= user_online.version"
    } else {
        "INSERT INTO user_online (uid, device_flag, last_offline, online, version, updated_at)
         VALUES (?1, ?2, ?3, 0, ?4, datetime('now'))
         ON CONFLICT(uid, device_flag) DO UPDATE SET
             last_offline = excluded.last_offline,
             online = 0,
             version = excluded.version,
             updated_at = excluded.updated_at
         WHERE excluded.version >= user_online.version"
    };
    conn.execute(sql, rusqlite::params![w.uid, w.device_flag, w.at, w.version])?;
    Ok(())
}

fn presence_from_row(row: &Row<'_>) -> rusqlite::Result<PresenceRow> {
    Ok(PresenceRow {
        uid: row.get(0)?,
        device_flag: row.get(1)?,
        last_online: row.get(2)?,
        last_offline: row.get(3)?,
        online: row.get::<_, i64>(4)? == 1,
        version: row.get(5)?,
    })
}

fn query_weighted(
    conn: &Connection,
    uids: &[String],
    now: i64,
    within_secs: Option<i64>,
) -> Result<Vec<WeightedPresenceRow>> {
    let window = match within_secs {
        Some(_) => format!(
            " AND (?{} - user_online.last_offline < ?{} OR user_online.online = 1)",
            uids.len() + 1,
            uids.len() + 2
        ),
        None => String::new(),
    };
    let sql = format!(
        "SELECT {}, IFNULL(device_flags.weight, 0) FROM user_online
         LEFT JOIN device_flags ON user_online.device_flag = device_flags.device_flag
         WHERE user_online.uid IN ({}){}
         ORDER BY user_online.online DESC, user_online.last_offline DESC",
        PRESENCE_COLUMNS,
        placeholders(1, uids.len()),
        window
    );

    let mut params: Vec<&dyn rusqlite::types::ToSql> =
        uids.iter().map(|u| u as &dyn rusqlite::types::ToSql).collect();
    if let Some(within) = within_secs.as_ref() {
        params.push(&now);
        params.push(within);
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params.as_slice(), |row| {
            Ok(WeightedPresenceRow {
                row: presence_from_row(row)?,
                weight: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn pick_last_statuses(rows: Vec<WeightedPresenceRow>) -> Vec<WeightedPresenceRow> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, WeightedPresenceRow> = HashMap::new();

    for candidate in rows {
        match best.get(&candidate.row.uid) {
            None => {
                order.push(candidate.row.uid.clone());
                best.insert(candidate.row.uid.clone(), candidate);
            }
            Some(current) => {
                let replace = match (candidate.row.online, current.row.online) {
                    (true, false) => true,
                    (true, true) => candidate.weight > current.weight,
                    (false, false) => candidate.row.last_offline > current.row.last_offline,
                    (false, true) => false,
                };
                if replace {
                    best.insert(candidate.row.uid.clone(), candidate);
                }
            }
        }
    }

    order.into_iter().filter_map(|uid| best.remove(&uid)).collect()
}
