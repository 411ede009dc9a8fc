use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use crate::messages::shard_table_name;

pub fn run(conn: &Connection, message_table_count: u32) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (presence and directory schema)");
        conn.execute_batch(
            "
            CREATE TABLE user_online (
                uid           TEXT NOT NULL,
                device_flag   INTEGER NOT NULL DEFAULT 0,
                last_online   INTEGER NOT NULL DEFAULT 0,
                last_offline  INTEGER NOT NULL DEFAULT 0,
                online        INTEGER NOT NULL DEFAULT 0,
                version       INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at    TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (uid, device_flag)
            );

            CREATE INDEX idx_user_online_online ON user_online(online, last_online);

            CREATE TABLE device_flags (
                device_flag  INTEGER PRIMARY KEY,
                weight       INTEGER NOT NULL DEFAULT 0,
                remark       TEXT NOT NULL DEFAULT ''
            );

            INSERT INTO device_flags (device_flag, weight, remark) VALUES (0, 90, 'app');
            INSERT INTO device_flags (device_flag, weight, remark) VALUES (1, 70, 'web');
            INSERT INTO device_flags (device_flag, weight, remark) VALUES (2, 80, 'pc');

            CREATE TABLE users (
                uid              TEXT PRIMARY KEY,
                name             TEXT NOT NULL DEFAULT '',
                new_msg_notice   INTEGER NOT NULL DEFAULT 1,
                msg_show_detail  INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE friends (
                uid     TEXT NOT NULL,
                to_uid  TEXT NOT NULL,
                remark  TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (uid, to_uid)
            );

            CREATE TABLE chat_groups (
                group_no  TEXT PRIMARY KEY,
                name      TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE group_members (
                group_no    TEXT NOT NULL,
                uid         TEXT NOT NULL,
                remark      TEXT NOT NULL DEFAULT '',
                is_deleted  INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (group_no, uid)
            );

            CREATE TABLE user_settings (
                uid     TEXT NOT NULL,
                to_uid  TEXT NOT NULL,
                mute    INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (uid, to_uid)
            );

            CREATE TABLE group_settings (
                group_no  TEXT NOT NULL,
                uid       TEXT NOT NULL,
                mute      INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (group_no, uid)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    // Shard count is deployment config, so shard tables are ensured on every start.
    for index in 0..message_table_count {
        let table = shard_table_name(index);
        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {table} (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id     TEXT NOT NULL UNIQUE,
                message_seq    INTEGER NOT NULL DEFAULT 0,
                client_msg_no  TEXT NOT NULL DEFAULT '',
                header         TEXT NOT NULL DEFAULT '',
                setting        INTEGER NOT NULL DEFAULT 0,
                signal         INTEGER NOT NULL DEFAULT 0,
                from_uid       TEXT NOT NULL DEFAULT '',
                channel_id     TEXT NOT NULL DEFAULT '',
                channel_type   INTEGER NOT NULL DEFAULT 0,
                expire         INTEGER NOT NULL DEFAULT 0,
                expire_at      INTEGER NOT NULL DEFAULT 0,
                timestamp      INTEGER NOT NULL DEFAULT 0,
                payload        TEXT NOT NULL DEFAULT '',
                is_deleted     INTEGER NOT NULL DEFAULT 0,
                created_at     TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_channel
                ON {table}(channel_id, channel_type, message_seq);
            "
        ))?;
    }

    info!("Database migrations complete ({} message tables)", message_table_count);
    Ok(())
}
