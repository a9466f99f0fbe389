//! 表结构定义

use rusqlite::Connection;

/// 创建所有表（幂等）
pub fn create_tables(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS channels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            key TEXT NOT NULL DEFAULT '',
            base_url TEXT,
            status INTEGER NOT NULL DEFAULT 1,
            weight INTEGER NOT NULL DEFAULT 1,
            priority INTEGER NOT NULL DEFAULT 0,
            channel_group TEXT NOT NULL DEFAULT 'default',
            models TEXT NOT NULL DEFAULT '',
            proxy TEXT,
            used_quota INTEGER NOT NULL DEFAULT 0,
            auto_ban INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS abilities (
            channel_group TEXT NOT NULL,
            model TEXT NOT NULL,
            channel_id INTEGER NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            priority INTEGER NOT NULL DEFAULT 0,
            weight INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (channel_group, model, channel_id)
        );
        CREATE INDEX IF NOT EXISTS idx_abilities_channel ON abilities(channel_id);

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            user_group TEXT NOT NULL DEFAULT 'default',
            quota INTEGER NOT NULL DEFAULT 0,
            used_quota INTEGER NOT NULL DEFAULT 0,
            request_count INTEGER NOT NULL DEFAULT 0,
            status INTEGER NOT NULL DEFAULT 1,
            email TEXT
        );

        CREATE TABLE IF NOT EXISTS tokens (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            key TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL DEFAULT '',
            status INTEGER NOT NULL DEFAULT 1,
            remain_quota INTEGER NOT NULL DEFAULT 0,
            unlimited_quota INTEGER NOT NULL DEFAULT 0,
            used_quota INTEGER NOT NULL DEFAULT 0,
            expired_time INTEGER NOT NULL DEFAULT -1
        );
        CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);

        CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            token_id INTEGER NOT NULL,
            channel_id INTEGER NOT NULL,
            model TEXT NOT NULL,
            prompt_tokens INTEGER NOT NULL DEFAULT 0,
            completion_tokens INTEGER NOT NULL DEFAULT 0,
            quota INTEGER NOT NULL DEFAULT 0,
            request_id TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_logs_user ON logs(user_id);",
    )
}
