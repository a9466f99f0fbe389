//! 消费记录数据访问对象

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

/// 单次请求的消费记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumeLog {
    pub id: i64,
    pub created_at: String,
    pub user_id: i64,
    pub token_id: i64,
    pub channel_id: i64,
    pub model: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub quota: i64,
    pub request_id: Option<String>,
}

pub struct LogDao;

impl LogDao {
    /// 写入消费记录，返回记录 ID
    pub fn insert(conn: &Connection, log: &ConsumeLog) -> Result<i64, rusqlite::Error> {
        conn.execute(
            "INSERT INTO logs (created_at, user_id, token_id, channel_id, model, prompt_tokens, completion_tokens, quota, request_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                log.created_at,
                log.user_id,
                log.token_id,
                log.channel_id,
                log.model,
                log.prompt_tokens,
                log.completion_tokens,
                log.quota,
                log.request_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 获取用户最近的消费记录
    pub fn list_by_user(
        conn: &Connection,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<ConsumeLog>, rusqlite::Error> {
        let mut stmt = conn.prepare(
            "SELECT id, created_at, user_id, token_id, channel_id, model, prompt_tokens, completion_tokens, quota, request_id
             FROM logs WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            Ok(ConsumeLog {
                id: row.get(0)?,
                created_at: row.get(1)?,
                user_id: row.get(2)?,
                token_id: row.get(3)?,
                channel_id: row.get(4)?,
                model: row.get(5)?,
                prompt_tokens: row.get(6)?,
                completion_tokens: row.get(7)?,
                quota: row.get(8)?,
                request_id: row.get(9)?,
            })
        })?;
        rows.collect()
    }
}
