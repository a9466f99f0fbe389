//! 令牌数据访问对象

use crate::models::{Token, TokenStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};

const TOKEN_COLUMNS: &str =
    "id, user_id, key, name, status, remain_quota, unlimited_quota, used_quota, expired_time";

fn map_token(row: &Row<'_>) -> Result<Token, rusqlite::Error> {
    Ok(Token {
        id: row.get(0)?,
        user_id: row.get(1)?,
        key: row.get(2)?,
        name: row.get(3)?,
        status: TokenStatus::from_i64(row.get(4)?),
        remain_quota: row.get(5)?,
        unlimited_quota: row.get::<_, i64>(6)? != 0,
        used_quota: row.get(7)?,
        expired_time: row.get(8)?,
    })
}

pub struct TokenDao;

impl TokenDao {
    /// 插入令牌，返回令牌 ID
    pub fn insert(conn: &Connection, token: &Token) -> Result<i64, rusqlite::Error> {
        let id = if token.id > 0 { Some(token.id) } else { None };
        conn.execute(
            "INSERT INTO tokens (id, user_id, key, name, status, remain_quota, unlimited_quota, used_quota, expired_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                token.user_id,
                token.key,
                token.name,
                token.status.as_i64(),
                token.remain_quota,
                token.unlimited_quota as i64,
                token.used_quota,
                token.expired_time,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_by_key(conn: &Connection, key: &str) -> Result<Option<Token>, rusqlite::Error> {
        conn.query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE key = ?1"),
            params![key],
            map_token,
        )
        .optional()
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Token>, rusqlite::Error> {
        conn.query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE id = ?1"),
            params![id],
            map_token,
        )
        .optional()
    }

    /// 剩余额度充足时预扣，返回是否扣减成功
    pub fn decrease_remain_if_sufficient(
        conn: &Connection,
        id: i64,
        amount: i64,
    ) -> Result<bool, rusqlite::Error> {
        let affected = conn.execute(
            "UPDATE tokens SET remain_quota = remain_quota - ?1, used_quota = used_quota + ?1
             WHERE id = ?2 AND remain_quota >= ?1",
            params![amount, id],
        )?;
        Ok(affected > 0)
    }

    /// 增加剩余额度并同步减少已用额度（delta 为负表示继续扣费）
    pub fn increase_remain_quota(conn: &Connection, id: i64, delta: i64) -> Result<(), rusqlite::Error> {
        conn.execute(
            "UPDATE tokens SET remain_quota = remain_quota + ?1, used_quota = used_quota - ?1 WHERE id = ?2",
            params![delta, id],
        )?;
        Ok(())
    }

    pub fn update_status(conn: &Connection, id: i64, status: TokenStatus) -> Result<(), rusqlite::Error> {
        conn.execute(
            "UPDATE tokens SET status = ?1 WHERE id = ?2",
            params![status.as_i64(), id],
        )?;
        Ok(())
    }
}
