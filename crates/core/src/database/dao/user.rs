//! 用户数据访问对象

use crate::models::{User, UserStatus};
use rusqlite::{params, Connection, OptionalExtension};

pub struct UserDao;

impl UserDao {
    /// 插入用户，返回用户 ID
    pub fn insert(conn: &Connection, user: &User) -> Result<i64, rusqlite::Error> {
        let id = if user.id > 0 { Some(user.id) } else { None };
        conn.execute(
            "INSERT INTO users (id, username, user_group, quota, used_quota, request_count, status, email)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                user.username,
                user.group,
                user.quota,
                user.used_quota,
                user.request_count,
                user.status.as_i64(),
                user.email,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<User>, rusqlite::Error> {
        conn.query_row(
            "SELECT id, username, user_group, quota, used_quota, request_count, status, email
             FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    group: row.get(2)?,
                    quota: row.get(3)?,
                    used_quota: row.get(4)?,
                    request_count: row.get(5)?,
                    status: UserStatus::from_i64(row.get(6)?),
                    email: row.get(7)?,
                })
            },
        )
        .optional()
    }

    /// 获取用户剩余额度
    pub fn get_quota(conn: &Connection, id: i64) -> Result<Option<i64>, rusqlite::Error> {
        conn.query_row(
            "SELECT quota FROM users WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
    }

    pub fn get_group(conn: &Connection, id: i64) -> Result<Option<String>, rusqlite::Error> {
        conn.query_row(
            "SELECT user_group FROM users WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
    }

    pub fn is_enabled(conn: &Connection, id: i64) -> Result<Option<bool>, rusqlite::Error> {
        conn.query_row(
            "SELECT status FROM users WHERE id = ?1",
            params![id],
            |row| Ok(UserStatus::from_i64(row.get(0)?) == UserStatus::Enabled),
        )
        .optional()
    }

    /// 增减用户额度（delta 可为负）
    pub fn increase_quota(conn: &Connection, id: i64, delta: i64) -> Result<(), rusqlite::Error> {
        conn.execute(
            "UPDATE users SET quota = quota + ?1 WHERE id = ?2",
            params![delta, id],
        )?;
        Ok(())
    }

    /// 余额充足时扣减，返回是否扣减成功
    pub fn decrease_quota_if_sufficient(
        conn: &Connection,
        id: i64,
        amount: i64,
    ) -> Result<bool, rusqlite::Error> {
        let affected = conn.execute(
            "UPDATE users SET quota = quota - ?1 WHERE id = ?2 AND quota >= ?1",
            params![amount, id],
        )?;
        Ok(affected > 0)
    }

    pub fn add_used_quota(conn: &Connection, id: i64, delta: i64) -> Result<(), rusqlite::Error> {
        conn.execute(
            "UPDATE users SET used_quota = used_quota + ?1 WHERE id = ?2",
            params![delta, id],
        )?;
        Ok(())
    }

    pub fn add_request_count(conn: &Connection, id: i64, count: i64) -> Result<(), rusqlite::Error> {
        conn.execute(
            "UPDATE users SET request_count = request_count + ?1 WHERE id = ?2",
            params![count, id],
        )?;
        Ok(())
    }
}
