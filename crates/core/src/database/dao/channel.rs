//! 渠道数据访问对象

use crate::models::{Channel, ChannelStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};

const CHANNEL_COLUMNS: &str = "id, name, key, base_url, status, weight, priority, channel_group, models, proxy, used_quota, auto_ban";

fn map_channel(row: &Row<'_>) -> Result<Channel, rusqlite::Error> {
    Ok(Channel {
        id: row.get(0)?,
        name: row.get(1)?,
        key: row.get(2)?,
        base_url: row.get(3)?,
        status: ChannelStatus::from_i64(row.get(4)?),
        weight: u32::try_from(row.get::<_, i64>(5)?.max(0)).unwrap_or(u32::MAX),
        priority: row.get(6)?,
        group: row.get(7)?,
        models: row.get(8)?,
        proxy: row.get(9)?,
        used_quota: row.get(10)?,
        auto_ban: row.get::<_, i64>(11)? != 0,
    })
}

pub struct ChannelDao;

impl ChannelDao {
    /// 插入渠道，`channel.id` 为 0 时由数据库分配，返回渠道 ID
    pub fn insert(conn: &Connection, channel: &Channel) -> Result<i64, rusqlite::Error> {
        let id = if channel.id > 0 { Some(channel.id) } else { None };
        conn.execute(
            "INSERT INTO channels (id, name, key, base_url, status, weight, priority, channel_group, models, proxy, used_quota, auto_ban)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                id,
                channel.name,
                channel.key,
                channel.base_url,
                channel.status.as_i64(),
                channel.weight as i64,
                channel.priority,
                channel.group,
                channel.models,
                channel.proxy,
                channel.used_quota,
                channel.auto_ban as i64,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Channel>, rusqlite::Error> {
        conn.query_row(
            &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1"),
            params![id],
            map_channel,
        )
        .optional()
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Channel>, rusqlite::Error> {
        let mut stmt = conn.prepare(&format!("SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY id"))?;
        let rows = stmt.query_map([], map_channel)?;
        rows.collect()
    }

    /// 更新渠道状态，返回是否命中
    pub fn update_status(
        conn: &Connection,
        id: i64,
        status: ChannelStatus,
    ) -> Result<bool, rusqlite::Error> {
        let affected = conn.execute(
            "UPDATE channels SET status = ?1 WHERE id = ?2",
            params![status.as_i64(), id],
        )?;
        Ok(affected > 0)
    }

    /// 累加渠道已用额度
    pub fn add_used_quota(conn: &Connection, id: i64, delta: i64) -> Result<(), rusqlite::Error> {
        conn.execute(
            "UPDATE channels SET used_quota = used_quota + ?1 WHERE id = ?2",
            params![delta, id],
        )?;
        Ok(())
    }

    pub fn delete(conn: &Connection, id: i64) -> Result<(), rusqlite::Error> {
        conn.execute("DELETE FROM channels WHERE id = ?1", params![id])?;
        Ok(())
    }
}
