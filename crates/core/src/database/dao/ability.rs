//! 路由能力数据访问对象

use crate::models::{Ability, Channel};
use rusqlite::{params, Connection};

pub struct AbilityDao;

impl AbilityDao {
    /// 获取全部能力行
    pub fn list_all(conn: &Connection) -> Result<Vec<Ability>, rusqlite::Error> {
        let mut stmt = conn.prepare(
            "SELECT channel_group, model, channel_id, enabled, priority, weight
             FROM abilities ORDER BY channel_group, model, priority DESC, channel_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Ability {
                group: row.get(0)?,
                model: row.get(1)?,
                channel_id: row.get(2)?,
                enabled: row.get::<_, i64>(3)? != 0,
                priority: row.get(4)?,
                weight: row.get::<_, i64>(5)?.max(0) as u32,
            })
        })?;
        rows.collect()
    }

    /// 按渠道当前的分组和模型重建能力行
    pub fn rebuild_for_channel(conn: &Connection, channel: &Channel) -> Result<usize, rusqlite::Error> {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM abilities WHERE channel_id = ?1",
            params![channel.id],
        )?;
        let abilities = channel.abilities();
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO abilities (channel_group, model, channel_id, enabled, priority, weight)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for ability in &abilities {
                stmt.execute(params![
                    ability.group,
                    ability.model,
                    ability.channel_id,
                    ability.enabled as i64,
                    ability.priority,
                    ability.weight as i64,
                ])?;
            }
        }
        tx.commit()?;
        Ok(abilities.len())
    }

    /// 同步渠道下所有能力行的启用状态
    pub fn update_enabled_for_channel(
        conn: &Connection,
        channel_id: i64,
        enabled: bool,
    ) -> Result<usize, rusqlite::Error> {
        conn.execute(
            "UPDATE abilities SET enabled = ?1 WHERE channel_id = ?2",
            params![enabled as i64, channel_id],
        )
    }

    pub fn delete_for_channel(conn: &Connection, channel_id: i64) -> Result<(), rusqlite::Error> {
        conn.execute(
            "DELETE FROM abilities WHERE channel_id = ?1",
            params![channel_id],
        )?;
        Ok(())
    }
}
