//! 路由数据源

use relaycast_core::database::dao::{AbilityDao, ChannelDao};
use relaycast_core::database::{lock_db, DbConnection};
use relaycast_core::models::{Ability, Channel};

/// 路由表的数据来源
pub trait RoutingSource: Send + Sync {
    /// 一次性读取全部渠道和能力行
    fn load(&self) -> Result<(Vec<Channel>, Vec<Ability>), String>;
}

/// 从 SQLite 读取
#[derive(Clone)]
pub struct SqliteRoutingSource {
    db: DbConnection,
}

impl SqliteRoutingSource {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }
}

impl RoutingSource for SqliteRoutingSource {
    fn load(&self) -> Result<(Vec<Channel>, Vec<Ability>), String> {
        let conn = lock_db(&self.db)?;
        let channels = ChannelDao::list_all(&conn).map_err(|e| format!("读取渠道失败: {e}"))?;
        let abilities = AbilityDao::list_all(&conn).map_err(|e| format!("读取路由能力失败: {e}"))?;
        Ok((channels, abilities))
    }
}

/// 固定数据源，用于测试和静态部署
impl RoutingSource for (Vec<Channel>, Vec<Ability>) {
    fn load(&self) -> Result<(Vec<Channel>, Vec<Ability>), String> {
        Ok(self.clone())
    }
}
