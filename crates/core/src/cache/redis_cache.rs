//! Redis 共享缓存
//!
//! 所有键都带有配置的前缀。条件扣减和条件累加用 Lua 脚本实现，
//! 多副本下也是单个原子操作。

use super::{CacheResult, DecrOutcome, SharedCache};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::time::Duration;
use tracing::{debug, error};

static DECR_IF_SUFFICIENT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local v = redis.call('GET', KEYS[1])
if not v then
    return {0, 0}
end
local balance = tonumber(v)
local amount = tonumber(ARGV[1])
if balance < amount then
    return {1, balance}
end
redis.call('DECRBY', KEYS[1], amount)
return {2, balance}
"#,
    )
});

static INCR_IF_PRESENT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return {1, redis.call('INCRBY', KEYS[1], ARGV[1])}
end
return {0, 0}
"#,
    )
});

pub struct RedisCache {
    connection_manager: ConnectionManager,
    key_prefix: String,
}

impl RedisCache {
    /// 连接 Redis 并用 PING 验证连通性
    pub async fn connect(url: &str, key_prefix: &str) -> CacheResult<Self> {
        let client = Client::open(url).map_err(|e| {
            error!("[CACHE] 创建 Redis 客户端失败: {}", e);
            e
        })?;
        let connection_manager = ConnectionManager::new(client).await?;

        let mut conn = connection_manager.clone();
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!("[CACHE] 已连接 Redis: {}", url);

        Ok(Self {
            connection_manager,
            key_prefix: key_prefix.to_string(),
        })
    }

    /// 连接句柄，可供其他组件复用同一个连接管理器
    pub fn connection(&self) -> ConnectionManager {
        self.connection_manager.clone()
    }

    fn full_key(&self, key: &str) -> String {
        format_key(&self.key_prefix, key)
    }
}

/// 为键加上部署前缀，前缀为空时原样返回
pub fn format_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}:{key}")
    }
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection_manager.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(self.full_key(key))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection_manager.clone();
        let _: () = redis::cmd("SET")
            .arg(self.full_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection_manager.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(self.full_key(key))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn decr_if_sufficient(&self, key: &str, amount: i64) -> CacheResult<DecrOutcome> {
        let mut conn = self.connection_manager.clone();
        let (status, value): (i64, i64) = DECR_IF_SUFFICIENT
            .key(self.full_key(key))
            .arg(amount)
            .invoke_async(&mut conn)
            .await?;
        Ok(match status {
            0 => DecrOutcome::Missing,
            1 => DecrOutcome::Insufficient { balance: value },
            _ => DecrOutcome::Applied { before: value },
        })
    }

    async fn incr_if_present(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let mut conn = self.connection_manager.clone();
        let (present, value): (i64, i64) = INCR_IF_PRESENT
            .key(self.full_key(key))
            .arg(delta)
            .invoke_async(&mut conn)
            .await?;
        Ok((present == 1).then_some(value))
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
