//! 共享缓存
//!
//! 热路径上的令牌、用户查询以及用户余额镜像都经由 [`SharedCache`]。
//! 分布式缓存是可选的，调用方持有 `Option<Arc<dyn SharedCache>>`，
//! 为 `None` 时直接读写数据库。
//!
//! ## 模块结构
//! - `memory`: 进程内实现（单副本部署和测试）
//! - `redis_cache`: Redis 实现，复合操作使用 Lua 脚本保证原子性
//! - `aside`: 旁路缓存 `get_or_set`
//! - `account`: 令牌/用户查询

pub mod account;
pub mod aside;
pub mod memory;
pub mod redis_cache;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use account::AccountLookup;
pub use aside::get_or_set;
pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

/// 缓存错误
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("缓存后端错误: {0}")]
    Backend(String),

    #[error("缓存值序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("缓存值不是整数: {0}")]
    NotInteger(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Backend(e.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// 条件扣减的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrOutcome {
    /// 缓存中没有该键
    Missing,
    /// 余额不足，未扣减
    Insufficient { balance: i64 },
    /// 已扣减，`before` 为扣减前的余额
    Applied { before: i64 },
}

/// 共享缓存接口
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// 原子地检查并扣减整数值
    async fn decr_if_sufficient(&self, key: &str, amount: i64) -> CacheResult<DecrOutcome>;

    /// 键存在时原子地增加整数值，返回增加后的值
    async fn incr_if_present(&self, key: &str, delta: i64) -> CacheResult<Option<i64>>;

    /// 后端名称，用于日志
    fn backend_name(&self) -> &'static str;
}

/// 共享缓存句柄
pub type SharedCacheRef = Arc<dyn SharedCache>;
