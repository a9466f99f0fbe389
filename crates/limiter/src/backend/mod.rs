//! 限流状态存储后端
//!
//! - `redis_store`: 分布式实现，每种策略一个 Lua 脚本
//! - `memory`: 进程内实现，每个键一把锁

pub mod memory;
pub mod redis_store;

use crate::error::LimiterResult;
use crate::key::LimiterKey;
use crate::strategy::LimitStrategy;
use async_trait::async_trait;

pub use memory::MemoryLimiterBackend;
pub use redis_store::RedisLimiterBackend;

/// 单次限流判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// 判定后剩余的额度（窗口剩余次数或桶内令牌数）
    pub remaining: u64,
}

impl Decision {
    pub fn allowed(remaining: u64) -> Self {
        Self {
            allowed: true,
            remaining,
        }
    }

    pub fn denied(remaining: u64) -> Self {
        Self {
            allowed: false,
            remaining,
        }
    }
}

/// 限流后端
///
/// `acquire` 的检查与扣减必须是一个不可分割的操作。
#[async_trait]
pub trait LimiterBackend: Send + Sync {
    /// 尝试为 `key` 获取 `n` 个配额
    async fn acquire(
        &self,
        key: &LimiterKey,
        strategy: &LimitStrategy,
        n: u32,
    ) -> LimiterResult<Decision>;

    /// 清理空闲状态，返回清理数量
    async fn sweep(&self) -> usize {
        0
    }

    fn name(&self) -> &'static str;
}
