//! 请求限流
//!
//! 按 (资源, 身份) 维度限制请求速率：
//! - 每分钟请求数不超过阈值时使用固定窗口计数
//! - 超过阈值时使用令牌桶（速率 = rpm / 60 每秒，容量 = 速率 × 倍数）
//! - 需要跨窗口边界精确整形时可以使用滑动窗口
//!
//! 状态存放在 Redis（Lua 脚本保证检查与扣减是一个原子操作），
//! 没有 Redis 时退化为进程内实现。后端出错一律拒绝请求。

pub mod backend;
pub mod error;
pub mod key;
pub mod limiter;
pub mod strategy;

pub use backend::{Decision, LimiterBackend, MemoryLimiterBackend, RedisLimiterBackend};
pub use error::{LimiterError, LimiterResult};
pub use key::LimiterKey;
pub use limiter::{spawn_sweep_task, RateLimiter};
pub use strategy::LimitStrategy;
