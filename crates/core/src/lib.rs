//! 核心类型和工具模块
//!
//! 包含 models, config, database, cache, batch, errors, logger 等基础功能，
//! 供限流、选路、额度和准入流水线各 crate 共享。

pub mod batch;
pub mod cache;
pub mod config;
pub mod database;
pub mod errors;
pub mod logger;
pub mod models;

pub use batch::{BatchAggregator, BatchUpdateType, FlushStats};
pub use cache::{AccountLookup, CacheError, DecrOutcome, MemoryCache, RedisCache, SharedCache, SharedCacheRef};
pub use config::{Config, ConfigError};
pub use database::{lock_db, open_database, DbConnection};
pub use errors::{GatewayError, GatewayErrorCode};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 当前 unix 时间（秒）
pub fn now_unix_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
