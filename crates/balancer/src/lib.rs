//! 渠道选择
//!
//! 内存路由表：分组 → 模型 → 按优先级排列的渠道层级。
//! 选择时逐层尝试，层内按权重随机抽取，跳过禁用、冷却中和被过滤的渠道。
//!
//! ## 模块结构
//! - `snapshot`: 路由表快照及其构建
//! - `chooser`: 选择器（选择、重载、禁用/启用）
//! - `cooldown`: (渠道, 模型) 冷却登记
//! - `filter`: 调用方过滤条件
//! - `failure`: 上游错误分类
//! - `source`: 路由数据源
//! - `tasks`: 后台清理与同步任务

pub mod chooser;
pub mod cooldown;
pub mod error;
pub mod failure;
pub mod filter;
pub mod snapshot;
pub mod source;
pub mod tasks;

pub use chooser::{ChannelChooser, LoadStats};
pub use cooldown::CooldownRegistry;
pub use error::{BalancerError, BalancerResult};
pub use failure::UpstreamFailure;
pub use filter::{ChannelFilter, ExcludeChannels};
pub use snapshot::{ChannelChoice, RoutingSnapshot, Tier};
pub use source::{RoutingSource, SqliteRoutingSource};
pub use tasks::{spawn_cooldown_sweep_task, spawn_sync_task};
