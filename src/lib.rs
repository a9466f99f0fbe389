//! Relaycast - LLM API 网关的准入与路由核心
//!
//! ## Workspace 结构
//!
//! - relaycast-core: 模型、配置、数据库、共享缓存、批量更新
//! - relaycast-limiter: 请求限流
//! - relaycast-balancer: 渠道选择与冷却
//! - relaycast-quota: 额度预扣与结算
//! - relaycast-processor: 准入流水线
//! - 主 crate 负责配置加载、日志初始化和组件装配

pub mod app;
pub mod config;
pub mod logger;

pub use app::{BackgroundTasks, GatewayState};
pub use config::{config_path, load_config, load_config_from, save_config};
pub use logger::init_tracing;

pub use relaycast_core::{Config, GatewayError, GatewayErrorCode};
pub use relaycast_processor::{Admission, RelayError, RelayProcessor, RelayRequest};
pub use relaycast_quota::Usage;
