//! 网关运行时
//!
//! - `state` - 组件装配（数据库、缓存、限流、路由、额度、准入处理器）
//! - `tasks` - 后台任务的启动与关闭

mod state;
mod tasks;

pub use state::GatewayState;
pub use tasks::BackgroundTasks;
