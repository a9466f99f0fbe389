//! 准入步骤模块
//!
//! 按顺序执行：认证 → 限流 → 路由 → 额度预扣

mod auth;
mod quota;
mod rate_limit;
mod routing;
mod traits;

pub use auth::AuthStep;
pub use quota::QuotaStep;
pub use rate_limit::RateLimitStep;
pub use routing::RoutingStep;
pub use traits::{AdmissionStep, RelayError};
