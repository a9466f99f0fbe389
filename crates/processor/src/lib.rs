//! 请求准入 crate
//!
//! 把限流、渠道选择和额度预扣串成一条准入管道，并负责请求结束后的结算、
//! 中止退款以及上游失败后的冷却和换渠道。
//!
//! ## 模块结构
//!
//! - `context` - 准入请求与上下文
//! - `steps` - 管道步骤（认证、限流、路由、额度）
//! - `processor` - 管道编排与请求生命周期

pub mod context;
pub mod processor;
pub mod steps;

#[cfg(test)]
mod test_support;

pub use context::{Admission, AdmissionContext, RelayRequest};
pub use processor::RelayProcessor;
pub use steps::*;
