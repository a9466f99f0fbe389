//! 错误类型模块
//!
//! ## 模块结构
//! - `gateway_error`: 面向客户端的网关错误模型（GatewayError, GatewayErrorCode）

pub mod gateway_error;

pub use gateway_error::{GatewayError, GatewayErrorCode};
