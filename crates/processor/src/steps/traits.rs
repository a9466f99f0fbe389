//! 准入步骤 trait 定义

use crate::context::AdmissionContext;
use async_trait::async_trait;
use relaycast_balancer::{BalancerError, UpstreamFailure};
use relaycast_core::{GatewayError, GatewayErrorCode};
use relaycast_quota::QuotaError;
use thiserror::Error;

/// 准入错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    #[error("认证失败: {0}")]
    Auth(String),
    #[error("令牌额度已用尽")]
    TokenExhausted,
    #[error("请求过于频繁: 分组 {group} 每分钟最多 {rpm} 次")]
    RateLimited { group: String, rpm: u32 },
    #[error("路由错误: {0}")]
    Routing(#[from] BalancerError),
    #[error("额度错误: {0}")]
    Quota(#[from] QuotaError),
    #[error("上游错误 {}: {}", .0.status_code, .0.message)]
    Upstream(UpstreamFailure),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl RelayError {
    /// 对外错误码
    pub fn code(&self) -> GatewayErrorCode {
        match self {
            RelayError::Auth(_) => GatewayErrorCode::AuthenticationFailed,
            RelayError::TokenExhausted => GatewayErrorCode::QuotaInsufficient,
            RelayError::RateLimited { .. } => GatewayErrorCode::RateLimited,
            RelayError::Routing(BalancerError::NoAvailableChannel { .. }) => {
                GatewayErrorCode::NoAvailableChannel
            }
            RelayError::Routing(_) => GatewayErrorCode::InternalError,
            RelayError::Quota(e) if e.is_insufficient() => GatewayErrorCode::QuotaInsufficient,
            RelayError::Quota(QuotaError::PriceNotFound(_)) => GatewayErrorCode::InvalidRequest,
            RelayError::Quota(_) => GatewayErrorCode::InternalError,
            RelayError::Upstream(failure) => {
                GatewayErrorCode::infer(failure.status_code, &failure.message)
            }
            RelayError::Internal(_) => GatewayErrorCode::InternalError,
        }
    }

    /// 获取对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        self.code().http_status()
    }

    pub fn retryable(&self) -> bool {
        self.code().retryable()
    }

    /// 转换为对外错误模型
    pub fn to_gateway_error(&self, request_id: Option<&str>) -> GatewayError {
        GatewayError::new(self.code(), self.to_string()).with_request_id(request_id)
    }
}

/// 准入管道步骤
#[async_trait]
pub trait AdmissionStep: Send + Sync {
    async fn execute(&self, ctx: &mut AdmissionContext) -> Result<(), RelayError>;

    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }
}
