//! 网关统一错误模型
//!
//! 为网关准入层提供稳定的错误语义，便于客户端统一处理。

use serde::{Deserialize, Serialize};

/// 网关错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayErrorCode {
    InvalidRequest,
    AuthenticationFailed,
    RateLimited,
    QuotaInsufficient,
    NoAvailableChannel,
    UpstreamTimeout,
    UpstreamUnavailable,
    UpstreamError,
    InternalError,
}

impl GatewayErrorCode {
    /// 根据状态码和错误消息推断错误码
    pub fn infer(status_code: u16, message: &str) -> Self {
        let normalized = message.to_lowercase();

        if normalized.contains("no available channel") || normalized.contains("无可用渠道") {
            return Self::NoAvailableChannel;
        }

        if normalized.contains("insufficient quota")
            || normalized.contains("quota exceeded")
            || normalized.contains("额度不足")
        {
            return Self::QuotaInsufficient;
        }

        if normalized.contains("timeout") || normalized.contains("超时") {
            return Self::UpstreamTimeout;
        }

        if normalized.contains("rate limit")
            || normalized.contains("too many requests")
            || normalized.contains("请求过于频繁")
        {
            return Self::RateLimited;
        }

        match status_code {
            400 | 404 | 422 => Self::InvalidRequest,
            401 => Self::AuthenticationFailed,
            402 | 403 => Self::QuotaInsufficient,
            429 => Self::RateLimited,
            408 | 504 => Self::UpstreamTimeout,
            502 | 503 => Self::UpstreamUnavailable,
            500..=599 => Self::UpstreamError,
            _ => Self::InternalError,
        }
    }

    /// 对客户端返回的 HTTP 状态码
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::AuthenticationFailed => 401,
            Self::QuotaInsufficient => 403,
            Self::RateLimited => 429,
            Self::NoAvailableChannel => 503,
            Self::UpstreamTimeout => 504,
            Self::UpstreamUnavailable => 503,
            Self::UpstreamError => 502,
            Self::InternalError => 500,
        }
    }

    /// 默认错误文案
    pub fn default_message(self) -> &'static str {
        match self {
            Self::InvalidRequest => "请求参数无效",
            Self::AuthenticationFailed => "认证失败",
            Self::RateLimited => "请求过于频繁，请稍后重试",
            Self::QuotaInsufficient => "额度不足",
            Self::NoAvailableChannel => "当前分组下没有可用渠道",
            Self::UpstreamTimeout => "上游请求超时",
            Self::UpstreamUnavailable => "上游服务暂不可用",
            Self::UpstreamError => "上游服务返回错误",
            Self::InternalError => "服务内部错误",
        }
    }

    /// 是否可重试
    pub fn retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::UpstreamTimeout
                | Self::UpstreamUnavailable
                | Self::UpstreamError
        )
    }
}

/// 网关错误详情
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl GatewayError {
    /// 创建错误详情
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let final_message = if message.trim().is_empty() {
            code.default_message().to_string()
        } else {
            message
        };

        Self {
            code,
            message: final_message,
            retryable: code.retryable(),
            request_id: None,
        }
    }

    /// 设置请求 ID
    pub fn with_request_id(mut self, request_id: Option<&str>) -> Self {
        self.request_id = request_id.map(ToString::to_string);
        self
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}
