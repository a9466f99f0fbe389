//! 上游错误分类

use serde::{Deserialize, Serialize};

/// 一次上游调用失败
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamFailure {
    /// HTTP 状态码，0 表示网络层失败
    pub status_code: u16,
    pub message: String,
}

impl UpstreamFailure {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    /// 是否归因于渠道本身（需要冷却）
    ///
    /// 客户端请求本身有误（400/404/413/422 等）时换渠道也无济于事。
    pub fn is_channel_fault(&self) -> bool {
        matches!(self.status_code, 0 | 401 | 402 | 403 | 408 | 429 | 500..=599)
    }

    /// 是否应当自动禁用渠道（凭证失效、账户欠费或被封禁）
    pub fn should_disable_channel(&self) -> bool {
        if self.status_code == 401 {
            return true;
        }
        let message = self.message.to_lowercase();
        const FATAL_MARKERS: [&str; 8] = [
            "invalid api key",
            "incorrect api key",
            "api key not valid",
            "account deactivated",
            "organization has been disabled",
            "insufficient_quota",
            "credit balance is too low",
            "billing",
        ];
        FATAL_MARKERS.iter().any(|marker| message.contains(marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_fault_classification() {
        assert!(UpstreamFailure::new(429, "rate limited").is_channel_fault());
        assert!(UpstreamFailure::new(502, "bad gateway").is_channel_fault());
        assert!(UpstreamFailure::new(0, "connection reset").is_channel_fault());
        assert!(!UpstreamFailure::new(400, "invalid messages").is_channel_fault());
    }

    #[test]
    fn test_should_disable_channel() {
        assert!(UpstreamFailure::new(401, "").should_disable_channel());
        assert!(UpstreamFailure::new(429, "You exceeded your current quota: insufficient_quota")
            .should_disable_channel());
        assert!(!UpstreamFailure::new(429, "Rate limit reached").should_disable_channel());
        assert!(!UpstreamFailure::new(503, "overloaded").should_disable_channel());
    }
}
