//! 限流键

use std::fmt;

/// 限流键：资源 + 调用方身份
///
/// 不同资源、不同身份之间永远不会共享计数。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimiterKey {
    pub resource: String,
    pub identity: String,
}

impl LimiterKey {
    pub fn new(resource: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            identity: identity.into(),
        }
    }

    /// 分组级别的中转请求限流键
    pub fn relay(group: &str, user_id: i64) -> Self {
        Self::new(format!("relay:{group}"), format!("user:{user_id}"))
    }

    /// 存储键，`tag` 区分不同策略的状态结构
    pub fn storage_key(&self, tag: &str) -> String {
        format!("rl:{}:{}:{}", tag, self.resource, self.identity)
    }
}

impl fmt::Display for LimiterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource, self.identity)
    }
}
