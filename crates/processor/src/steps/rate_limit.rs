//! 限流步骤

use super::traits::{AdmissionStep, RelayError};
use crate::context::AdmissionContext;
use async_trait::async_trait;
use relaycast_core::config::RateLimitConfig;
use relaycast_limiter::{LimiterBackend, LimiterKey, RateLimiter};
use std::sync::Arc;
use tracing::info;

/// 限流步骤 - 按用户分组的每分钟请求数限制，计数按 (分组, 用户) 隔离
pub struct RateLimitStep {
    backend: Arc<dyn LimiterBackend>,
    config: RateLimitConfig,
}

impl RateLimitStep {
    pub fn new(backend: Arc<dyn LimiterBackend>, config: RateLimitConfig) -> Self {
        Self { backend, config }
    }

    pub fn limiter_for(&self, group: &str) -> RateLimiter {
        RateLimiter::for_rpm(self.backend.clone(), self.config.rpm_for_group(group), &self.config)
    }
}

#[async_trait]
impl AdmissionStep for RateLimitStep {
    async fn execute(&self, ctx: &mut AdmissionContext) -> Result<(), RelayError> {
        let group = ctx.group()?;
        let user_id = ctx.token()?.user_id;
        let limiter = self.limiter_for(group);
        if limiter.allow(&LimiterKey::relay(group, user_id)).await {
            return Ok(());
        }

        info!(
            "[ADMISSION] request_id={} 触发限流: group={}, user_id={}, strategy={}",
            ctx.request_id(),
            group,
            user_id,
            limiter.strategy()
        );
        Err(RelayError::RateLimited {
            group: group.to_string(),
            rpm: self.config.rpm_for_group(group),
        })
    }

    fn name(&self) -> &str {
        "rate_limit"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}
