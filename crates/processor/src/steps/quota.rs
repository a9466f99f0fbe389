//! 额度预扣步骤

use super::traits::{AdmissionStep, RelayError};
use crate::context::AdmissionContext;
use async_trait::async_trait;
use relaycast_quota::{QuotaContext, QuotaLedger};
use tracing::info;

/// 额度步骤 - 按预估成本预扣，余额不足的请求不会到达上游
pub struct QuotaStep {
    ledger: QuotaLedger,
}

impl QuotaStep {
    pub fn new(ledger: QuotaLedger) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl AdmissionStep for QuotaStep {
    async fn execute(&self, ctx: &mut AdmissionContext) -> Result<(), RelayError> {
        let token = ctx.token()?;
        let quota_ctx = QuotaContext {
            request_id: ctx.request.request_id.clone(),
            user_id: token.user_id,
            token_id: token.id,
            token_unlimited: token.unlimited_quota,
            group: ctx.group()?.to_string(),
            model: ctx.request.model.clone(),
            channel_id: ctx.channel()?.id,
            prompt_tokens: ctx.request.prompt_tokens,
        };

        let reservation = self.ledger.pre_consume(&quota_ctx).await.map_err(|e| {
            info!(
                "[ADMISSION] request_id={} 额度预扣失败: user_id={}, error={}",
                quota_ctx.request_id, quota_ctx.user_id, e
            );
            RelayError::Quota(e)
        })?;
        ctx.reservation = Some(reservation);
        Ok(())
    }

    fn name(&self) -> &str {
        "quota"
    }
}
