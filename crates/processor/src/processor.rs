//! 准入处理器
//!
//! 请求生命周期：
//! 1. 准入 (`admit`)：认证 → 限流 → 路由 → 额度预扣，任一步失败请求都不会到达上游
//! 2. 上游失败 (`report_failure`)：冷却 (渠道, 模型)，必要时自动禁用渠道，换一个未尝试过的渠道
//! 3. 结束：成功时按实际用量结算 (`complete`)，放弃时退还预扣 (`abort`)
//!
//! 结算和退款在后台执行，不阻塞响应。

use crate::context::{Admission, AdmissionContext, RelayRequest};
use crate::steps::{AdmissionStep, AuthStep, QuotaStep, RateLimitStep, RelayError, RoutingStep};
use relaycast_balancer::{ChannelChooser, ChannelFilter, UpstreamFailure};
use relaycast_core::config::Config;
use relaycast_core::database::DbConnection;
use relaycast_core::logger::sanitize_log_message;
use relaycast_core::models::Channel;
use relaycast_core::AccountLookup;
use relaycast_limiter::LimiterBackend;
use relaycast_quota::{QuotaLedger, Usage};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 准入处理器
pub struct RelayProcessor {
    steps: Vec<Box<dyn AdmissionStep>>,
    chooser: Arc<ChannelChooser>,
    ledger: QuotaLedger,
    db: DbConnection,
    /// 是否对不可恢复的上游错误自动禁用渠道
    auto_disable: bool,
}

impl RelayProcessor {
    pub fn new(
        lookup: AccountLookup,
        limiter: Arc<dyn LimiterBackend>,
        chooser: Arc<ChannelChooser>,
        ledger: QuotaLedger,
        config: &Config,
    ) -> Self {
        let db = lookup.db().clone();
        let steps: Vec<Box<dyn AdmissionStep>> = vec![
            Box::new(AuthStep::new(lookup)),
            Box::new(RateLimitStep::new(limiter, config.rate_limit.clone())),
            Box::new(RoutingStep::new(chooser.clone())),
            Box::new(QuotaStep::new(ledger.clone())),
        ];
        Self {
            steps,
            chooser,
            ledger,
            db,
            auto_disable: config.routing.auto_disable_enabled,
        }
    }

    pub fn chooser(&self) -> &Arc<ChannelChooser> {
        &self.chooser
    }

    pub fn ledger(&self) -> &QuotaLedger {
        &self.ledger
    }

    /// 当前生效的步骤名称
    pub fn step_names(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|step| step.is_enabled())
            .map(|step| step.name())
            .collect()
    }

    /// 执行准入管道
    pub async fn admit(&self, request: RelayRequest) -> Result<Admission, RelayError> {
        let mut ctx = AdmissionContext::new(request);
        for step in self.steps.iter().filter(|step| step.is_enabled()) {
            if let Err(e) = step.execute(&mut ctx).await {
                warn!(
                    "[ADMISSION] request_id={} 步骤 {} 拒绝请求: {}",
                    ctx.request_id(),
                    step.name(),
                    e
                );
                return Err(e);
            }
        }

        let admission = ctx.into_admission()?;
        info!(
            "[ADMISSION] request_id={} 准入通过: user_id={}, group={}, model={}, channel_id={}, 耗时 {:?}",
            admission.request_id,
            admission.user_id,
            admission.group,
            admission.model,
            admission.channel.id,
            admission.started_at.elapsed()
        );
        Ok(admission)
    }

    /// 上游调用成功，按实际用量结算
    pub fn complete(&self, mut admission: Admission, usage: Usage) -> Result<JoinHandle<()>, RelayError> {
        debug!(
            "[ADMISSION] request_id={} 请求完成: prompt={}, completion={}, attempts={}",
            admission.request_id, usage.prompt_tokens, usage.completion_tokens, admission.attempts
        );
        Ok(self.ledger.consume(&mut admission.reservation, usage)?)
    }

    /// 放弃请求，退还预扣
    pub fn abort(&self, mut admission: Admission) -> Result<JoinHandle<()>, RelayError> {
        debug!("[ADMISSION] request_id={} 请求中止", admission.request_id);
        Ok(self.ledger.undo(&mut admission.reservation)?)
    }

    /// 上报上游失败并换一个渠道
    ///
    /// 客户端请求本身的错误不归因于渠道，原样返回，调用方应当 `abort`。
    /// 所有渠道都已尝试或冷却时返回无可用渠道错误，预扣仍由调用方处理。
    pub fn report_failure(
        &self,
        admission: &mut Admission,
        failure: &UpstreamFailure,
    ) -> Result<Arc<Channel>, RelayError> {
        let failed = admission.channel.clone();
        admission.tried.insert(failed.id);

        if !failure.is_channel_fault() {
            debug!(
                "[ADMISSION] request_id={} 上游拒绝请求，不切换渠道: status={}",
                admission.request_id, failure.status_code
            );
            return Err(RelayError::Upstream(failure.clone()));
        }

        warn!(
            "[ADMISSION] request_id={} 渠道 {} 调用失败: status={}, message={}",
            admission.request_id,
            failed.id,
            failure.status_code,
            sanitize_log_message(&failure.message)
        );
        self.chooser.mark_cooldown(failed.id, &admission.model);
        if self.auto_disable && failure.should_disable_channel() {
            if let Err(e) = self.chooser.auto_disable(&self.db, failed.id, &failure.message) {
                warn!("[ADMISSION] 自动禁用渠道 {} 失败: {}", failed.id, e);
            }
        }

        let filters: [&dyn ChannelFilter; 1] = [&admission.tried];
        let next = self.chooser.next(&admission.group, &admission.model, &filters)?;
        info!(
            "[ADMISSION] request_id={} 切换渠道: {} -> {}",
            admission.request_id, failed.id, next.id
        );
        admission.channel = next.clone();
        admission.reservation.set_channel(next.id);
        admission.attempts += 1;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture, Fixture, MODEL};
    use relaycast_balancer::BalancerError;
    use relaycast_core::database::dao::{ChannelDao, TokenDao, UserDao};
    use relaycast_core::database::lock_db;
    use relaycast_core::models::ChannelStatus;
    use relaycast_limiter::MemoryLimiterBackend;
    use relaycast_quota::ReservationState;

    fn processor(fx: &Fixture) -> RelayProcessor {
        RelayProcessor::new(
            fx.lookup.clone(),
            Arc::new(MemoryLimiterBackend::new()),
            fx.chooser.clone(),
            fx.ledger.clone(),
            &Config::default(),
        )
    }

    fn balances(fx: &Fixture) -> (i64, i64) {
        let conn = lock_db(&fx.db).unwrap();
        (
            UserDao::get_quota(&conn, 1).unwrap().unwrap(),
            TokenDao::get_by_id(&conn, 1).unwrap().unwrap().remain_quota,
        )
    }

    #[tokio::test]
    async fn test_admit_and_complete() {
        let fx = fixture();
        let processor = processor(&fx);
        assert_eq!(processor.step_names(), vec!["auth", "rate_limit", "routing", "quota"]);

        let admission = processor
            .admit(RelayRequest::new("sk-alice-0001", MODEL, 100).with_request_id("req-1"))
            .await
            .unwrap();
        assert_eq!(admission.request_id, "req-1");
        assert_eq!(admission.reservation.reserved(), 600);
        assert_eq!(balances(&fx), (9_400, 400));

        processor
            .complete(admission, Usage::new(100, 50))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(balances(&fx), (9_800, 800));
    }

    #[tokio::test]
    async fn test_abort_restores_balances() {
        let fx = fixture();
        let processor = processor(&fx);
        let admission = processor
            .admit(RelayRequest::new("sk-alice-0001", MODEL, 100))
            .await
            .unwrap();
        processor.abort(admission).unwrap().await.unwrap();
        assert_eq!(balances(&fx), (10_000, 1_000));
    }

    #[tokio::test]
    async fn test_rejection_reserves_nothing() {
        let fx = fixture();
        let processor = processor(&fx);
        let err = processor
            .admit(RelayRequest::new("sk-disabled-0003", MODEL, 100))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert_eq!(balances(&fx), (10_000, 1_000));
    }

    #[tokio::test]
    async fn test_failover_to_untried_channel() {
        let fx = fixture();
        let processor = processor(&fx);
        let mut admission = processor
            .admit(RelayRequest::new("sk-alice-0001", MODEL, 100))
            .await
            .unwrap();
        let first = admission.channel.id;

        let next = processor
            .report_failure(&mut admission, &UpstreamFailure::new(502, "bad gateway"))
            .unwrap();
        assert_ne!(next.id, first);
        assert_eq!(admission.attempts, 2);
        assert_eq!(admission.reservation.channel_id(), next.id);
        assert!(fx.chooser.cooldowns().is_cooling(first, MODEL));
        // 临时错误不禁用渠道
        assert!(!fx.chooser.is_runtime_disabled(first).unwrap());

        let err = processor
            .report_failure(&mut admission, &UpstreamFailure::new(503, "overloaded"))
            .unwrap_err();
        assert!(matches!(err, RelayError::Routing(BalancerError::NoAvailableChannel { .. })));

        processor.abort(admission).unwrap().await.unwrap();
        assert_eq!(balances(&fx), (10_000, 1_000));
    }

    #[tokio::test]
    async fn test_invalid_key_failure_disables_channel() {
        let fx = fixture();
        let processor = processor(&fx);
        let mut admission = processor
            .admit(RelayRequest::new("sk-alice-0001", MODEL, 100))
            .await
            .unwrap();
        let first = admission.channel.id;

        processor
            .report_failure(&mut admission, &UpstreamFailure::new(401, "invalid api key"))
            .unwrap();
        assert!(fx.chooser.is_runtime_disabled(first).unwrap());
        let conn = lock_db(&fx.db).unwrap();
        let stored = ChannelDao::get_by_id(&conn, first).unwrap().unwrap();
        assert_eq!(stored.status, ChannelStatus::AutoDisabled);
    }

    #[tokio::test]
    async fn test_client_error_is_not_failed_over() {
        let fx = fixture();
        let processor = processor(&fx);
        let mut admission = processor
            .admit(RelayRequest::new("sk-alice-0001", MODEL, 100))
            .await
            .unwrap();
        let first = admission.channel.id;

        let err = processor
            .report_failure(&mut admission, &UpstreamFailure::new(400, "invalid messages"))
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(!fx.chooser.cooldowns().is_cooling(first, MODEL));
        assert_eq!(admission.channel.id, first);
        assert_eq!(admission.reservation.state(), ReservationState::Reserved);

        processor.abort(admission).unwrap().await.unwrap();
    }
}
