//! 额度账本

use crate::error::{QuotaError, QuotaResult};
use crate::notify::{LogNotifier, LowBalanceWatch, QuotaNotifier};
use crate::pricing::{GroupRatioTable, PriceQuote, PricingCatalog, Usage};
use crate::reservation::{Hold, Reservation, ReservationState};
use relaycast_core::cache::account::user_quota_cache_key;
use relaycast_core::config::QuotaConfig;
use relaycast_core::database::dao::{ChannelDao, ConsumeLog, LogDao, TokenDao, UserDao};
use relaycast_core::database::lock_db;
use relaycast_core::{AccountLookup, BatchAggregator, BatchUpdateType, DecrOutcome};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 预扣所需的请求信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaContext {
    pub request_id: String,
    pub user_id: i64,
    pub token_id: i64,
    pub token_unlimited: bool,
    pub group: String,
    pub model: String,
    pub channel_id: i64,
    pub prompt_tokens: u32,
}

/// 额度账本
///
/// 克隆开销是一次 `Arc` 克隆。
#[derive(Clone)]
pub struct QuotaLedger {
    inner: Arc<LedgerInner>,
}

#[derive(Clone)]
pub(crate) struct LedgerInner {
    lookup: AccountLookup,
    batch: Option<Arc<BatchAggregator>>,
    pricing: Arc<dyn PricingCatalog>,
    group_ratios: Arc<GroupRatioTable>,
    config: QuotaConfig,
    notifier: Arc<dyn QuotaNotifier>,
    watch: Arc<LowBalanceWatch>,
}

impl QuotaLedger {
    pub fn new(
        lookup: AccountLookup,
        pricing: Arc<dyn PricingCatalog>,
        group_ratios: Arc<GroupRatioTable>,
        config: QuotaConfig,
    ) -> Self {
        let watch = Arc::new(LowBalanceWatch::new(config.remind_threshold));
        Self {
            inner: Arc::new(LedgerInner {
                lookup,
                batch: None,
                pricing,
                group_ratios,
                config,
                notifier: Arc::new(LogNotifier),
                watch,
            }),
        }
    }

    /// 余额变更经批量聚合器延迟写入
    pub fn with_batch(self, batch: Arc<BatchAggregator>) -> Self {
        let mut inner = Arc::unwrap_or_clone(self.inner);
        inner.batch = Some(batch);
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn with_notifier(self, notifier: Arc<dyn QuotaNotifier>) -> Self {
        let mut inner = Arc::unwrap_or_clone(self.inner);
        inner.notifier = notifier;
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.inner.config
    }

    pub fn group_ratios(&self) -> &Arc<GroupRatioTable> {
        &self.inner.group_ratios
    }

    /// 计算 (分组, 模型) 的价格
    pub fn quote(&self, group: &str, model: &str) -> QuotaResult<PriceQuote> {
        self.inner.quote(group, model)
    }

    /// 预扣额度
    ///
    /// 余额不足预估成本时拒绝。用户余额总是预扣；余额超过预估的信任倍数时跳过令牌预扣，
    /// 结算时从令牌一次性扣除实际成本。先扣令牌再扣用户，用户扣减失败时退回令牌。
    pub async fn pre_consume(&self, ctx: &QuotaContext) -> QuotaResult<Reservation> {
        let inner = &self.inner;
        let quote = inner.quote(&ctx.group, &ctx.model)?;
        let estimated = quote.estimate(ctx.prompt_tokens, inner.config.pre_consume_buffer);

        let balance = inner
            .lookup
            .user_quota(ctx.user_id)
            .await
            .map_err(QuotaError::Store)?
            .ok_or(QuotaError::UserNotFound(ctx.user_id))?;
        if balance < estimated {
            return Err(QuotaError::Insufficient {
                need: estimated,
                available: balance,
            });
        }

        let trusted = inner.is_trusted(balance, estimated);
        let token_reserved = if trusted {
            debug!(
                "[QUOTA] 用户 {} 余额 {} 充足，跳过令牌预扣: request_id={}",
                ctx.user_id, balance, ctx.request_id
            );
            0
        } else {
            inner.reserve_token(ctx, estimated)?;
            estimated
        };

        if let Err(e) = inner.reserve_user(ctx.user_id, estimated).await {
            if token_reserved > 0 {
                if let Err(undo) = inner.apply_token_now(ctx.token_id, token_reserved) {
                    error!(
                        "[QUOTA] 退回令牌预扣失败: token_id={}, amount={}, error={}",
                        ctx.token_id, token_reserved, undo
                    );
                }
            }
            return Err(e);
        }

        info!(
            "[QUOTA] 预扣完成: request_id={}, user_id={}, estimated={}, token_reserved={}",
            ctx.request_id, ctx.user_id, estimated, token_reserved
        );
        let hold = Hold {
            request_id: ctx.request_id.clone(),
            user_id: ctx.user_id,
            token_id: ctx.token_id,
            channel_id: ctx.channel_id,
            model: ctx.model.clone(),
            quote,
            user_reserved: estimated,
            token_reserved,
        };
        Ok(Reservation::new(
            hold,
            ctx.group.clone(),
            estimated,
            balance,
            inner.clone(),
        ))
    }

    /// 按实际用量结算，结算在后台执行
    pub fn consume(&self, reservation: &mut Reservation, usage: Usage) -> QuotaResult<JoinHandle<()>> {
        reservation
            .transition(ReservationState::Completed)
            .map_err(|(from, to)| QuotaError::InvalidTransition { from, to })?;
        let hold = reservation.hold();
        Ok(tokio::spawn(self.inner.clone().settle(hold, usage)))
    }

    /// 退还预扣，退款在后台执行
    pub fn undo(&self, reservation: &mut Reservation) -> QuotaResult<JoinHandle<()>> {
        reservation
            .transition(ReservationState::Refunded)
            .map_err(|(from, to)| QuotaError::InvalidTransition { from, to })?;
        let hold = reservation.hold();
        Ok(tokio::spawn(self.inner.clone().refund(hold)))
    }
}

impl LedgerInner {
    fn quote(&self, group: &str, model: &str) -> QuotaResult<PriceQuote> {
        let price = self
            .pricing
            .model_price(model)
            .ok_or_else(|| QuotaError::PriceNotFound(model.to_string()))?;
        Ok(PriceQuote::new(price, self.group_ratios.ratio(group)))
    }

    fn is_trusted(&self, balance: i64, estimated: i64) -> bool {
        let multiple = self.config.trust_multiple as i64;
        multiple > 0 && balance > estimated.saturating_mul(multiple)
    }

    /// 令牌预扣总是直接写库，保证不超过令牌剩余额度
    fn reserve_token(&self, ctx: &QuotaContext, amount: i64) -> QuotaResult<()> {
        let conn = lock_db(self.lookup.db()).map_err(QuotaError::Store)?;
        if ctx.token_unlimited {
            TokenDao::increase_remain_quota(&conn, ctx.token_id, -amount)?;
            return Ok(());
        }
        if !TokenDao::decrease_remain_if_sufficient(&conn, ctx.token_id, amount)? {
            return Err(QuotaError::TokenInsufficient { need: amount });
        }
        Ok(())
    }

    fn apply_token_now(&self, token_id: i64, delta: i64) -> QuotaResult<()> {
        let conn = lock_db(self.lookup.db()).map_err(QuotaError::Store)?;
        TokenDao::increase_remain_quota(&conn, token_id, delta)?;
        Ok(())
    }

    /// 扣减用户余额：缓存命中时原子扣减缓存再同步到库，否则走库内条件扣减
    async fn reserve_user(&self, user_id: i64, amount: i64) -> QuotaResult<()> {
        if let Some(cache) = self.lookup.cache() {
            let key = user_quota_cache_key(user_id);
            match cache.decr_if_sufficient(&key, amount).await {
                Ok(DecrOutcome::Applied { .. }) => {
                    if let Err(e) = self.apply_delta(BatchUpdateType::UserQuota, user_id, -amount) {
                        if let Err(restore) = cache.incr_if_present(&key, amount).await {
                            warn!("[QUOTA] 恢复缓存余额失败: user_id={}, error={}", user_id, restore);
                        }
                        return Err(e);
                    }
                    return Ok(());
                }
                Ok(DecrOutcome::Insufficient { balance }) => {
                    return Err(QuotaError::Insufficient {
                        need: amount,
                        available: balance,
                    });
                }
                Ok(DecrOutcome::Missing) => {}
                Err(e) => warn!(
                    "[QUOTA] 缓存扣减失败，改为直接扣减数据库: user_id={}, error={}",
                    user_id, e
                ),
            }
        }

        let conn = lock_db(self.lookup.db()).map_err(QuotaError::Store)?;
        if UserDao::decrease_quota_if_sufficient(&conn, user_id, amount)? {
            return Ok(());
        }
        let available = UserDao::get_quota(&conn, user_id)?.ok_or(QuotaError::UserNotFound(user_id))?;
        Err(QuotaError::Insufficient {
            need: amount,
            available,
        })
    }

    /// 写入一条增量，开启批量更新时进入聚合器
    fn apply_delta(&self, kind: BatchUpdateType, id: i64, delta: i64) -> QuotaResult<()> {
        if let Some(batch) = &self.batch {
            batch.add_delta(kind, id, delta);
            return Ok(());
        }
        let conn = lock_db(self.lookup.db()).map_err(QuotaError::Store)?;
        match kind {
            BatchUpdateType::UserQuota => UserDao::increase_quota(&conn, id, delta)?,
            BatchUpdateType::TokenQuota => TokenDao::increase_remain_quota(&conn, id, delta)?,
            BatchUpdateType::UsedQuota => UserDao::add_used_quota(&conn, id, delta)?,
            BatchUpdateType::ChannelUsedQuota => ChannelDao::add_used_quota(&conn, id, delta)?,
            BatchUpdateType::RequestCount => UserDao::add_request_count(&conn, id, delta)?,
        }
        Ok(())
    }

    fn apply_or_log(&self, kind: BatchUpdateType, id: i64, delta: i64, request_id: &str) {
        if let Err(e) = self.apply_delta(kind, id, delta) {
            error!(
                "[QUOTA] 写入 {} 失败: id={}, delta={}, request_id={}, error={}",
                kind, id, delta, request_id, e
            );
        }
    }

    /// 调整缓存中的用户余额，返回调整后的值
    async fn adjust_cached_balance(&self, user_id: i64, delta: i64) -> Option<i64> {
        let cache = self.lookup.cache()?;
        match cache.incr_if_present(&user_quota_cache_key(user_id), delta).await {
            Ok(value) => value,
            Err(e) => {
                warn!("[QUOTA] 调整缓存余额失败: user_id={}, error={}", user_id, e);
                // 删除镜像，下次读取从库加载
                self.lookup.invalidate_user(user_id).await;
                None
            }
        }
    }

    /// 结算：用户和令牌各自按 实际成本 - 预扣 补扣或退还
    pub(crate) async fn settle(self: Arc<Self>, hold: Hold, usage: Usage) {
        let actual = hold.quote.actual_cost(&usage);
        let user_delta = actual - hold.user_reserved;
        let token_delta = actual - hold.token_reserved;

        if token_delta != 0 {
            self.apply_or_log(BatchUpdateType::TokenQuota, hold.token_id, -token_delta, &hold.request_id);
        }
        let mut balance = None;
        if user_delta != 0 {
            self.apply_or_log(BatchUpdateType::UserQuota, hold.user_id, -user_delta, &hold.request_id);
            balance = self.adjust_cached_balance(hold.user_id, -user_delta).await;
        }
        self.apply_or_log(BatchUpdateType::UsedQuota, hold.user_id, actual, &hold.request_id);
        self.apply_or_log(BatchUpdateType::RequestCount, hold.user_id, 1, &hold.request_id);
        self.apply_or_log(BatchUpdateType::ChannelUsedQuota, hold.channel_id, actual, &hold.request_id);

        if let Err(e) = self.record_log(&hold, &usage, actual) {
            error!("[QUOTA] 写入消费记录失败: request_id={}, error={}", hold.request_id, e);
        }
        debug!(
            "[QUOTA] 结算完成: request_id={}, actual={}, user_delta={}, token_delta={}",
            hold.request_id, actual, user_delta, token_delta
        );

        if balance.is_none() {
            balance = match self.lookup.user_quota(hold.user_id).await {
                Ok(balance) => balance,
                Err(e) => {
                    warn!("[QUOTA] 读取余额失败，跳过提醒检查: user_id={}, error={}", hold.user_id, e);
                    None
                }
            };
        }
        if let Some(balance) = balance {
            if let Some(notice) = self.watch.observe(hold.user_id, balance) {
                self.notifier.notify(hold.user_id, notice);
            }
        }
    }

    /// 退还预扣的全部额度，只退实际扣过的部分
    pub(crate) async fn refund(self: Arc<Self>, hold: Hold) {
        if !hold.is_active() {
            return;
        }
        if hold.token_reserved > 0 {
            self.apply_or_log(BatchUpdateType::TokenQuota, hold.token_id, hold.token_reserved, &hold.request_id);
        }
        if hold.user_reserved > 0 {
            self.apply_or_log(BatchUpdateType::UserQuota, hold.user_id, hold.user_reserved, &hold.request_id);
            self.adjust_cached_balance(hold.user_id, hold.user_reserved).await;
        }
        info!(
            "[QUOTA] 预扣已退还: request_id={}, user_id={}, user={}, token={}",
            hold.request_id, hold.user_id, hold.user_reserved, hold.token_reserved
        );
    }

    fn record_log(&self, hold: &Hold, usage: &Usage, actual: i64) -> QuotaResult<()> {
        let log = ConsumeLog {
            id: 0,
            created_at: chrono::Utc::now().to_rfc3339(),
            user_id: hold.user_id,
            token_id: hold.token_id,
            channel_id: hold.channel_id,
            model: hold.model.clone(),
            prompt_tokens: usage.prompt_tokens as i64,
            completion_tokens: usage.completion_tokens as i64,
            quota: actual,
            request_id: Some(hold.request_id.clone()),
        };
        let conn = lock_db(self.lookup.db()).map_err(QuotaError::Store)?;
        LogDao::insert(&conn, &log)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::QuotaNotice;
    use crate::pricing::StaticPricing;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use relaycast_core::config::ModelPrice;
    use relaycast_core::database::{open_database, DbConnection};
    use relaycast_core::models::{Channel, Token, User};
    use relaycast_core::{MemoryCache, SharedCacheRef};
    use std::collections::HashMap;
    use std::time::Duration;

    const MODEL: &str = "gpt-4o";

    fn setup(user_quota: i64, token_remain: i64) -> DbConnection {
        let db = open_database(":memory:").unwrap();
        {
            let conn = lock_db(&db).unwrap();
            UserDao::insert(&conn, &User::new(1, "alice", "default", user_quota)).unwrap();
            TokenDao::insert(&conn, &Token::new(1, 1, "sk-alice-test", token_remain)).unwrap();
            ChannelDao::insert(&conn, &Channel::new(1, "primary", "default", MODEL)).unwrap();
        }
        db
    }

    fn build_ledger(db: &DbConnection, cache: Option<SharedCacheRef>, config: QuotaConfig) -> QuotaLedger {
        let lookup = AccountLookup::new(db.clone(), cache, Duration::from_secs(60));
        let pricing = StaticPricing::new(HashMap::from([(MODEL.to_string(), ModelPrice::new(1.0, 2.0))]));
        QuotaLedger::new(lookup, Arc::new(pricing), Arc::new(GroupRatioTable::default()), config)
    }

    fn context(prompt_tokens: u32) -> QuotaContext {
        QuotaContext {
            request_id: "req-1".to_string(),
            user_id: 1,
            token_id: 1,
            token_unlimited: false,
            group: "default".to_string(),
            model: MODEL.to_string(),
            channel_id: 1,
            prompt_tokens,
        }
    }

    fn balances(db: &DbConnection) -> (i64, i64) {
        let conn = lock_db(db).unwrap();
        let user = UserDao::get_quota(&conn, 1).unwrap().unwrap();
        let token = TokenDao::get_by_id(&conn, 1).unwrap().unwrap().remain_quota;
        (user, token)
    }

    #[tokio::test]
    async fn test_reserve_then_reconcile_refunds_difference() {
        let db = setup(10_000, 1_000);
        let cache: SharedCacheRef = Arc::new(MemoryCache::new());
        let ledger = build_ledger(&db, Some(cache.clone()), QuotaConfig::default());

        let mut reservation = ledger.pre_consume(&context(100)).await.unwrap();
        assert_eq!(reservation.estimated(), 600);
        assert_eq!(reservation.reserved(), 600);
        assert_eq!(balances(&db), (9_400, 400));
        assert_eq!(cache.get("user_quota:1").await.unwrap().as_deref(), Some("9400"));

        ledger
            .consume(&mut reservation, Usage::new(100, 50))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(reservation.state(), ReservationState::Completed);
        assert_eq!(balances(&db), (9_800, 800));
        assert_eq!(cache.get("user_quota:1").await.unwrap().as_deref(), Some("9800"));

        let conn = lock_db(&db).unwrap();
        let logs = LogDao::list_by_user(&conn, 1, 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].quota, 200);
        assert_eq!(logs[0].request_id.as_deref(), Some("req-1"));
        let user = UserDao::get_by_id(&conn, 1).unwrap().unwrap();
        assert_eq!(user.used_quota, 200);
        assert_eq!(user.request_count, 1);
        let channel = ChannelDao::get_by_id(&conn, 1).unwrap().unwrap();
        assert_eq!(channel.used_quota, 200);
    }

    #[tokio::test]
    async fn test_undo_restores_balances() {
        let db = setup(10_000, 1_000);
        let cache: SharedCacheRef = Arc::new(MemoryCache::new());
        let ledger = build_ledger(&db, Some(cache.clone()), QuotaConfig::default());

        let mut reservation = ledger.pre_consume(&context(100)).await.unwrap();
        ledger.undo(&mut reservation).unwrap().await.unwrap();
        assert_eq!(balances(&db), (10_000, 1_000));
        assert_eq!(cache.get("user_quota:1").await.unwrap().as_deref(), Some("10000"));

        let err = ledger.consume(&mut reservation, Usage::new(1, 1)).unwrap_err();
        assert_eq!(
            err,
            QuotaError::InvalidTransition {
                from: ReservationState::Refunded,
                to: ReservationState::Completed
            }
        );
    }

    #[tokio::test]
    async fn test_high_balance_skips_token_reservation_only() {
        let db = setup(1_000_000, 1_000);
        let cache: SharedCacheRef = Arc::new(MemoryCache::new());
        let ledger = build_ledger(&db, Some(cache.clone()), QuotaConfig::default());

        let mut reservation = ledger.pre_consume(&context(100)).await.unwrap();
        assert!(reservation.is_active());
        assert_eq!(reservation.reserved(), 600);
        assert_eq!(reservation.token_reserved(), 0);
        assert_eq!(cache.get("user_quota:1").await.unwrap().as_deref(), Some("999400"));
        assert_eq!(balances(&db), (999_400, 1_000));

        ledger
            .consume(&mut reservation, Usage::new(100, 50))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(balances(&db), (999_800, 800));
        assert_eq!(cache.get("user_quota:1").await.unwrap().as_deref(), Some("999800"));
    }

    #[tokio::test]
    async fn test_trusted_undo_refunds_only_user() {
        let db = setup(1_000_000, 1_000);
        let cache: SharedCacheRef = Arc::new(MemoryCache::new());
        let ledger = build_ledger(&db, Some(cache.clone()), QuotaConfig::default());

        let mut reservation = ledger.pre_consume(&context(100)).await.unwrap();
        ledger.undo(&mut reservation).unwrap().await.unwrap();
        assert_eq!(balances(&db), (1_000_000, 1_000));
        assert_eq!(cache.get("user_quota:1").await.unwrap().as_deref(), Some("1000000"));
    }

    #[tokio::test]
    async fn test_trust_multiple_zero_always_reserves() {
        let db = setup(1_000_000, 1_000);
        let config = QuotaConfig {
            trust_multiple: 0,
            ..QuotaConfig::default()
        };
        let ledger = build_ledger(&db, None, config);

        let reservation = ledger.pre_consume(&context(100)).await.unwrap();
        assert_eq!(reservation.reserved(), 600);
        assert_eq!(balances(&db), (999_400, 400));
    }

    #[tokio::test]
    async fn test_insufficient_balances_rejected() {
        let db = setup(500, 1_000);
        let ledger = build_ledger(&db, None, QuotaConfig::default());
        let err = ledger.pre_consume(&context(100)).await.unwrap_err();
        assert_eq!(
            err,
            QuotaError::Insufficient {
                need: 600,
                available: 500
            }
        );

        // 令牌额度不足，用户余额不变
        let db = setup(10_000, 100);
        let ledger = build_ledger(&db, None, QuotaConfig::default());
        let err = ledger.pre_consume(&context(100)).await.unwrap_err();
        assert_eq!(err, QuotaError::TokenInsufficient { need: 600 });
        assert!(err.is_insufficient());
        assert_eq!(balances(&db), (10_000, 100));
    }

    #[tokio::test]
    async fn test_unknown_model_and_user() {
        let db = setup(10_000, 1_000);
        let ledger = build_ledger(&db, None, QuotaConfig::default());

        let mut ctx = context(100);
        ctx.model = "unknown-model".to_string();
        assert_eq!(
            ledger.pre_consume(&ctx).await.unwrap_err(),
            QuotaError::PriceNotFound("unknown-model".to_string())
        );

        let mut ctx = context(100);
        ctx.user_id = 42;
        assert_eq!(ledger.pre_consume(&ctx).await.unwrap_err(), QuotaError::UserNotFound(42));
    }

    #[tokio::test]
    async fn test_dropped_reservation_is_refunded() {
        let db = setup(10_000, 1_000);
        let ledger = build_ledger(&db, None, QuotaConfig::default());

        let reservation = ledger.pre_consume(&context(100)).await.unwrap();
        assert_eq!(balances(&db), (9_400, 400));
        drop(reservation);

        for _ in 0..50 {
            if balances(&db) == (10_000, 1_000) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(balances(&db), (10_000, 1_000));
    }

    #[tokio::test]
    async fn test_batch_mode_defers_settlement() {
        let db = setup(10_000, 1_000);
        let batch = Arc::new(BatchAggregator::new(db.clone()));
        let cache: SharedCacheRef = Arc::new(MemoryCache::new());
        let ledger = build_ledger(&db, Some(cache.clone()), QuotaConfig::default()).with_batch(batch.clone());

        let mut reservation = ledger.pre_consume(&context(100)).await.unwrap();
        // 令牌立即扣减，用户余额只在缓存中可见
        assert_eq!(balances(&db), (10_000, 400));
        assert_eq!(cache.get("user_quota:1").await.unwrap().as_deref(), Some("9400"));

        ledger
            .consume(&mut reservation, Usage::new(100, 50))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(balances(&db), (10_000, 400));

        let stats = batch.flush();
        assert_eq!(stats.failed, 0);
        assert_eq!(balances(&db), (9_800, 800));
    }

    #[tokio::test]
    async fn test_low_balance_notice_fires_once() {
        struct Recorder(Mutex<Vec<(i64, QuotaNotice)>>);
        impl QuotaNotifier for Recorder {
            fn notify(&self, user_id: i64, notice: QuotaNotice) {
                self.0.lock().push((user_id, notice));
            }
        }

        let db = setup(5_100, 100_000);
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let ledger = build_ledger(&db, None, QuotaConfig::default()).with_notifier(recorder.clone());

        for _ in 0..2 {
            let mut reservation = ledger.pre_consume(&context(100)).await.unwrap();
            ledger
                .consume(&mut reservation, Usage::new(100, 50))
                .unwrap()
                .await
                .unwrap();
        }
        let notices = recorder.0.lock().clone();
        assert_eq!(
            notices,
            vec![(
                1,
                QuotaNotice::LowBalance {
                    balance: 4_900,
                    threshold: 5_000
                }
            )]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_final_balance_is_initial_minus_actual(
            initial in 1_000i64..200_000,
            prompt in 0u32..400,
            completion in 0u32..2_000,
            use_cache in any::<bool>(),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            runtime.block_on(async {
                let db = setup(initial, initial);
                let cache: Option<SharedCacheRef> = if use_cache {
                    Some(Arc::new(MemoryCache::new()))
                } else {
                    None
                };
                let ledger = build_ledger(&db, cache, QuotaConfig::default());
                let mut reservation = ledger.pre_consume(&context(prompt)).await.unwrap();
                ledger
                    .consume(&mut reservation, Usage::new(prompt, completion))
                    .unwrap()
                    .await
                    .unwrap();
                let actual = reservation.quote().actual_cost(&Usage::new(prompt, completion));
                assert_eq!(balances(&db), (initial - actual, initial - actual));
            });
        }
    }
}
