//! 状态初始化模块
//!
//! 按依赖顺序装配各组件：数据库 → 共享缓存 → 限流后端 → 路由 → 额度账本 → 准入处理器，
//! 然后启动后台任务。Redis 不可用时退回进程内实现，只保证单副本内的正确性。

use super::tasks::{period, spawn_cache_purge_task, BackgroundTasks};
use anyhow::{Context, Result};
use relaycast_balancer::{spawn_cooldown_sweep_task, spawn_sync_task, ChannelChooser, SqliteRoutingSource};
use relaycast_core::database::{open_database, DbConnection};
use relaycast_core::{
    AccountLookup, BatchAggregator, Config, MemoryCache, RedisCache, SharedCacheRef,
};
use relaycast_limiter::{spawn_sweep_task, LimiterBackend, MemoryLimiterBackend, RedisLimiterBackend};
use relaycast_processor::RelayProcessor;
use relaycast_quota::{GroupRatioTable, QuotaLedger, StaticPricing};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// 网关运行时状态
pub struct GatewayState {
    pub config: Config,
    pub db: DbConnection,
    pub lookup: AccountLookup,
    pub limiter: Arc<dyn LimiterBackend>,
    pub chooser: Arc<ChannelChooser>,
    pub group_ratios: Arc<GroupRatioTable>,
    pub batch: Option<Arc<BatchAggregator>>,
    pub ledger: QuotaLedger,
    pub processor: Arc<RelayProcessor>,
    /// 是否使用了分布式缓存
    pub distributed: bool,
    tasks: BackgroundTasks,
}

/// 共享缓存与限流后端
struct Backends {
    cache: SharedCacheRef,
    memory_cache: Option<Arc<MemoryCache>>,
    limiter: Arc<dyn LimiterBackend>,
    memory_limiter: bool,
}

impl Backends {
    fn in_process() -> Self {
        let cache = Arc::new(MemoryCache::new());
        Self {
            cache: cache.clone(),
            memory_cache: Some(cache),
            limiter: Arc::new(MemoryLimiterBackend::new()),
            memory_limiter: true,
        }
    }

    async fn connect(config: &Config) -> Self {
        let Some(url) = config.cache.redis_url.as_deref() else {
            info!("[APP] 未配置 Redis，使用进程内缓存和限流");
            return Self::in_process();
        };

        let connected =
            tokio::time::timeout(REDIS_CONNECT_TIMEOUT, RedisCache::connect(url, &config.cache.key_prefix)).await;
        match connected {
            Ok(Ok(redis)) => {
                info!("[APP] 已连接 Redis，缓存和限流状态在副本间共享");
                let limiter = Arc::new(
                    RedisLimiterBackend::new(redis.connection()).with_key_prefix(config.cache.key_prefix.clone()),
                );
                Self {
                    cache: Arc::new(redis),
                    memory_cache: None,
                    limiter,
                    memory_limiter: false,
                }
            }
            Ok(Err(e)) => {
                warn!("[APP] 连接 Redis 失败，退回进程内实现: {}", e);
                Self::in_process()
            }
            Err(_) => {
                warn!("[APP] 连接 Redis 超时，退回进程内实现");
                Self::in_process()
            }
        }
    }
}

impl GatewayState {
    /// 装配所有组件并启动后台任务
    pub async fn bootstrap(config: Config) -> Result<Self> {
        config.validate().context("配置校验失败")?;

        let db = open_database(&config.database.path)
            .with_context(|| format!("打开数据库失败: {}", config.database.path))?;

        let backends = Backends::connect(&config).await;
        let distributed = backends.memory_cache.is_none();
        let lookup = AccountLookup::new(
            db.clone(),
            Some(backends.cache.clone()),
            Duration::from_secs(config.cache.default_ttl_secs),
        );

        let chooser = Arc::new(ChannelChooser::from_config(&config.routing));
        let stats = chooser
            .load(&SqliteRoutingSource::new(db.clone()))
            .context("加载路由表失败")?;
        info!(
            "[APP] 路由表已加载: {} 个渠道, {} 个分组",
            stats.channels, stats.groups
        );

        let group_ratios = Arc::new(GroupRatioTable::new(config.group_ratios.clone()));
        let pricing = StaticPricing::new(config.pricing.clone());
        let mut ledger = QuotaLedger::new(
            lookup.clone(),
            Arc::new(pricing),
            group_ratios.clone(),
            config.quota.clone(),
        );
        let batch = if config.quota.batch_update_enabled {
            let batch = Arc::new(BatchAggregator::new(db.clone()));
            ledger = ledger.with_batch(batch.clone());
            Some(batch)
        } else {
            None
        };

        let processor = Arc::new(RelayProcessor::new(
            lookup.clone(),
            backends.limiter.clone(),
            chooser.clone(),
            ledger.clone(),
            &config,
        ));

        let mut tasks = BackgroundTasks::new();
        if let Some(batch) = &batch {
            tasks.push(
                "batch_flush",
                batch.spawn_flush_task(period(config.quota.batch_update_interval_secs)),
            );
        }
        tasks.push(
            "cooldown_sweep",
            spawn_cooldown_sweep_task(chooser.clone(), period(config.routing.cooldown_sweep_interval_secs)),
        );
        if config.routing.sync_interval_secs > 0 {
            tasks.push(
                "routing_sync",
                spawn_sync_task(
                    chooser.clone(),
                    Arc::new(SqliteRoutingSource::new(db.clone())),
                    period(config.routing.sync_interval_secs),
                ),
            );
        }
        if backends.memory_limiter {
            tasks.push(
                "limiter_sweep",
                spawn_sweep_task(backends.limiter.clone(), period(config.rate_limit.sweep_interval_secs)),
            );
        }
        if let Some(cache) = backends.memory_cache {
            tasks.push(
                "cache_purge",
                spawn_cache_purge_task(cache, period(config.cache.default_ttl_secs)),
            );
        }

        info!(
            "[APP] 网关已启动: 准入步骤 {:?}, 后台任务 {:?}",
            processor.step_names(),
            tasks.names()
        );
        Ok(Self {
            config,
            db,
            lookup,
            limiter: backends.limiter,
            chooser,
            group_ratios,
            batch,
            ledger,
            processor,
            distributed,
            tasks,
        })
    }

    /// 从数据库重新加载路由表
    pub fn reload_routing(&self) -> Result<()> {
        self.chooser
            .load(&SqliteRoutingSource::new(self.db.clone()))
            .context("重新加载路由表失败")?;
        Ok(())
    }

    /// 替换分组倍率，新请求立即生效
    pub fn reload_group_ratios(&self, ratios: HashMap<String, f64>) {
        self.group_ratios.reload(ratios);
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.names()
    }

    /// 停止后台任务并刷写未落库的增量
    pub async fn shutdown(&mut self) {
        self.tasks.shutdown().await;
        if let Some(batch) = &self.batch {
            let stats = batch.flush();
            info!(
                "[APP] 关闭前刷写增量: 成功 {}, 失败 {}",
                stats.applied, stats.failed
            );
        }
        info!("[APP] 网关已关闭");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycast_core::config::ModelPrice;
    use relaycast_core::database::dao::{AbilityDao, ChannelDao, TokenDao, UserDao};
    use relaycast_core::database::lock_db;
    use relaycast_core::models::{Channel, Token, User};
    use relaycast_processor::RelayRequest;
    use relaycast_quota::Usage;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.database.path = ":memory:".to_string();
        config.pricing = HashMap::from([("gpt-4o".to_string(), ModelPrice::new(1.0, 2.0))]);
        config.quota.batch_update_enabled = true;
        config
    }

    fn seed(state: &GatewayState) {
        let conn = lock_db(&state.db).unwrap();
        UserDao::insert(&conn, &User::new(1, "alice", "default", 10_000)).unwrap();
        TokenDao::insert(&conn, &Token::new(1, 1, "sk-alice-0001", 1_000)).unwrap();
        let channel = Channel::new(1, "primary", "default", "gpt-4o");
        ChannelDao::insert(&conn, &channel).unwrap();
        AbilityDao::rebuild_for_channel(&conn, &channel).unwrap();
    }

    #[tokio::test]
    async fn test_bootstrap_without_redis() {
        let mut state = GatewayState::bootstrap(test_config()).await.unwrap();
        assert!(!state.distributed);
        assert_eq!(
            state.task_names(),
            vec!["batch_flush", "cooldown_sweep", "routing_sync", "limiter_sweep", "cache_purge"]
        );
        assert_eq!(state.chooser.snapshot().channel_count(), 0);
        state.shutdown().await;
        assert!(state.task_names().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back() {
        let mut config = test_config();
        config.cache.redis_url = Some("redis://127.0.0.1:1/".to_string());
        let mut state = GatewayState::bootstrap(config).await.unwrap();
        assert!(!state.distributed);
        assert!(state.task_names().contains(&"limiter_sweep"));
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_request_lifecycle_flushed_on_shutdown() {
        let mut state = GatewayState::bootstrap(test_config()).await.unwrap();
        seed(&state);
        state.reload_routing().unwrap();

        let admission = state
            .processor
            .admit(RelayRequest::new("sk-alice-0001", "gpt-4o", 100))
            .await
            .unwrap();
        assert_eq!(admission.channel.id, 1);
        state
            .processor
            .complete(admission, Usage::new(100, 50))
            .unwrap()
            .await
            .unwrap();

        // 用户余额增量仍在聚合器中
        {
            let conn = lock_db(&state.db).unwrap();
            assert_eq!(UserDao::get_quota(&conn, 1).unwrap(), Some(10_000));
        }
        state.shutdown().await;
        let conn = lock_db(&state.db).unwrap();
        assert_eq!(UserDao::get_quota(&conn, 1).unwrap(), Some(9_800));
        let token = TokenDao::get_by_id(&conn, 1).unwrap().unwrap();
        assert_eq!(token.remain_quota, 800);
        let channel = ChannelDao::get_by_id(&conn, 1).unwrap().unwrap();
        assert_eq!(channel.used_quota, 200);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = test_config();
        config.rate_limit.burst_multiplier = 0;
        assert!(GatewayState::bootstrap(config).await.is_err());
    }
}
