//! 限流器

use crate::backend::{Decision, LimiterBackend};
use crate::error::LimiterResult;
use crate::key::LimiterKey;
use crate::strategy::LimitStrategy;
use relaycast_core::config::RateLimitConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 绑定了策略的限流器
///
/// 构造开销只是一次 `Arc` 克隆，可以按请求创建。
#[derive(Clone)]
pub struct RateLimiter {
    backend: Arc<dyn LimiterBackend>,
    strategy: LimitStrategy,
}

impl RateLimiter {
    pub fn new(backend: Arc<dyn LimiterBackend>, strategy: LimitStrategy) -> Self {
        Self { backend, strategy }
    }

    /// 按每分钟请求数创建
    pub fn for_rpm(backend: Arc<dyn LimiterBackend>, rpm: u32, config: &RateLimitConfig) -> Self {
        Self::new(backend, LimitStrategy::for_rpm(rpm, config))
    }

    pub fn strategy(&self) -> &LimitStrategy {
        &self.strategy
    }

    pub async fn allow(&self, key: &LimiterKey) -> bool {
        self.allow_n(key, 1).await
    }

    /// 判定是否放行 `n` 个请求
    ///
    /// 后端不可用或脚本出错时拒绝。
    pub async fn allow_n(&self, key: &LimiterKey, n: u32) -> bool {
        match self.check_n(key, n).await {
            Ok(decision) => {
                if !decision.allowed {
                    debug!(
                        "[LIMITER] 拒绝: key={}, strategy={}, n={}, remaining={}",
                        key, self.strategy, n, decision.remaining
                    );
                }
                decision.allowed
            }
            Err(e) => {
                warn!(
                    "[LIMITER] 限流后端 {} 异常，拒绝请求: key={}, error={}",
                    self.backend.name(),
                    key,
                    e
                );
                false
            }
        }
    }

    /// 返回完整判定结果，错误原样返回
    pub async fn check_n(&self, key: &LimiterKey, n: u32) -> LimiterResult<Decision> {
        if self.strategy == LimitStrategy::Unlimited {
            return Ok(Decision::allowed(u64::MAX));
        }
        self.backend.acquire(key, &self.strategy, n).await
    }
}

/// 启动定时清理空闲限流状态的任务
pub fn spawn_sweep_task(backend: Arc<dyn LimiterBackend>, period: Duration) -> JoinHandle<()> {
    info!("[LIMITER] 启动限流状态清理任务，后端 {}，周期 {:?}", backend.name(), period);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            backend.sweep().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryLimiterBackend;
    use crate::error::LimiterError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct BrokenBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LimiterBackend for BrokenBackend {
        async fn acquire(
            &self,
            _key: &LimiterKey,
            _strategy: &LimitStrategy,
            _n: u32,
        ) -> LimiterResult<Decision> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LimiterError::Backend("connection refused".to_string()))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_backend_error_denies() {
        let backend = Arc::new(BrokenBackend {
            calls: AtomicUsize::new(0),
        });
        let limiter = RateLimiter::for_rpm(backend.clone(), 60, &RateLimitConfig::default());

        assert!(!limiter.allow(&LimiterKey::relay("default", 1)).await);
        assert!(limiter.check_n(&LimiterKey::relay("default", 1), 1).await.is_err());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unlimited_skips_backend() {
        let backend = Arc::new(BrokenBackend {
            calls: AtomicUsize::new(0),
        });
        let limiter = RateLimiter::for_rpm(backend.clone(), 0, &RateLimitConfig::default());

        assert!(limiter.allow_n(&LimiterKey::relay("default", 1), 1_000).await);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_groups_do_not_share_counters() {
        let backend: Arc<dyn LimiterBackend> = Arc::new(MemoryLimiterBackend::new());
        let limiter = RateLimiter::for_rpm(backend, 2, &RateLimitConfig::default());

        let default_key = LimiterKey::relay("default", 1);
        let vip_key = LimiterKey::relay("vip", 1);
        assert!(limiter.allow_n(&default_key, 2).await);
        assert!(!limiter.allow(&default_key).await);
        assert!(limiter.allow(&vip_key).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_task_bounds_memory() {
        let memory = Arc::new(MemoryLimiterBackend::new());
        let limiter = RateLimiter::for_rpm(memory.clone(), 10, &RateLimitConfig::default());
        for user in 0..5 {
            assert!(limiter.allow(&LimiterKey::relay("default", user)).await);
        }
        assert_eq!(memory.len(), 5);

        let handle = spawn_sweep_task(memory.clone(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(181)).await;
        assert!(memory.is_empty());
        handle.abort();
    }
}
