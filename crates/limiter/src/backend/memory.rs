//! 进程内限流后端
//!
//! 每个键持有一把独立的互斥锁，算法与 Redis 后端一致。
//! 只能保证单进程内的正确性，多副本部署需要 Redis。

use super::{Decision, LimiterBackend};
use crate::error::LimiterResult;
use crate::key::LimiterKey;
use crate::strategy::LimitStrategy;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
enum LimiterState {
    Fixed { window_start: Instant, count: u64 },
    Bucket { tokens: f64, last_refill: Instant },
    Sliding { hits: VecDeque<Instant> },
}

#[derive(Debug)]
struct Slot {
    state: Option<LimiterState>,
    last_seen: Instant,
    idle_ttl: Duration,
}

impl Slot {
    fn new(now: Instant) -> Self {
        Self {
            state: None,
            last_seen: now,
            idle_ttl: Duration::ZERO,
        }
    }

    fn acquire(&mut self, strategy: &LimitStrategy, n: u64, now: Instant) -> Decision {
        self.last_seen = now;
        self.idle_ttl = strategy.idle_ttl();
        match *strategy {
            LimitStrategy::Unlimited => Decision::allowed(u64::MAX),
            LimitStrategy::FixedWindow { limit, window } => {
                let (window_start, count) = match self.state.take() {
                    Some(LimiterState::Fixed { window_start, count })
                        if now.duration_since(window_start) < window =>
                    {
                        (window_start, count)
                    }
                    _ => (now, 0),
                };
                let (decision, count) = if count + n > limit {
                    (Decision::denied(limit.saturating_sub(count)), count)
                } else {
                    (Decision::allowed(limit - count - n), count + n)
                };
                self.state = Some(LimiterState::Fixed { window_start, count });
                decision
            }
            LimitStrategy::TokenBucket { rate, burst } => {
                let (mut tokens, last_refill) = match self.state.take() {
                    Some(LimiterState::Bucket { tokens, last_refill }) => (tokens, last_refill),
                    _ => (burst, now),
                };
                let elapsed = now.duration_since(last_refill).as_secs_f64();
                tokens = (tokens + elapsed * rate).min(burst);
                let needed = n as f64;
                let decision = if tokens >= needed {
                    tokens -= needed;
                    Decision::allowed(tokens.floor() as u64)
                } else {
                    Decision::denied(tokens.floor() as u64)
                };
                self.state = Some(LimiterState::Bucket {
                    tokens,
                    last_refill: now,
                });
                decision
            }
            LimitStrategy::SlidingWindow { limit, window } => {
                let mut hits = match self.state.take() {
                    Some(LimiterState::Sliding { hits }) => hits,
                    _ => VecDeque::new(),
                };
                while let Some(front) = hits.front() {
                    if now.duration_since(*front) >= window {
                        hits.pop_front();
                    } else {
                        break;
                    }
                }
                let count = hits.len() as u64;
                let decision = if count + n > limit {
                    Decision::denied(limit.saturating_sub(count))
                } else {
                    hits.extend(std::iter::repeat(now).take(n as usize));
                    Decision::allowed(limit - count - n)
                };
                self.state = Some(LimiterState::Sliding { hits });
                decision
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryLimiterBackend {
    slots: DashMap<LimiterKey, Arc<Mutex<Slot>>>,
}

impl MemoryLimiterBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, key: &LimiterKey, now: Instant) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.slots.get(key) {
            return slot.clone();
        }
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Slot::new(now))))
            .clone()
    }
}

#[async_trait]
impl LimiterBackend for MemoryLimiterBackend {
    async fn acquire(
        &self,
        key: &LimiterKey,
        strategy: &LimitStrategy,
        n: u32,
    ) -> LimiterResult<Decision> {
        let now = Instant::now();
        let slot = self.slot(key, now);
        let decision = slot.lock().acquire(strategy, n as u64, now);
        Ok(decision)
    }

    async fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| {
            // 仍被调用方持有的槽位保留
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let slot = slot.lock();
            now.duration_since(slot.last_seen) <= slot.idle_ttl
        });
        let removed = before.saturating_sub(self.slots.len());
        if removed > 0 {
            debug!("[LIMITER] 清理空闲限流状态 {} 个", removed);
        }
        removed
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycast_core::config::RateLimitConfig;

    fn fixed(limit: u64, secs: u64) -> LimitStrategy {
        LimitStrategy::FixedWindow {
            limit,
            window: Duration::from_secs(secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixty_rpm_denies_sixty_first_call_until_next_window() {
        let backend = MemoryLimiterBackend::new();
        let strategy = LimitStrategy::for_rpm(60, &RateLimitConfig::default());
        let key = LimiterKey::relay("default", 1);

        for _ in 0..60 {
            assert!(backend.acquire(&key, &strategy, 1).await.unwrap().allowed);
        }
        assert!(!backend.acquire(&key, &strategy, 1).await.unwrap().allowed);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(backend.acquire(&key, &strategy, 1).await.unwrap().allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_acquire_n() {
        let backend = MemoryLimiterBackend::new();
        let key = LimiterKey::new("r", "i");
        let strategy = fixed(10, 60);

        assert_eq!(
            backend.acquire(&key, &strategy, 7).await.unwrap(),
            Decision::allowed(3)
        );
        // 拒绝的请求不计入窗口
        assert_eq!(
            backend.acquire(&key, &strategy, 4).await.unwrap(),
            Decision::denied(3)
        );
        assert!(backend.acquire(&key, &strategy, 3).await.unwrap().allowed);
        assert!(!backend.acquire(&key, &strategy, 11).await.unwrap().allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_refills_over_time() {
        let backend = MemoryLimiterBackend::new();
        let key = LimiterKey::new("r", "i");
        let strategy = LimitStrategy::TokenBucket {
            rate: 2.0,
            burst: 4.0,
        };

        for _ in 0..4 {
            assert!(backend.acquire(&key, &strategy, 1).await.unwrap().allowed);
        }
        assert!(!backend.acquire(&key, &strategy, 1).await.unwrap().allowed);

        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert!(backend.acquire(&key, &strategy, 2).await.unwrap().allowed);
        assert!(!backend.acquire(&key, &strategy, 1).await.unwrap().allowed);

        // 补充不超过容量
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(
            backend.acquire(&key, &strategy, 4).await.unwrap(),
            Decision::allowed(0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window_evicts_old_hits() {
        let backend = MemoryLimiterBackend::new();
        let key = LimiterKey::new("r", "i");
        let strategy = LimitStrategy::sliding(3, Duration::from_secs(10));

        assert!(backend.acquire(&key, &strategy, 2).await.unwrap().allowed);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(backend.acquire(&key, &strategy, 1).await.unwrap().allowed);
        assert!(!backend.acquire(&key, &strategy, 1).await.unwrap().allowed);

        // 最早的两次命中滑出窗口
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(backend.acquire(&key, &strategy, 2).await.unwrap().allowed);
        assert!(!backend.acquire(&key, &strategy, 1).await.unwrap().allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_strategy_change_resets_state() {
        let backend = MemoryLimiterBackend::new();
        let key = LimiterKey::new("r", "i");

        assert!(backend.acquire(&key, &fixed(1, 60), 1).await.unwrap().allowed);
        assert!(!backend.acquire(&key, &fixed(1, 60), 1).await.unwrap().allowed);
        let bucket = LimitStrategy::TokenBucket {
            rate: 1.0,
            burst: 1.0,
        };
        assert!(backend.acquire(&key, &bucket, 1).await.unwrap().allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_idle_entries() {
        let backend = MemoryLimiterBackend::new();
        let strategy = fixed(5, 10);
        backend
            .acquire(&LimiterKey::new("r", "old"), &strategy, 1)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(15)).await;
        backend
            .acquire(&LimiterKey::new("r", "new"), &strategy, 1)
            .await
            .unwrap();
        assert_eq!(backend.sweep().await, 0);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(backend.sweep().await, 1);
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_never_exceeds_limit() {
        let backend = Arc::new(MemoryLimiterBackend::new());
        let strategy = fixed(25, 3600);
        let key = LimiterKey::new("relay:default", "user:1");

        let mut handles = Vec::new();
        for _ in 0..200 {
            let backend = backend.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                backend.acquire(&key, &strategy, 1).await.unwrap().allowed
            }));
        }
        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 25);
    }
}
