//! 限流策略

use relaycast_core::config::RateLimitConfig;
use std::fmt;
use std::time::Duration;

/// 限流策略
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LimitStrategy {
    /// 不限流
    Unlimited,
    /// 固定窗口：窗口内累计请求数不超过 `limit`
    FixedWindow { limit: u64, window: Duration },
    /// 令牌桶：按 `rate` 每秒补充，最多 `burst` 个
    TokenBucket { rate: f64, burst: f64 },
    /// 滑动窗口：任意长度为 `window` 的区间内请求数不超过 `limit`
    SlidingWindow { limit: u64, window: Duration },
}

impl LimitStrategy {
    /// 根据每分钟请求数选择策略
    ///
    /// rpm 为 0 表示不限流；不超过阈值使用固定窗口，否则使用令牌桶。
    pub fn for_rpm(rpm: u32, config: &RateLimitConfig) -> Self {
        if rpm == 0 {
            return LimitStrategy::Unlimited;
        }
        if rpm <= config.fixed_window_threshold {
            let window = Duration::from_secs(config.window_secs.max(1));
            // 窗口不是一分钟时按比例换算窗口内上限
            let limit = (rpm as u64 * window.as_secs()).div_ceil(60).max(1);
            LimitStrategy::FixedWindow { limit, window }
        } else {
            let rate = rpm as f64 / 60.0;
            LimitStrategy::TokenBucket {
                rate,
                burst: rate * config.burst_multiplier.max(1) as f64,
            }
        }
    }

    pub fn sliding(limit: u64, window: Duration) -> Self {
        LimitStrategy::SlidingWindow { limit, window }
    }

    /// 存储键标签
    pub fn tag(&self) -> &'static str {
        match self {
            LimitStrategy::Unlimited => "none",
            LimitStrategy::FixedWindow { .. } => "fw",
            LimitStrategy::TokenBucket { .. } => "tb",
            LimitStrategy::SlidingWindow { .. } => "sw",
        }
    }

    /// 状态有意义的时间跨度；令牌桶为从空到满的补充时间
    pub fn window(&self) -> Duration {
        match self {
            LimitStrategy::Unlimited => Duration::ZERO,
            LimitStrategy::FixedWindow { window, .. } | LimitStrategy::SlidingWindow { window, .. } => {
                *window
            }
            LimitStrategy::TokenBucket { rate, burst } => {
                if *rate > 0.0 {
                    Duration::from_secs_f64((burst / rate).max(1.0))
                } else {
                    Duration::from_secs(60)
                }
            }
        }
    }

    /// 空闲超过该时长的状态可以丢弃
    pub fn idle_ttl(&self) -> Duration {
        self.window() * 2
    }

    /// 获取显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            LimitStrategy::Unlimited => "不限流",
            LimitStrategy::FixedWindow { .. } => "固定窗口",
            LimitStrategy::TokenBucket { .. } => "令牌桶",
            LimitStrategy::SlidingWindow { .. } => "滑动窗口",
        }
    }
}

impl fmt::Display for LimitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitStrategy::Unlimited => write!(f, "{}", self.display_name()),
            LimitStrategy::FixedWindow { limit, window }
            | LimitStrategy::SlidingWindow { limit, window } => {
                write!(f, "{}({}/{}s)", self.display_name(), limit, window.as_secs())
            }
            LimitStrategy::TokenBucket { rate, burst } => {
                write!(f, "{}({:.2}/s, burst {:.0})", self.display_name(), rate, burst)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sixty_rpm_uses_fixed_window() {
        let config = RateLimitConfig::default();
        assert_eq!(
            LimitStrategy::for_rpm(60, &config),
            LimitStrategy::FixedWindow {
                limit: 60,
                window: Duration::from_secs(60)
            }
        );
        assert_eq!(
            LimitStrategy::for_rpm(30, &config),
            LimitStrategy::FixedWindow {
                limit: 30,
                window: Duration::from_secs(60)
            }
        );
    }

    #[test]
    fn test_high_rpm_uses_token_bucket() {
        let config = RateLimitConfig::default();
        match LimitStrategy::for_rpm(600, &config) {
            LimitStrategy::TokenBucket { rate, burst } => {
                assert!((rate - 10.0).abs() < f64::EPSILON);
                assert!((burst - 100.0).abs() < f64::EPSILON);
            }
            other => panic!("unexpected strategy {other}"),
        }
    }

    #[test]
    fn test_zero_rpm_is_unlimited() {
        assert_eq!(
            LimitStrategy::for_rpm(0, &RateLimitConfig::default()),
            LimitStrategy::Unlimited
        );
    }

    #[test]
    fn test_short_window_scales_limit() {
        let config = RateLimitConfig {
            window_secs: 10,
            ..RateLimitConfig::default()
        };
        assert_eq!(
            LimitStrategy::for_rpm(30, &config),
            LimitStrategy::FixedWindow {
                limit: 5,
                window: Duration::from_secs(10)
            }
        );
    }

    #[test]
    fn test_idle_ttl_is_twice_the_window() {
        let strategy = LimitStrategy::sliding(10, Duration::from_secs(30));
        assert_eq!(strategy.idle_ttl(), Duration::from_secs(60));
        let bucket = LimitStrategy::TokenBucket { rate: 2.0, burst: 20.0 };
        assert_eq!(bucket.idle_ttl(), Duration::from_secs(20));
    }

    proptest! {
        #[test]
        fn prop_strategy_follows_threshold(rpm in 1u32..100_000) {
            let config = RateLimitConfig::default();
            match LimitStrategy::for_rpm(rpm, &config) {
                LimitStrategy::FixedWindow { limit, .. } => {
                    prop_assert!(rpm <= config.fixed_window_threshold);
                    prop_assert_eq!(limit, rpm as u64);
                }
                LimitStrategy::TokenBucket { rate, burst } => {
                    prop_assert!(rpm > config.fixed_window_threshold);
                    prop_assert!(burst >= rate);
                }
                other => prop_assert!(false, "unexpected strategy {}", other),
            }
        }
    }
}
