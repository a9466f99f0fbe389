//! Redis 限流后端
//!
//! 每次判定是一次 Lua 脚本调用，读取、计算和写回在服务端原子完成。
//! 时间取自 Redis `TIME`，多副本之间不受本地时钟偏差影响。

use super::{Decision, LimiterBackend};
use crate::error::LimiterResult;
use crate::key::LimiterKey;
use crate::strategy::LimitStrategy;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use relaycast_core::cache::redis_cache::format_key;
use redis::Script;
use std::time::Duration;

/// 固定窗口：键在首次计数时设置过期，过期即进入下一个窗口
static FIXED_WINDOW: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local n = tonumber(ARGV[1])
local limit = tonumber(ARGV[2])
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current + n > limit then
    return {0, limit - current}
end
current = redis.call('INCRBY', KEYS[1], n)
if redis.call('PTTL', KEYS[1]) < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[3])
end
return {1, limit - current}
"#,
    )
});

static TOKEN_BUCKET: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.replicate_commands then
    redis.replicate_commands()
end
local rate = tonumber(ARGV[1])
local burst = tonumber(ARGV[2])
local n = tonumber(ARGV[3])
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000000 + tonumber(t[2])
local state = redis.call('HMGET', KEYS[1], 'tokens', 'ts')
local tokens = tonumber(state[1])
local ts = tonumber(state[2])
if tokens == nil or ts == nil then
    tokens = burst
    ts = now
end
local elapsed = math.max(0, now - ts) / 1000000
tokens = math.min(burst, tokens + elapsed * rate)
local allowed = 0
if tokens >= n then
    tokens = tokens - n
    allowed = 1
end
redis.call('HSET', KEYS[1], 'tokens', tostring(tokens), 'ts', tostring(now))
redis.call('PEXPIRE', KEYS[1], ARGV[4])
return {allowed, math.floor(tokens)}
"#,
    )
});

static SLIDING_WINDOW: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.replicate_commands then
    redis.replicate_commands()
end
local window = tonumber(ARGV[1])
local limit = tonumber(ARGV[2])
local n = tonumber(ARGV[3])
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000000 + tonumber(t[2])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
local count = redis.call('ZCARD', KEYS[1])
if count + n > limit then
    return {0, limit - count}
end
for i = 1, n do
    redis.call('ZADD', KEYS[1], now, ARGV[4] .. ':' .. i)
end
redis.call('PEXPIRE', KEYS[1], math.ceil(window / 1000))
return {1, limit - count - n}
"#,
    )
});

pub struct RedisLimiterBackend {
    connection_manager: ConnectionManager,
    key_prefix: String,
}

impl RedisLimiterBackend {
    /// 复用已建立的连接管理器
    pub fn new(connection_manager: ConnectionManager) -> Self {
        Self {
            connection_manager,
            key_prefix: String::new(),
        }
    }

    /// 与共享缓存使用同一个键前缀，多个部署共用一个 Redis 时互不干扰
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn full_key(&self, key: &LimiterKey, tag: &str) -> String {
        format_key(&self.key_prefix, &key.storage_key(tag))
    }
}

fn millis(duration: Duration) -> u64 {
    (duration.as_millis() as u64).max(1)
}

fn decision(allowed: i64, remaining: i64) -> Decision {
    let remaining = remaining.max(0) as u64;
    if allowed == 1 {
        Decision::allowed(remaining)
    } else {
        Decision::denied(remaining)
    }
}

#[async_trait]
impl LimiterBackend for RedisLimiterBackend {
    async fn acquire(
        &self,
        key: &LimiterKey,
        strategy: &LimitStrategy,
        n: u32,
    ) -> LimiterResult<Decision> {
        let storage_key = self.full_key(key, strategy.tag());
        let mut conn = self.connection_manager.clone();
        let (allowed, remaining): (i64, i64) = match *strategy {
            LimitStrategy::Unlimited => return Ok(Decision::allowed(u64::MAX)),
            LimitStrategy::FixedWindow { limit, window } => {
                FIXED_WINDOW
                    .key(&storage_key)
                    .arg(n)
                    .arg(limit)
                    .arg(millis(window))
                    .invoke_async(&mut conn)
                    .await?
            }
            LimitStrategy::TokenBucket { rate, burst } => {
                TOKEN_BUCKET
                    .key(&storage_key)
                    .arg(rate)
                    .arg(burst)
                    .arg(n)
                    .arg(millis(strategy.idle_ttl()))
                    .invoke_async(&mut conn)
                    .await?
            }
            LimitStrategy::SlidingWindow { limit, window } => {
                let micros = window.as_micros() as u64;
                SLIDING_WINDOW
                    .key(&storage_key)
                    .arg(micros)
                    .arg(limit)
                    .arg(n)
                    .arg(uuid::Uuid::new_v4().to_string())
                    .invoke_async(&mut conn)
                    .await?
            }
        };
        Ok(decision(allowed, remaining))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
