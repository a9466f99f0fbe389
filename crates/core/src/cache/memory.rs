//! 进程内共享缓存
//!
//! 每个键的读改写都在 DashMap 分片锁内完成，对同一进程内的并发调用是原子的，
//! 但不能跨副本共享。

use super::{CacheError, CacheResult, DecrOutcome, SharedCache};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清理过期条目，返回清理数量
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_int(raw: &str) -> CacheResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| CacheError::NotInteger(raw.to_string()))
}

#[async_trait]
impl SharedCache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone());
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn decr_if_sufficient(&self, key: &str, amount: i64) -> CacheResult<DecrOutcome> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_live(now) {
                    occupied.remove();
                    return Ok(DecrOutcome::Missing);
                }
                let balance = parse_int(&occupied.get().value)?;
                if balance < amount {
                    return Ok(DecrOutcome::Insufficient { balance });
                }
                occupied.get_mut().value = (balance - amount).to_string();
                Ok(DecrOutcome::Applied { before: balance })
            }
            Entry::Vacant(_) => Ok(DecrOutcome::Missing),
        }
    }

    async fn incr_if_present(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                let next = parse_int(&entry.value)? + delta;
                entry.value = next.to_string();
                Ok(Some(next))
            }
            _ => Ok(None),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
