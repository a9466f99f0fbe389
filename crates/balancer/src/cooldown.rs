//! (渠道, 模型) 冷却登记
//!
//! 上游失败后，对应的 (渠道, 模型) 在冷却期内不参与该模型的选择。
//! 读写频率极高，使用分片并发表，过期条目在读取时视为不存在并由定时任务清理。

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
pub struct CooldownRegistry {
    entries: DashMap<(i64, String), Instant>,
    default_ttl: Duration,
}

impl CooldownRegistry {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// 以默认时长冷却
    pub fn mark(&self, channel_id: i64, model: &str) {
        self.mark_for(channel_id, model, self.default_ttl);
    }

    /// 冷却指定时长，已有更晚的到期时间时保留较晚者
    pub fn mark_for(&self, channel_id: i64, model: &str, ttl: Duration) {
        let until = Instant::now() + ttl;
        self.entries
            .entry((channel_id, model.to_string()))
            .and_modify(|expiry| {
                if *expiry < until {
                    *expiry = until;
                }
            })
            .or_insert(until);
        debug!("[ROUTER] 渠道冷却: channel_id={}, model={}, ttl={:?}", channel_id, model, ttl);
    }

    pub fn is_cooling(&self, channel_id: i64, model: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(&(channel_id, model.to_string()))
            .map(|expiry| *expiry > now)
            .unwrap_or(false)
    }

    /// 解除冷却
    pub fn clear(&self, channel_id: i64, model: &str) {
        self.entries.remove(&(channel_id, model.to_string()));
    }

    /// 清理过期条目，返回清理数量
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, expiry| *expiry > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
