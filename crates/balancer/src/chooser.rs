//! 渠道选择器
//!
//! 读多写少：选择时只在读锁内克隆一次快照的 `Arc`，
//! 重载时在锁外构建完整的新快照，再在短暂的写锁内整体替换。

use crate::cooldown::CooldownRegistry;
use crate::error::{BalancerError, BalancerResult};
use crate::filter::ChannelFilter;
use crate::snapshot::{ChannelChoice, RoutingSnapshot};
use crate::source::{RoutingSource, SqliteRoutingSource};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use relaycast_core::config::RoutingConfig;
use relaycast_core::database::dao::{AbilityDao, ChannelDao};
use relaycast_core::database::{lock_db, DbConnection};
use relaycast_core::models::{Channel, ChannelStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 一次重载的统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadStats {
    pub channels: usize,
    pub groups: usize,
}

pub struct ChannelChooser {
    snapshot: RwLock<Arc<RoutingSnapshot>>,
    /// 串行化重载
    reload_lock: Mutex<()>,
    cooldowns: CooldownRegistry,
}

impl ChannelChooser {
    pub fn new(cooldown_ttl: Duration) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(RoutingSnapshot::default())),
            reload_lock: Mutex::new(()),
            cooldowns: CooldownRegistry::new(cooldown_ttl),
        }
    }

    pub fn from_config(config: &RoutingConfig) -> Self {
        Self::new(Duration::from_secs(config.cooldown_secs))
    }

    /// 当前快照
    pub fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn cooldowns(&self) -> &CooldownRegistry {
        &self.cooldowns
    }

    /// 从数据源全量重载
    ///
    /// 新快照继承仍然存在的渠道的运行期禁用标记。
    pub fn load(&self, source: &dyn RoutingSource) -> BalancerResult<LoadStats> {
        let _reload = self.reload_lock.lock();
        let (channels, abilities) = source.load().map_err(BalancerError::Load)?;
        let next = RoutingSnapshot::build(channels, &abilities);
        let stats = LoadStats {
            channels: next.channel_count(),
            groups: next.group_count(),
        };

        let mut current = self.snapshot.write();
        for choice in current.choices().filter(|c| c.is_disabled()) {
            if let Some(carried) = next.choice(choice.channel.id) {
                carried.set_disabled(true);
            }
        }
        *current = Arc::new(next);
        drop(current);

        info!(
            "[ROUTER] 路由表已更新: channels={}, groups={}",
            stats.channels, stats.groups
        );
        Ok(stats)
    }

    /// 为 (分组, 模型) 选择一个渠道
    pub fn next(
        &self,
        group: &str,
        model: &str,
        filters: &[&dyn ChannelFilter],
    ) -> BalancerResult<Arc<Channel>> {
        let snapshot = self.snapshot();
        self.select(&snapshot, group, model, filters, &mut rand::thread_rng())
    }

    /// 使用指定随机源选择
    pub fn next_with_rng<R: Rng>(
        &self,
        group: &str,
        model: &str,
        filters: &[&dyn ChannelFilter],
        rng: &mut R,
    ) -> BalancerResult<Arc<Channel>> {
        let snapshot = self.snapshot();
        self.select(&snapshot, group, model, filters, rng)
    }

    fn select<R: Rng>(
        &self,
        snapshot: &RoutingSnapshot,
        group: &str,
        model: &str,
        filters: &[&dyn ChannelFilter],
        rng: &mut R,
    ) -> BalancerResult<Arc<Channel>> {
        let not_found = || BalancerError::NoAvailableChannel {
            group: group.to_string(),
            model: model.to_string(),
        };
        let tiers = snapshot.tiers(group, model).ok_or_else(not_found)?;

        for tier in tiers {
            let candidates: Vec<&Arc<ChannelChoice>> = tier
                .channel_ids
                .iter()
                .filter_map(|id| snapshot.choice(*id))
                .filter(|choice| self.is_eligible(choice, model, filters))
                .collect();
            let weights: Vec<u64> = candidates
                .iter()
                .map(|choice| choice.channel.weight as u64)
                .collect();

            if let Some(index) = pick_weighted(&weights, rng) {
                let channel = candidates[index].channel.clone();
                debug!(
                    "[ROUTER] 选择渠道: group={}, model={}, priority={}, channel_id={}",
                    group, model, tier.priority, channel.id
                );
                return Ok(channel);
            }
            debug!(
                "[ROUTER] 优先级 {} 无可用渠道，尝试下一层级: group={}, model={}",
                tier.priority, group, model
            );
        }

        warn!("[ROUTER] 所有层级均无可用渠道: group={}, model={}", group, model);
        Err(not_found())
    }

    fn is_eligible(&self, choice: &ChannelChoice, model: &str, filters: &[&dyn ChannelFilter]) -> bool {
        choice.is_usable()
            && !self.cooldowns.is_cooling(choice.channel.id, model)
            && filters.iter().all(|filter| filter.accept(&choice.channel))
    }

    /// 按 ID 获取渠道
    pub fn get_channel(&self, channel_id: i64) -> BalancerResult<Arc<Channel>> {
        self.snapshot()
            .choice(channel_id)
            .map(|choice| choice.channel.clone())
            .ok_or(BalancerError::ChannelNotFound(channel_id))
    }

    /// 运行期禁用渠道，不修改持久化状态
    pub fn disable(&self, channel_id: i64) -> BalancerResult<()> {
        self.set_runtime_disabled(channel_id, true)
    }

    /// 解除运行期禁用
    pub fn enable(&self, channel_id: i64) -> BalancerResult<()> {
        self.set_runtime_disabled(channel_id, false)
    }

    pub fn is_runtime_disabled(&self, channel_id: i64) -> BalancerResult<bool> {
        self.snapshot()
            .choice(channel_id)
            .map(|choice| choice.is_disabled())
            .ok_or(BalancerError::ChannelNotFound(channel_id))
    }

    fn set_runtime_disabled(&self, channel_id: i64, disabled: bool) -> BalancerResult<()> {
        // 持有读锁，避免与重载时的标记继承交错
        let snapshot = self.snapshot.read();
        let choice = snapshot
            .choice(channel_id)
            .ok_or(BalancerError::ChannelNotFound(channel_id))?;
        choice.set_disabled(disabled);
        info!(
            "[ROUTER] 渠道运行期状态变更: channel_id={}, disabled={}",
            channel_id, disabled
        );
        Ok(())
    }

    /// 冷却 (渠道, 模型)
    pub fn mark_cooldown(&self, channel_id: i64, model: &str) {
        self.cooldowns.mark(channel_id, model);
    }

    /// 持久化渠道状态并同步到路由表
    ///
    /// 禁用只翻转运行期标记；启用需要重新收录能力行，因此触发一次全量重载。
    pub fn set_channel_status(
        &self,
        db: &DbConnection,
        channel_id: i64,
        status: ChannelStatus,
    ) -> BalancerResult<()> {
        {
            let conn = lock_db(db).map_err(BalancerError::Load)?;
            let found = ChannelDao::update_status(&conn, channel_id, status)
                .map_err(|e| BalancerError::Load(format!("更新渠道状态失败: {e}")))?;
            if !found {
                return Err(BalancerError::ChannelNotFound(channel_id));
            }
            AbilityDao::update_enabled_for_channel(&conn, channel_id, status.is_enabled())
                .map_err(|e| BalancerError::Load(format!("更新路由能力失败: {e}")))?;
        }

        if status.is_enabled() {
            self.load(&SqliteRoutingSource::new(db.clone()))?;
            // 重载继承了旧标记，这里显式解除；渠道在重载前被删除时不在路由表中
            if let Err(e) = self.enable(channel_id) {
                debug!("[ROUTER] 启用的渠道不在当前路由表中: {}", e);
            }
        } else if let Err(e) = self.disable(channel_id) {
            debug!("[ROUTER] 渠道不在当前路由表中: {}", e);
        }
        info!("[ROUTER] 渠道状态已更新: channel_id={}, status={}", channel_id, status);
        Ok(())
    }

    /// 因不可恢复的上游错误自动禁用渠道
    ///
    /// 渠道未开启自动禁用时只返回 `false`。
    pub fn auto_disable(&self, db: &DbConnection, channel_id: i64, reason: &str) -> BalancerResult<bool> {
        let channel = self.get_channel(channel_id)?;
        if !channel.auto_ban {
            debug!("[ROUTER] 渠道未开启自动禁用: channel_id={}", channel_id);
            return Ok(false);
        }
        warn!(
            "[ROUTER] 自动禁用渠道: channel_id={}, name={}, reason={}",
            channel_id, channel.name, reason
        );
        self.set_channel_status(db, channel_id, ChannelStatus::AutoDisabled)?;
        Ok(true)
    }
}

/// 在 [0, 总权重) 内均匀抽取，依次减去候选权重，首个使余数小于 0 的候选胜出
///
/// 总权重为 0 时返回 `None`。
pub fn pick_weighted<R: Rng>(weights: &[u64], rng: &mut R) -> Option<usize> {
    let total: u64 = weights.iter().sum();
    if total == 0 {
        return None;
    }
    let mut remainder = rng.gen_range(0..total) as i128;
    for (index, weight) in weights.iter().enumerate() {
        remainder -= *weight as i128;
        if remainder < 0 {
            return Some(index);
        }
    }
    None
}
