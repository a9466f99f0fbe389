//! 路由表快照
//!
//! 快照构建后不再修改（渠道的运行期禁用标记除外），重载时整体替换。

use relaycast_core::models::{Ability, Channel};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 渠道运行期包装
///
/// `disabled` 与持久化状态无关，用于检测到故障后立即摘除渠道而不必全量重载。
#[derive(Debug)]
pub struct ChannelChoice {
    pub channel: Arc<Channel>,
    disabled: AtomicBool,
}

impl ChannelChoice {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel: Arc::new(channel),
            disabled: AtomicBool::new(false),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Release);
    }

    /// 持久化状态启用且未被运行期禁用
    pub fn is_usable(&self) -> bool {
        self.channel.status.is_enabled() && !self.is_disabled()
    }
}

/// 同一优先级的渠道
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    pub priority: i64,
    pub channel_ids: Vec<i64>,
}

/// 通配模型键，`prefix` 为去掉末尾 `*` 的部分
#[derive(Debug, Clone, PartialEq, Eq)]
struct WildcardKey {
    prefix: String,
    pattern: String,
}

#[derive(Debug, Default)]
pub struct RoutingSnapshot {
    /// 分组 → 模型键 → 按优先级降序的层级
    table: HashMap<String, HashMap<String, Vec<Tier>>>,
    choices: HashMap<i64, Arc<ChannelChoice>>,
    /// 分组 → 通配模型键，按前缀长度降序
    wildcards: HashMap<String, Vec<WildcardKey>>,
}

impl RoutingSnapshot {
    /// 从渠道和能力行构建快照
    ///
    /// 只收录启用的能力行；引用不存在渠道的能力行被忽略。
    pub fn build(channels: Vec<Channel>, abilities: &[Ability]) -> Self {
        let choices: HashMap<i64, Arc<ChannelChoice>> = channels
            .into_iter()
            .map(|channel| (channel.id, Arc::new(ChannelChoice::new(channel))))
            .collect();

        let mut grouped: HashMap<String, HashMap<String, Vec<(i64, i64)>>> = HashMap::new();
        for ability in abilities {
            if !ability.enabled || !choices.contains_key(&ability.channel_id) {
                continue;
            }
            grouped
                .entry(ability.group.clone())
                .or_default()
                .entry(ability.model.clone())
                .or_default()
                .push((ability.priority, ability.channel_id));
        }

        let mut table = HashMap::new();
        let mut wildcards: HashMap<String, Vec<WildcardKey>> = HashMap::new();
        for (group, models) in grouped {
            let mut model_table = HashMap::new();
            for (model, mut entries) in models {
                entries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
                entries.dedup();
                let mut tiers: Vec<Tier> = Vec::new();
                for (priority, channel_id) in entries {
                    match tiers.last_mut() {
                        Some(tier) if tier.priority == priority => tier.channel_ids.push(channel_id),
                        _ => tiers.push(Tier {
                            priority,
                            channel_ids: vec![channel_id],
                        }),
                    }
                }
                if let Some(prefix) = model.strip_suffix('*') {
                    wildcards.entry(group.clone()).or_default().push(WildcardKey {
                        prefix: prefix.to_string(),
                        pattern: model.clone(),
                    });
                }
                model_table.insert(model, tiers);
            }
            table.insert(group, model_table);
        }
        for keys in wildcards.values_mut() {
            keys.sort_by(|a, b| {
                b.prefix
                    .len()
                    .cmp(&a.prefix.len())
                    .then_with(|| a.prefix.cmp(&b.prefix))
            });
        }

        Self {
            table,
            choices,
            wildcards,
        }
    }

    /// 解析 (分组, 模型) 对应的层级，精确匹配优先，其次最长前缀的通配键
    pub fn tiers(&self, group: &str, model: &str) -> Option<&[Tier]> {
        let models = self.table.get(group)?;
        if let Some(tiers) = models.get(model) {
            return Some(tiers);
        }
        self.wildcards
            .get(group)?
            .iter()
            .find(|key| model.starts_with(&key.prefix))
            .and_then(|key| models.get(&key.pattern))
            .map(Vec::as_slice)
    }

    pub fn choice(&self, channel_id: i64) -> Option<&Arc<ChannelChoice>> {
        self.choices.get(&channel_id)
    }

    pub fn channel_count(&self) -> usize {
        self.choices.len()
    }

    pub fn group_count(&self) -> usize {
        self.table.len()
    }

    /// 分组下可路由的模型键
    pub fn models(&self, group: &str) -> Vec<String> {
        let mut models: Vec<String> = self
            .table
            .get(group)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        models.sort();
        models
    }

    pub(crate) fn choices(&self) -> impl Iterator<Item = &Arc<ChannelChoice>> {
        self.choices.values()
    }
}
