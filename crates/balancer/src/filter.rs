//! 渠道过滤条件

use relaycast_core::models::Channel;
use std::collections::HashSet;

/// 调用方提供的过滤条件，返回 `false` 的渠道不参与本次选择
pub trait ChannelFilter: Send + Sync {
    fn accept(&self, channel: &Channel) -> bool;
}

impl<F> ChannelFilter for F
where
    F: Fn(&Channel) -> bool + Send + Sync,
{
    fn accept(&self, channel: &Channel) -> bool {
        self(channel)
    }
}

/// 排除已经尝试过的渠道，用于失败重试
#[derive(Debug, Clone, Default)]
pub struct ExcludeChannels(HashSet<i64>);

impl ExcludeChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel_id: i64) {
        self.0.insert(channel_id);
    }

    pub fn contains(&self, channel_id: i64) -> bool {
        self.0.contains(&channel_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<i64> for ExcludeChannels {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl ChannelFilter for ExcludeChannels {
    fn accept(&self, channel: &Channel) -> bool {
        !self.0.contains(&channel.id)
    }
}
