//! 渠道与路由能力模型
//!
//! `Channel` 是一个上游凭证/配置，`Ability` 是路由表的数据源行：
//! (分组, 模型, 渠道, 优先级, 权重, 是否启用)。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 渠道持久化状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// 启用
    #[default]
    Enabled,
    /// 管理员手动禁用
    ManuallyDisabled,
    /// 因上游故障被自动禁用
    AutoDisabled,
}

impl ChannelStatus {
    /// 数据库存储值
    pub fn as_i64(self) -> i64 {
        match self {
            ChannelStatus::Enabled => 1,
            ChannelStatus::ManuallyDisabled => 2,
            ChannelStatus::AutoDisabled => 3,
        }
    }

    /// 从数据库存储值解析，未知值视为手动禁用
    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => ChannelStatus::Enabled,
            3 => ChannelStatus::AutoDisabled,
            _ => ChannelStatus::ManuallyDisabled,
        }
    }

    pub fn is_enabled(self) -> bool {
        self == ChannelStatus::Enabled
    }

    /// 获取显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            ChannelStatus::Enabled => "已启用",
            ChannelStatus::ManuallyDisabled => "已手动禁用",
            ChannelStatus::AutoDisabled => "已自动禁用",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// 上游渠道
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    /// 上游密钥
    #[serde(skip_serializing)]
    #[serde(default)]
    pub key: String,
    pub base_url: Option<String>,
    pub status: ChannelStatus,
    /// 同一优先级内的相对权重，0 表示不参与加权抽取
    pub weight: u32,
    /// 优先级，数值越大越先尝试
    pub priority: i64,
    /// 逗号分隔的分组列表
    pub group: String,
    /// 逗号分隔的模型列表
    pub models: String,
    pub proxy: Option<String>,
    pub used_quota: i64,
    /// 是否允许因故障自动禁用
    pub auto_ban: bool,
}

impl Channel {
    /// 创建一个启用状态的渠道
    pub fn new(id: i64, name: impl Into<String>, group: &str, models: &str) -> Self {
        Self {
            id,
            name: name.into(),
            key: String::new(),
            base_url: None,
            status: ChannelStatus::Enabled,
            weight: 1,
            priority: 0,
            group: group.to_string(),
            models: models.to_string(),
            proxy: None,
            used_quota: 0,
            auto_ban: true,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: ChannelStatus) -> Self {
        self.status = status;
        self
    }

    /// 渠道所属分组
    pub fn groups(&self) -> Vec<&str> {
        split_list(&self.group)
    }

    /// 渠道支持的模型
    pub fn model_list(&self) -> Vec<&str> {
        split_list(&self.models)
    }

    /// 展开为 分组 × 模型 的路由能力行
    pub fn abilities(&self) -> Vec<Ability> {
        let models = self.model_list();
        self.groups()
            .into_iter()
            .flat_map(|group| {
                models.iter().map(move |model| Ability {
                    group: group.to_string(),
                    model: model.to_string(),
                    channel_id: self.id,
                    enabled: self.status.is_enabled(),
                    priority: self.priority,
                    weight: self.weight,
                })
            })
            .collect()
    }
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// 路由能力行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ability {
    pub group: String,
    /// 模型名，可以是以 `*` 结尾的后缀通配模式
    pub model: String,
    pub channel_id: i64,
    pub enabled: bool,
    pub priority: i64,
    pub weight: u32,
}
