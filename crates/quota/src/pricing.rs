//! 价格倍率与成本计算

use parking_lot::RwLock;
use relaycast_core::config::ModelPrice;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// 上游返回的用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }
}

/// 模型价格目录
pub trait PricingCatalog: Send + Sync {
    fn model_price(&self, model: &str) -> Option<ModelPrice>;
}

/// 静态价格表，可选的默认价格用于未单独配置的模型
#[derive(Debug, Clone, Default)]
pub struct StaticPricing {
    prices: HashMap<String, ModelPrice>,
    fallback: Option<ModelPrice>,
}

impl StaticPricing {
    pub fn new(prices: HashMap<String, ModelPrice>) -> Self {
        Self {
            prices,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, price: ModelPrice) -> Self {
        self.fallback = Some(price);
        self
    }

    pub fn insert(&mut self, model: impl Into<String>, price: ModelPrice) {
        self.prices.insert(model.into(), price);
    }
}

impl PricingCatalog for StaticPricing {
    fn model_price(&self, model: &str) -> Option<ModelPrice> {
        self.prices.get(model).copied().or(self.fallback)
    }
}

/// 分组倍率表
///
/// 读取方拿到的是不可变快照，重载时整体替换。
#[derive(Debug)]
pub struct GroupRatioTable {
    ratios: RwLock<Arc<HashMap<String, f64>>>,
}

impl GroupRatioTable {
    pub fn new(ratios: HashMap<String, f64>) -> Self {
        Self {
            ratios: RwLock::new(Arc::new(ratios)),
        }
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, f64>> {
        self.ratios.read().clone()
    }

    /// 分组倍率，未配置的分组为 1
    pub fn ratio(&self, group: &str) -> f64 {
        self.ratios.read().get(group).copied().unwrap_or(1.0)
    }

    pub fn reload(&self, ratios: HashMap<String, f64>) {
        let count = ratios.len();
        *self.ratios.write() = Arc::new(ratios);
        info!("[QUOTA] 分组倍率已更新: {} 个分组", count);
    }
}

impl Default for GroupRatioTable {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

/// 预扣时锁定的价格，结算使用同一份价格
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub input_ratio: f64,
    pub output_ratio: f64,
    pub group_ratio: f64,
}

impl PriceQuote {
    pub fn new(price: ModelPrice, group_ratio: f64) -> Self {
        Self {
            input_ratio: price.input_ratio,
            output_ratio: price.output_ratio,
            group_ratio,
        }
    }

    /// 预估成本 = (提示词 + 补偿量) × 输入倍率 × 分组倍率
    pub fn estimate(&self, prompt_tokens: u32, buffer: u32) -> i64 {
        let tokens = prompt_tokens as f64 + buffer as f64;
        to_quota(tokens * self.input_ratio * self.group_ratio)
    }

    /// 实际成本 = (提示词 × 输入倍率 + 补全 × 输出倍率) × 分组倍率
    ///
    /// 倍率不为 0 时至少计 1。
    pub fn actual_cost(&self, usage: &Usage) -> i64 {
        let raw = usage.prompt_tokens as f64 * self.input_ratio
            + usage.completion_tokens as f64 * self.output_ratio;
        let cost = to_quota(raw * self.group_ratio);
        let priced = self.group_ratio != 0.0 && (self.input_ratio != 0.0 || self.output_ratio != 0.0);
        if priced && cost <= 0 {
            1
        } else {
            cost
        }
    }
}

/// 向上取整，先消除浮点误差
fn to_quota(value: f64) -> i64 {
    let rounded = (value * 1_000_000.0).round() / 1_000_000.0;
    rounded.ceil().max(0.0) as i64
}
