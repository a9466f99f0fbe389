//! 网关配置
//!
//! 所有字段都有默认值，YAML 中缺省的段落使用默认配置。
//! 部分字段可以通过环境变量覆盖，见 [`Config::apply_env_overrides`]。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// 配置加载错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("解析配置失败: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("配置项无效: {0}")]
    Invalid(String),
}

/// 网关完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub routing: RoutingConfig,
    pub quota: QuotaConfig,
    /// 模型价格倍率
    pub pricing: HashMap<String, ModelPrice>,
    /// 分组倍率
    pub group_ratios: HashMap<String, f64>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite 文件路径，`:memory:` 表示内存库
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "relaycast.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis 地址，为空时使用进程内缓存
    pub redis_url: Option<String>,
    /// 令牌/用户查询缓存时间
    pub default_ttl_secs: u64,
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            default_ttl_secs: 60,
            key_prefix: "relaycast".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// 未单独配置的分组使用的每分钟请求数
    pub default_rpm: u32,
    /// 分组级别的每分钟请求数
    pub group_rpm: HashMap<String, u32>,
    /// 不超过该值使用固定窗口，否则使用令牌桶
    pub fixed_window_threshold: u32,
    /// 令牌桶容量 = 每秒速率 × 该倍数
    pub burst_multiplier: u32,
    pub window_secs: u64,
    /// 进程内状态清理周期
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_rpm: 60,
            group_rpm: HashMap::new(),
            fixed_window_threshold: 60,
            burst_multiplier: 10,
            window_secs: 60,
            sweep_interval_secs: 60,
        }
    }
}

impl RateLimitConfig {
    /// 关闭限流
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// 指定分组的每分钟请求数
    pub fn rpm_for_group(&self, group: &str) -> u32 {
        self.group_rpm
            .get(group)
            .copied()
            .unwrap_or(self.default_rpm)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoutingConfig {
    /// 渠道-模型冷却时长
    pub cooldown_secs: u64,
    /// 过期冷却记录清理周期
    pub cooldown_sweep_interval_secs: u64,
    /// 路由表从数据库全量同步的周期，0 表示不同步
    pub sync_interval_secs: u64,
    /// 不可恢复的上游错误是否自动禁用渠道
    pub auto_disable_enabled: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 60,
            cooldown_sweep_interval_secs: 3600,
            sync_interval_secs: 60,
            auto_disable_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuotaConfig {
    /// 预扣费时在提示词 token 数上追加的补偿量
    pub pre_consume_buffer: u32,
    /// 余额超过预估的该倍数时不对令牌预扣，0 表示关闭
    pub trust_multiple: u32,
    pub batch_update_enabled: bool,
    pub batch_update_interval_secs: u64,
    /// 余额低于该值时发送一次提醒
    pub remind_threshold: i64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            pre_consume_buffer: 500,
            trust_multiple: 100,
            batch_update_enabled: false,
            batch_update_interval_secs: 5,
            remind_threshold: 5_000,
        }
    }
}

/// 单个模型的价格倍率
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelPrice {
    pub input_ratio: f64,
    pub output_ratio: f64,
}

impl ModelPrice {
    pub fn new(input_ratio: f64, output_ratio: f64) -> Self {
        Self {
            input_ratio,
            output_ratio,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// 输出 JSON 格式日志
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// 从 YAML 字符串解析
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载，文件不存在时使用默认配置
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("配置文件不存在，使用默认配置: {}", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// 应用进程环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// 从给定的变量来源应用覆盖
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("RELAYCAST_DB_PATH") {
            self.database.path = path;
        }
        if let Some(url) = lookup("RELAYCAST_REDIS_URL") {
            self.cache.redis_url = if url.trim().is_empty() {
                None
            } else {
                Some(url)
            };
        }
        if let Some(level) = lookup("RELAYCAST_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(rpm) = lookup("RELAYCAST_DEFAULT_RPM") {
            match rpm.parse::<u32>() {
                Ok(rpm) => self.rate_limit.default_rpm = rpm,
                Err(_) => tracing::warn!("忽略无效的 RELAYCAST_DEFAULT_RPM: {}", rpm),
            }
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::Invalid("rate_limit.window_secs 不能为 0".into()));
        }
        if self.rate_limit.burst_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.burst_multiplier 不能为 0".into(),
            ));
        }
        for (model, price) in &self.pricing {
            if price.input_ratio < 0.0 || price.output_ratio < 0.0 {
                return Err(ConfigError::Invalid(format!("模型 {model} 的倍率不能为负数")));
            }
        }
        for (group, ratio) in &self.group_ratios {
            if *ratio < 0.0 {
                return Err(ConfigError::Invalid(format!("分组 {group} 的倍率不能为负数")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
rate_limit:
  default_rpm: 120
  group_rpm:
    vip: 600
pricing:
  gpt-4o:
    input_ratio: 1.0
    output_ratio: 2.0
group_ratios:
  vip: 0.8
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.rate_limit.default_rpm, 120);
        assert_eq!(config.rate_limit.rpm_for_group("vip"), 600);
        assert_eq!(config.rate_limit.rpm_for_group("default"), 120);
        assert_eq!(config.rate_limit.fixed_window_threshold, 60);
        assert_eq!(config.quota.pre_consume_buffer, 500);
        assert_eq!(config.routing.cooldown_sweep_interval_secs, 3600);
        assert_eq!(config.pricing["gpt-4o"], ModelPrice::new(1.0, 2.0));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides_from(|name| match name {
            "RELAYCAST_DB_PATH" => Some(":memory:".to_string()),
            "RELAYCAST_REDIS_URL" => Some("redis://127.0.0.1:6379".to_string()),
            "RELAYCAST_DEFAULT_RPM" => Some("not-a-number".to_string()),
            _ => None,
        });
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(
            config.cache.redis_url.as_deref(),
            Some("redis://127.0.0.1:6379")
        );
        assert_eq!(config.rate_limit.default_rpm, 60);
    }

    #[test]
    fn test_negative_ratio_rejected() {
        let yaml = "group_ratios:\n  default: -1.0\n";
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_yaml_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = Config::default();
        config.quota.trust_multiple = 0;
        std::fs::write(&path, config.to_yaml().unwrap()).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.quota.trust_multiple, 0);
    }
}
