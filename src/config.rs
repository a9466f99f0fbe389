//! 配置文件读写
//!
//! 配置文件位于平台配置目录下的 `relaycast/config.yaml`，不存在时使用默认配置。
//! 加载后叠加环境变量覆盖并做一次校验。

use anyhow::{Context, Result};
use relaycast_core::Config;
use std::path::{Path, PathBuf};
use tracing::info;

/// 默认配置文件路径
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("relaycast")
        .join("config.yaml")
}

/// 从默认路径加载配置
pub fn load_config() -> Result<Config> {
    load_config_from(&config_path())
}

/// 从指定路径加载配置并应用环境变量覆盖
pub fn load_config_from(path: &Path) -> Result<Config> {
    let mut config =
        Config::load(path).with_context(|| format!("加载配置文件失败: {}", path.display()))?;
    config.apply_env_overrides();
    config.validate().context("配置校验失败")?;
    info!("[CONFIG] 已加载配置: {}", path.display());
    Ok(config)
}

/// 保存配置到默认路径
pub fn save_config(config: &Config) -> Result<()> {
    save_config_to(config, &config_path())
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("创建配置目录失败: {}", parent.display()))?;
    }
    let content = config.to_yaml().context("序列化配置失败")?;
    std::fs::write(path, content).with_context(|| format!("写入配置文件失败: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_file_name() {
        let path = config_path();
        assert!(path.ends_with("relaycast/config.yaml"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.rate_limit.group_rpm.insert("vip".to_string(), 600);
        config.group_ratios.insert("vip".to_string(), 0.5);
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.rate_limit.rpm_for_group("vip"), 600);
        assert_eq!(loaded.group_ratios.get("vip"), Some(&0.5));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config_from(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(loaded.quota.pre_consume_buffer, 500);
    }

    #[test]
    fn test_invalid_yaml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "rate_limit: [not, a, map]").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("config.yaml"));
    }
}
