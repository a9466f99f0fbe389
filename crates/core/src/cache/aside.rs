//! 旁路缓存
//!
//! 命中直接返回；未命中时从数据库计算，写入缓存后返回。
//! 缓存读写失败只记录日志并回退到计算结果，不影响调用方。

use super::SharedCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// 获取缓存值，未命中时调用 `compute` 并按 `ttl` 写回
///
/// `compute` 返回 `Ok(None)` 表示数据不存在，此时不写缓存。
pub async fn get_or_set<T, E, F>(
    cache: Option<&dyn SharedCache>,
    key: &str,
    ttl: Duration,
    compute: F,
) -> Result<Option<T>, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<Option<T>, E>,
{
    let Some(cache) = cache else {
        return compute();
    };

    match cache.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => warn!("[CACHE] 缓存值无法解析，重新计算: key={}, error={}", key, e),
        },
        Ok(None) => debug!("[CACHE] 未命中: key={}", key),
        Err(e) => warn!(
            "[CACHE] 读取 {} 缓存失败，回退数据库: key={}, error={}",
            cache.backend_name(),
            key,
            e
        ),
    }

    let value = compute()?;
    if let Some(ref value) = value {
        match serde_json::to_string(value) {
            Ok(raw) => {
                if let Err(e) = cache.set(key, &raw, ttl).await {
                    warn!("[CACHE] 写入缓存失败: key={}, error={}", key, e);
                }
            }
            Err(e) => warn!("[CACHE] 序列化缓存值失败: key={}, error={}", key, e),
        }
    }
    Ok(value)
}
