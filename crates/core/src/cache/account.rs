//! 令牌与用户查询
//!
//! 令牌、用户分组、用户启用状态和用户余额都经由旁路缓存读取。
//! 用户余额在缓存中存为纯整数，供额度预扣时做原子扣减。

use super::{get_or_set, SharedCache, SharedCacheRef};
use crate::database::dao::{TokenDao, UserDao};
use crate::database::{lock_db, DbConnection};
use crate::models::Token;
use std::time::Duration;
use tracing::warn;

/// 令牌缓存键
pub fn token_cache_key(key: &str) -> String {
    format!("token:{key}")
}

pub fn user_group_cache_key(user_id: i64) -> String {
    format!("user_group:{user_id}")
}

pub fn user_enabled_cache_key(user_id: i64) -> String {
    format!("user_enabled:{user_id}")
}

/// 用户余额缓存键
pub fn user_quota_cache_key(user_id: i64) -> String {
    format!("user_quota:{user_id}")
}

#[derive(Clone)]
pub struct AccountLookup {
    db: DbConnection,
    cache: Option<SharedCacheRef>,
    ttl: Duration,
}

impl AccountLookup {
    pub fn new(db: DbConnection, cache: Option<SharedCacheRef>, ttl: Duration) -> Self {
        Self { db, cache, ttl }
    }

    pub fn db(&self) -> &DbConnection {
        &self.db
    }

    pub fn cache(&self) -> Option<&dyn SharedCache> {
        self.cache.as_deref()
    }

    pub fn cache_ref(&self) -> Option<SharedCacheRef> {
        self.cache.clone()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 按密钥查询令牌
    pub async fn token_by_key(&self, key: &str) -> Result<Option<Token>, String> {
        let db = &self.db;
        get_or_set(self.cache(), &token_cache_key(key), self.ttl, || {
            let conn = lock_db(db)?;
            TokenDao::get_by_key(&conn, key).map_err(|e| format!("查询令牌失败: {e}"))
        })
        .await
    }

    /// 查询用户分组
    pub async fn user_group(&self, user_id: i64) -> Result<Option<String>, String> {
        let db = &self.db;
        get_or_set(self.cache(), &user_group_cache_key(user_id), self.ttl, || {
            let conn = lock_db(db)?;
            UserDao::get_group(&conn, user_id).map_err(|e| format!("查询用户分组失败: {e}"))
        })
        .await
    }

    /// 查询用户是否启用，用户不存在返回 `None`
    pub async fn user_enabled(&self, user_id: i64) -> Result<Option<bool>, String> {
        let db = &self.db;
        get_or_set(self.cache(), &user_enabled_cache_key(user_id), self.ttl, || {
            let conn = lock_db(db)?;
            UserDao::is_enabled(&conn, user_id).map_err(|e| format!("查询用户状态失败: {e}"))
        })
        .await
    }

    /// 查询用户余额，未命中时从数据库加载并写入缓存
    pub async fn user_quota(&self, user_id: i64) -> Result<Option<i64>, String> {
        let db = &self.db;
        get_or_set(self.cache(), &user_quota_cache_key(user_id), self.ttl, || {
            let conn = lock_db(db)?;
            UserDao::get_quota(&conn, user_id).map_err(|e| format!("查询用户额度失败: {e}"))
        })
        .await
    }

    /// 令牌被修改后使缓存失效
    pub async fn invalidate_token(&self, key: &str) {
        if let Some(cache) = self.cache() {
            if let Err(e) = cache.delete(&token_cache_key(key)).await {
                warn!("[CACHE] 令牌缓存失效失败: {}", e);
            }
        }
    }

    /// 用户被修改后使分组、状态和余额缓存失效
    pub async fn invalidate_user(&self, user_id: i64) {
        let Some(cache) = self.cache() else {
            return;
        };
        for key in [
            user_group_cache_key(user_id),
            user_enabled_cache_key(user_id),
            user_quota_cache_key(user_id),
        ] {
            if let Err(e) = cache.delete(&key).await {
                warn!("[CACHE] 用户缓存失效失败: key={}, error={}", key, e);
            }
        }
    }
}
