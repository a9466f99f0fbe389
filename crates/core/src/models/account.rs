//! 用户与令牌模型

use serde::{Deserialize, Serialize};

/// 用户状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Enabled,
    Disabled,
}

impl UserStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            UserStatus::Enabled => 1,
            UserStatus::Disabled => 2,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        if value == 1 {
            UserStatus::Enabled
        } else {
            UserStatus::Disabled
        }
    }
}

/// 令牌状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    #[default]
    Enabled,
    Disabled,
    Expired,
    Exhausted,
}

impl TokenStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            TokenStatus::Enabled => 1,
            TokenStatus::Disabled => 2,
            TokenStatus::Expired => 3,
            TokenStatus::Exhausted => 4,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => TokenStatus::Enabled,
            3 => TokenStatus::Expired,
            4 => TokenStatus::Exhausted,
            _ => TokenStatus::Disabled,
        }
    }
}

/// 用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub group: String,
    /// 剩余额度
    pub quota: i64,
    pub used_quota: i64,
    pub request_count: i64,
    pub status: UserStatus,
    pub email: Option<String>,
}

impl User {
    pub fn new(id: i64, username: impl Into<String>, group: impl Into<String>, quota: i64) -> Self {
        Self {
            id,
            username: username.into(),
            group: group.into(),
            quota,
            used_quota: 0,
            request_count: 0,
            status: UserStatus::Enabled,
            email: None,
        }
    }
}

/// API 令牌
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: i64,
    pub user_id: i64,
    pub key: String,
    pub name: String,
    pub status: TokenStatus,
    pub remain_quota: i64,
    pub unlimited_quota: bool,
    pub used_quota: i64,
    /// 过期时间（unix 秒），-1 表示永不过期
    pub expired_time: i64,
}

impl Token {
    pub fn new(id: i64, user_id: i64, key: impl Into<String>, remain_quota: i64) -> Self {
        Self {
            id,
            user_id,
            key: key.into(),
            name: String::new(),
            status: TokenStatus::Enabled,
            remain_quota,
            unlimited_quota: false,
            used_quota: 0,
            expired_time: -1,
        }
    }

    pub fn unlimited(mut self) -> Self {
        self.unlimited_quota = true;
        self
    }

    /// 在给定时间点是否已过期
    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        self.expired_time != -1 && self.expired_time < now_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expiry() {
        let mut token = Token::new(1, 1, "sk-test", 100);
        assert!(!token.is_expired_at(i64::MAX));

        token.expired_time = 1_000;
        assert!(!token.is_expired_at(999));
        assert!(token.is_expired_at(1_001));
    }

    #[test]
    fn test_token_status_storage_values() {
        assert_eq!(TokenStatus::from_i64(TokenStatus::Exhausted.as_i64()), TokenStatus::Exhausted);
        assert_eq!(TokenStatus::from_i64(0), TokenStatus::Disabled);
        assert_eq!(UserStatus::from_i64(2), UserStatus::Disabled);
    }
}
