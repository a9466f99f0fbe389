//! 额度错误类型

use crate::reservation::ReservationState;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuotaError {
    #[error("用户额度不足: 需要 {need}, 剩余 {available}")]
    Insufficient { need: i64, available: i64 },

    #[error("令牌额度不足: 需要 {need}")]
    TokenInsufficient { need: i64 },

    #[error("用户不存在: {0}")]
    UserNotFound(i64),

    #[error("模型 {0} 未配置价格")]
    PriceNotFound(String),

    #[error("额度存储错误: {0}")]
    Store(String),

    #[error("预扣状态不允许从 {from} 变为 {to}")]
    InvalidTransition {
        from: ReservationState,
        to: ReservationState,
    },
}

impl QuotaError {
    /// 是否是余额类错误（请求不会到达上游）
    pub fn is_insufficient(&self) -> bool {
        matches!(
            self,
            QuotaError::Insufficient { .. } | QuotaError::TokenInsufficient { .. }
        )
    }
}

impl From<rusqlite::Error> for QuotaError {
    fn from(e: rusqlite::Error) -> Self {
        QuotaError::Store(e.to_string())
    }
}

pub type QuotaResult<T> = Result<T, QuotaError>;
