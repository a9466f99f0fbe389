//! 选路错误类型

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalancerError {
    #[error("分组 {group} 下模型 {model} 无可用渠道")]
    NoAvailableChannel { group: String, model: String },

    #[error("渠道不存在: {0}")]
    ChannelNotFound(i64),

    #[error("加载路由数据失败: {0}")]
    Load(String),
}

pub type BalancerResult<T> = Result<T, BalancerError>;
