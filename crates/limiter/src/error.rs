//! 限流错误类型

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LimiterError {
    #[error("限流后端不可用: {0}")]
    Backend(String),

    #[error("限流脚本执行失败: {0}")]
    Script(String),
}

impl From<redis::RedisError> for LimiterError {
    fn from(e: redis::RedisError) -> Self {
        if e.kind() == redis::ErrorKind::ResponseError || e.kind() == redis::ErrorKind::NoScriptError {
            LimiterError::Script(e.to_string())
        } else {
            LimiterError::Backend(e.to_string())
        }
    }
}

pub type LimiterResult<T> = Result<T, LimiterError>;
