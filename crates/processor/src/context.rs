//! 准入上下文

use crate::steps::RelayError;
use relaycast_balancer::ExcludeChannels;
use relaycast_core::models::{Channel, Token};
use relaycast_quota::Reservation;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// 中转请求的准入参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub request_id: String,
    pub token_key: String,
    pub model: String,
    pub prompt_tokens: u32,
}

impl RelayRequest {
    /// 创建请求，自动生成请求 ID
    pub fn new(token_key: impl Into<String>, model: impl Into<String>, prompt_tokens: u32) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            token_key: token_key.into(),
            model: model.into(),
            prompt_tokens,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// 准入过程中各步骤逐步填充的上下文
#[derive(Debug)]
pub struct AdmissionContext {
    pub request: RelayRequest,
    /// 认证通过的令牌
    pub token: Option<Token>,
    /// 令牌所属用户的分组
    pub group: Option<String>,
    pub channel: Option<Arc<Channel>>,
    /// 已尝试过的渠道
    pub tried: ExcludeChannels,
    pub reservation: Option<Reservation>,
    pub started_at: Instant,
}

impl AdmissionContext {
    pub fn new(request: RelayRequest) -> Self {
        Self {
            request,
            token: None,
            group: None,
            channel: None,
            tried: ExcludeChannels::new(),
            reservation: None,
            started_at: Instant::now(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request.request_id
    }

    pub fn model(&self) -> &str {
        &self.request.model
    }

    pub fn token(&self) -> Result<&Token, RelayError> {
        self.token
            .as_ref()
            .ok_or_else(|| RelayError::Internal("上下文缺少令牌，认证步骤未执行".to_string()))
    }

    pub fn group(&self) -> Result<&str, RelayError> {
        self.group
            .as_deref()
            .ok_or_else(|| RelayError::Internal("上下文缺少用户分组，认证步骤未执行".to_string()))
    }

    pub fn channel(&self) -> Result<&Arc<Channel>, RelayError> {
        self.channel
            .as_ref()
            .ok_or_else(|| RelayError::Internal("上下文缺少渠道，路由步骤未执行".to_string()))
    }

    /// 所有步骤完成后转换为准入结果
    pub fn into_admission(self) -> Result<Admission, RelayError> {
        let token = self.token()?.clone();
        let group = self.group()?.to_string();
        let channel = self.channel()?.clone();
        let reservation = self
            .reservation
            .ok_or_else(|| RelayError::Internal("上下文缺少预扣，额度步骤未执行".to_string()))?;
        Ok(Admission {
            request_id: self.request.request_id,
            model: self.request.model,
            user_id: token.user_id,
            token_id: token.id,
            group,
            channel,
            tried: self.tried,
            reservation,
            attempts: 1,
            started_at: self.started_at,
        })
    }
}

/// 已准入的请求，持有额度预扣直到完成或中止
#[derive(Debug)]
pub struct Admission {
    pub request_id: String,
    pub model: String,
    pub user_id: i64,
    pub token_id: i64,
    pub group: String,
    /// 当前使用的渠道
    pub channel: Arc<Channel>,
    pub tried: ExcludeChannels,
    pub reservation: Reservation,
    /// 已使用的渠道数
    pub attempts: u32,
    pub started_at: Instant,
}
