//! 认证步骤

use super::traits::{AdmissionStep, RelayError};
use crate::context::AdmissionContext;
use async_trait::async_trait;
use relaycast_core::logger::mask_key;
use relaycast_core::models::{Token, TokenStatus};
use relaycast_core::{now_unix_secs, AccountLookup};
use tracing::debug;

/// 认证步骤 - 校验令牌和令牌所属用户，并解析用户分组
pub struct AuthStep {
    lookup: AccountLookup,
}

impl AuthStep {
    pub fn new(lookup: AccountLookup) -> Self {
        Self { lookup }
    }

    /// 校验令牌本身的状态
    pub fn verify_token(token: &Token, now_secs: i64) -> Result<(), RelayError> {
        match token.status {
            TokenStatus::Enabled => {}
            TokenStatus::Disabled => return Err(RelayError::Auth("令牌已被禁用".to_string())),
            TokenStatus::Expired => return Err(RelayError::Auth("令牌已过期".to_string())),
            TokenStatus::Exhausted => return Err(RelayError::TokenExhausted),
        }
        if token.is_expired_at(now_secs) {
            return Err(RelayError::Auth("令牌已过期".to_string()));
        }
        if !token.unlimited_quota && token.remain_quota <= 0 {
            return Err(RelayError::TokenExhausted);
        }
        Ok(())
    }
}

#[async_trait]
impl AdmissionStep for AuthStep {
    async fn execute(&self, ctx: &mut AdmissionContext) -> Result<(), RelayError> {
        let key = ctx.request.token_key.trim();
        if key.is_empty() {
            return Err(RelayError::Auth("未提供令牌".to_string()));
        }

        let token = self
            .lookup
            .token_by_key(key)
            .await
            .map_err(RelayError::Internal)?
            .ok_or_else(|| RelayError::Auth("无效的令牌".to_string()))?;
        Self::verify_token(&token, now_unix_secs())?;

        match self
            .lookup
            .user_enabled(token.user_id)
            .await
            .map_err(RelayError::Internal)?
        {
            Some(true) => {}
            Some(false) => return Err(RelayError::Auth("用户已被禁用".to_string())),
            None => return Err(RelayError::Auth("令牌所属用户不存在".to_string())),
        }
        let group = self
            .lookup
            .user_group(token.user_id)
            .await
            .map_err(RelayError::Internal)?
            .ok_or_else(|| RelayError::Auth("令牌所属用户不存在".to_string()))?;

        debug!(
            "[ADMISSION] request_id={} 认证通过: token={}, user_id={}, group={}",
            ctx.request_id(),
            mask_key(key),
            token.user_id,
            group
        );
        ctx.token = Some(token);
        ctx.group = Some(group);
        Ok(())
    }

    fn name(&self) -> &str {
        "auth"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RelayRequest;
    use crate::test_support::{fixture, MODEL};

    async fn authenticate(key: &str) -> Result<AdmissionContext, RelayError> {
        let fx = fixture();
        let step = AuthStep::new(fx.lookup.clone());
        let mut ctx = AdmissionContext::new(RelayRequest::new(key, MODEL, 10));
        step.execute(&mut ctx).await.map(|_| ctx)
    }

    #[tokio::test]
    async fn test_valid_token_resolves_group() {
        let ctx = authenticate("sk-alice-0001").await.unwrap();
        assert_eq!(ctx.token.as_ref().unwrap().user_id, 1);
        assert_eq!(ctx.group.as_deref(), Some("default"));
    }

    #[tokio::test]
    async fn test_rejected_tokens() {
        assert!(matches!(authenticate("").await, Err(RelayError::Auth(_))));
        assert!(matches!(authenticate("sk-unknown").await, Err(RelayError::Auth(_))));
        assert!(matches!(authenticate("sk-disabled-0003").await, Err(RelayError::Auth(_))));
        assert!(matches!(authenticate("sk-expired-0004").await, Err(RelayError::Auth(_))));
        assert!(matches!(authenticate("sk-empty-0005").await, Err(RelayError::TokenExhausted)));
        assert!(matches!(authenticate("sk-bob-0002").await, Err(RelayError::Auth(_))));
    }

    #[tokio::test]
    async fn test_unlimited_token_with_zero_remain_passes() {
        assert!(authenticate("sk-unlimited-0006").await.is_ok());
    }

    #[test]
    fn test_verify_token_expiry() {
        let mut token = Token::new(1, 1, "sk-test", 10);
        token.expired_time = 100;
        assert!(AuthStep::verify_token(&token, 99).is_ok());
        assert!(AuthStep::verify_token(&token, 101).is_err());
        token.status = TokenStatus::Exhausted;
        assert_eq!(AuthStep::verify_token(&token, 0), Err(RelayError::TokenExhausted));
    }
}
