//! 路由步骤

use super::traits::{AdmissionStep, RelayError};
use crate::context::AdmissionContext;
use async_trait::async_trait;
use relaycast_balancer::{ChannelChooser, ChannelFilter};
use std::sync::Arc;
use tracing::info;

/// 路由步骤 - 在用户分组内为模型选择渠道，跳过已尝试过的渠道
pub struct RoutingStep {
    chooser: Arc<ChannelChooser>,
}

impl RoutingStep {
    pub fn new(chooser: Arc<ChannelChooser>) -> Self {
        Self { chooser }
    }
}

#[async_trait]
impl AdmissionStep for RoutingStep {
    async fn execute(&self, ctx: &mut AdmissionContext) -> Result<(), RelayError> {
        let group = ctx.group()?;
        let filters: [&dyn ChannelFilter; 1] = [&ctx.tried];
        let channel = self.chooser.next(group, ctx.model(), &filters)?;

        info!(
            "[ROUTE] request_id={} group={} model={} channel_id={} channel={}",
            ctx.request_id(),
            group,
            ctx.model(),
            channel.id,
            channel.name
        );
        ctx.channel = Some(channel);
        Ok(())
    }

    fn name(&self) -> &str {
        "routing"
    }
}
