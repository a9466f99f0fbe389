//! 后台任务

use crate::chooser::ChannelChooser;
use crate::source::RoutingSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// 定时清理过期的冷却记录
pub fn spawn_cooldown_sweep_task(chooser: Arc<ChannelChooser>, period: Duration) -> JoinHandle<()> {
    info!("[ROUTER] 启动冷却清理任务，周期 {:?}", period);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = chooser.cooldowns().sweep();
            debug!("[ROUTER] 清理过期冷却记录 {} 条", removed);
        }
    })
}

/// 定时从数据源全量同步路由表
pub fn spawn_sync_task(
    chooser: Arc<ChannelChooser>,
    source: Arc<dyn RoutingSource>,
    period: Duration,
) -> JoinHandle<()> {
    info!("[ROUTER] 启动路由表同步任务，周期 {:?}", period);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let chooser = chooser.clone();
            let source = source.clone();
            let result = tokio::task::spawn_blocking(move || chooser.load(source.as_ref())).await;
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!("[ROUTER] 同步路由表失败: {}", e),
                Err(e) => error!("[ROUTER] 同步任务异常: {}", e),
            }
        }
    })
}
