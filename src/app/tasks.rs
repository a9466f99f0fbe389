//! 后台任务管理

use relaycast_core::{MemoryCache, SharedCache};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// 已启动的后台任务
#[derive(Default)]
pub struct BackgroundTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &'static str, handle: JoinHandle<()>) {
        debug!("[APP] 后台任务已启动: {}", name);
        self.handles.push((name, handle));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handles.iter().map(|(name, _)| *name).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// 中止所有任务并等待退出
    pub async fn shutdown(&mut self) {
        for (name, handle) in self.handles.drain(..) {
            handle.abort();
            // 被中止的任务返回 JoinError::Cancelled
            let _ = handle.await;
            debug!("[APP] 后台任务已停止: {}", name);
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for (_, handle) in &self.handles {
            handle.abort();
        }
    }
}

/// 定时清理进程内缓存的过期条目
pub fn spawn_cache_purge_task(cache: Arc<MemoryCache>, period: Duration) -> JoinHandle<()> {
    info!(
        "[CACHE] 启动 {} 缓存清理任务，周期 {:?}",
        cache.backend_name(),
        period
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.purge_expired();
            if removed > 0 {
                debug!("[CACHE] 清理过期缓存 {} 条", removed);
            }
        }
    })
}

/// 配置中的秒数转换为任务周期，至少 1 秒
pub fn period(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}
