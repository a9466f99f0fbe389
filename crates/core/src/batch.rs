//! 批量计数聚合
//!
//! 高频的额度和计数更新先在内存中按 (类型, 实体) 累加，定时刷写到数据库。
//! 每种类型一个桶，写入只锁自己的桶；刷写时把桶整体换成空表，
//! 再对每个实体执行一条更新语句。
//!
//! 未刷写的增量不会被任何读路径直接读取，最终一致的窗口等于刷写周期。

use crate::database::dao::{ChannelDao, TokenDao, UserDao};
use crate::database::{lock_db, DbConnection};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// 增量类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchUpdateType {
    /// 用户剩余额度
    UserQuota,
    /// 令牌剩余额度（同时反向调整令牌已用额度）
    TokenQuota,
    /// 用户已用额度
    UsedQuota,
    /// 渠道已用额度
    ChannelUsedQuota,
    /// 用户请求次数
    RequestCount,
}

impl BatchUpdateType {
    pub const ALL: [BatchUpdateType; 5] = [
        BatchUpdateType::UserQuota,
        BatchUpdateType::TokenQuota,
        BatchUpdateType::UsedQuota,
        BatchUpdateType::ChannelUsedQuota,
        BatchUpdateType::RequestCount,
    ];

    fn index(self) -> usize {
        match self {
            BatchUpdateType::UserQuota => 0,
            BatchUpdateType::TokenQuota => 1,
            BatchUpdateType::UsedQuota => 2,
            BatchUpdateType::ChannelUsedQuota => 3,
            BatchUpdateType::RequestCount => 4,
        }
    }

    fn apply(self, conn: &Connection, id: i64, value: i64) -> Result<(), rusqlite::Error> {
        match self {
            BatchUpdateType::UserQuota => UserDao::increase_quota(conn, id, value),
            BatchUpdateType::TokenQuota => TokenDao::increase_remain_quota(conn, id, value),
            BatchUpdateType::UsedQuota => UserDao::add_used_quota(conn, id, value),
            BatchUpdateType::ChannelUsedQuota => ChannelDao::add_used_quota(conn, id, value),
            BatchUpdateType::RequestCount => UserDao::add_request_count(conn, id, value),
        }
    }
}

impl fmt::Display for BatchUpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchUpdateType::UserQuota => "user_quota",
            BatchUpdateType::TokenQuota => "token_quota",
            BatchUpdateType::UsedQuota => "used_quota",
            BatchUpdateType::ChannelUsedQuota => "channel_used_quota",
            BatchUpdateType::RequestCount => "request_count",
        };
        f.write_str(name)
    }
}

/// 单次刷写统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub applied: usize,
    pub failed: usize,
}

pub struct BatchAggregator {
    db: DbConnection,
    buckets: [Mutex<HashMap<i64, i64>>; 5],
}

impl BatchAggregator {
    pub fn new(db: DbConnection) -> Self {
        Self {
            db,
            buckets: Default::default(),
        }
    }

    /// 累加一个增量
    pub fn add_delta(&self, kind: BatchUpdateType, id: i64, value: i64) {
        if value == 0 {
            return;
        }
        let mut bucket = self.buckets[kind.index()].lock();
        *bucket.entry(id).or_insert(0) += value;
    }

    /// 当前桶中尚未刷写的条目数
    pub fn pending_len(&self, kind: BatchUpdateType) -> usize {
        self.buckets[kind.index()].lock().len()
    }

    /// 刷写所有桶
    ///
    /// 写库失败的增量会放回桶中，等待下一次刷写。
    pub fn flush(&self) -> FlushStats {
        let mut stats = FlushStats::default();
        for kind in BatchUpdateType::ALL {
            let drained = std::mem::take(&mut *self.buckets[kind.index()].lock());
            if drained.is_empty() {
                continue;
            }

            let conn = match lock_db(&self.db) {
                Ok(conn) => conn,
                Err(e) => {
                    error!("[BATCH] {}: {}", kind, e);
                    stats.failed += drained.len();
                    self.requeue(kind, drained);
                    continue;
                }
            };

            let mut failed = HashMap::new();
            for (id, value) in drained {
                if value == 0 {
                    continue;
                }
                match kind.apply(&conn, id, value) {
                    Ok(()) => stats.applied += 1,
                    Err(e) => {
                        error!("[BATCH] 刷写失败: type={}, id={}, value={}, error={}", kind, id, value, e);
                        failed.insert(id, value);
                    }
                }
            }
            drop(conn);

            if !failed.is_empty() {
                stats.failed += failed.len();
                self.requeue(kind, failed);
            }
        }

        if stats.applied > 0 || stats.failed > 0 {
            debug!("[BATCH] 刷写完成: applied={}, failed={}", stats.applied, stats.failed);
        }
        stats
    }

    fn requeue(&self, kind: BatchUpdateType, entries: HashMap<i64, i64>) {
        let mut bucket = self.buckets[kind.index()].lock();
        for (id, value) in entries {
            *bucket.entry(id).or_insert(0) += value;
        }
    }

    /// 启动定时刷写任务
    pub fn spawn_flush_task(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let aggregator = self.clone();
        info!("[BATCH] 启动批量刷写任务，周期 {:?}", period);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                aggregator.flush();
            }
        })
    }
}
