//! 余额提醒

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaNotice {
    /// 余额低于提醒阈值
    LowBalance { balance: i64, threshold: i64 },
    /// 余额耗尽
    Exhausted,
}

/// 余额提醒通道
pub trait QuotaNotifier: Send + Sync {
    fn notify(&self, user_id: i64, notice: QuotaNotice);
}

/// 只写日志的提醒通道
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl QuotaNotifier for LogNotifier {
    fn notify(&self, user_id: i64, notice: QuotaNotice) {
        match notice {
            QuotaNotice::LowBalance { balance, threshold } => {
                info!(
                    "[QUOTA] 用户 {} 余额 {} 低于提醒阈值 {}",
                    user_id, balance, threshold
                );
            }
            QuotaNotice::Exhausted => warn!("[QUOTA] 用户 {} 额度已用尽", user_id),
        }
    }
}

/// 每次跌破阈值只提醒一次
///
/// 记录已提醒的最高级别，余额回到阈值以上后重新布防。
#[derive(Debug)]
pub struct LowBalanceWatch {
    threshold: i64,
    notified: DashMap<i64, Level>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Low,
    Exhausted,
}

impl LowBalanceWatch {
    pub fn new(threshold: i64) -> Self {
        Self {
            threshold,
            notified: DashMap::new(),
        }
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    /// 根据最新余额判断是否需要提醒
    pub fn observe(&self, user_id: i64, balance: i64) -> Option<QuotaNotice> {
        let level = if balance <= 0 {
            Level::Exhausted
        } else if self.threshold > 0 && balance < self.threshold {
            Level::Low
        } else {
            self.notified.remove(&user_id);
            return None;
        };

        match self.notified.entry(user_id) {
            Entry::Occupied(mut entry) => {
                if *entry.get() >= level {
                    return None;
                }
                entry.insert(level);
            }
            Entry::Vacant(entry) => {
                entry.insert(level);
            }
        }
        Some(match level {
            Level::Exhausted => QuotaNotice::Exhausted,
            Level::Low => QuotaNotice::LowBalance {
                balance,
                threshold: self.threshold,
            },
        })
    }
}
