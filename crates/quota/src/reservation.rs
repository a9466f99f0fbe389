//! 预扣状态机
//!
//! Reserved → Completed（按实际用量结算）| Refunded（退还预扣）。
//! 仍处于 Reserved 的预扣被丢弃时（例如客户端断开）会在后台退还。

use crate::ledger::LedgerInner;
use crate::pricing::PriceQuote;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Reserved,
    Completed,
    Refunded,
}

impl ReservationState {
    /// 只允许从 Reserved 离开
    pub fn can_transition_to(self, next: ReservationState) -> bool {
        self == ReservationState::Reserved && next != ReservationState::Reserved
    }

    pub fn is_terminal(self) -> bool {
        self != ReservationState::Reserved
    }
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReservationState::Reserved => "reserved",
            ReservationState::Completed => "completed",
            ReservationState::Refunded => "refunded",
        };
        f.write_str(name)
    }
}

/// 结算和退款需要的数据
#[derive(Debug, Clone)]
pub(crate) struct Hold {
    pub request_id: String,
    pub user_id: i64,
    pub token_id: i64,
    pub channel_id: i64,
    pub model: String,
    pub quote: PriceQuote,
    /// 从用户余额预扣的额度
    pub user_reserved: i64,
    /// 从令牌额度预扣的额度，信任路径下为 0
    pub token_reserved: i64,
}

impl Hold {
    pub fn is_active(&self) -> bool {
        self.user_reserved > 0 || self.token_reserved > 0
    }
}

/// 一次在途请求的预扣
pub struct Reservation {
    hold: Hold,
    group: String,
    estimated: i64,
    balance_before: i64,
    state: ReservationState,
    inner: Arc<LedgerInner>,
}

impl Reservation {
    pub(crate) fn new(
        hold: Hold,
        group: String,
        estimated: i64,
        balance_before: i64,
        inner: Arc<LedgerInner>,
    ) -> Self {
        Self {
            hold,
            group,
            estimated,
            balance_before,
            state: ReservationState::Reserved,
            inner,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.hold.request_id
    }

    pub fn user_id(&self) -> i64 {
        self.hold.user_id
    }

    pub fn token_id(&self) -> i64 {
        self.hold.token_id
    }

    pub fn channel_id(&self) -> i64 {
        self.hold.channel_id
    }

    /// 故障转移后记到新渠道
    pub fn set_channel(&mut self, channel_id: i64) {
        self.hold.channel_id = channel_id;
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn model(&self) -> &str {
        &self.hold.model
    }

    pub fn quote(&self) -> PriceQuote {
        self.hold.quote
    }

    /// 预估成本
    pub fn estimated(&self) -> i64 {
        self.estimated
    }

    /// 从用户余额预扣的额度
    pub fn reserved(&self) -> i64 {
        self.hold.user_reserved
    }

    /// 从令牌额度预扣的额度，信任路径下为 0
    pub fn token_reserved(&self) -> i64 {
        self.hold.token_reserved
    }

    /// 预扣是否真正扣减了余额（可退款）
    pub fn is_active(&self) -> bool {
        self.hold.is_active()
    }

    pub fn balance_before(&self) -> i64 {
        self.balance_before
    }

    pub fn state(&self) -> ReservationState {
        self.state
    }

    pub(crate) fn transition(&mut self, next: ReservationState) -> Result<(), (ReservationState, ReservationState)> {
        if !self.state.can_transition_to(next) {
            return Err((self.state, next));
        }
        debug!(
            "[QUOTA] 预扣状态变更: request_id={}, {} -> {}",
            self.hold.request_id, self.state, next
        );
        self.state = next;
        Ok(())
    }

    pub(crate) fn hold(&self) -> Hold {
        self.hold.clone()
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("hold", &self.hold)
            .field("group", &self.group)
            .field("estimated", &self.estimated)
            .field("balance_before", &self.balance_before)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.state != ReservationState::Reserved {
            return;
        }
        self.state = ReservationState::Refunded;
        if !self.is_active() {
            return;
        }

        let hold = self.hold();
        match Handle::try_current() {
            Ok(handle) => {
                warn!(
                    "[QUOTA] 预扣未结算即被丢弃，后台退还 {}: request_id={}",
                    hold.user_reserved, hold.request_id
                );
                handle.spawn(self.inner.clone().refund(hold));
            }
            Err(_) => warn!(
                "[QUOTA] 没有运行时，无法退还预扣 {}: request_id={}, user_id={}",
                hold.user_reserved, hold.request_id, hold.user_id
            ),
        }
    }
}
