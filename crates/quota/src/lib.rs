//! 额度账本
//!
//! 请求进入上游前按预估成本预扣（[`QuotaLedger::pre_consume`]），
//! 上游返回后按实际用量结算差额（[`QuotaLedger::consume`]），
//! 失败时退还预扣（[`QuotaLedger::undo`]）。结算和退款都在后台执行，不阻塞响应。
//!
//! 预扣结果是一个显式的状态机 [`Reservation`]：Reserved → Completed | Refunded。

pub mod error;
pub mod ledger;
pub mod notify;
pub mod pricing;
pub mod reservation;

pub use error::{QuotaError, QuotaResult};
pub use ledger::{QuotaContext, QuotaLedger};
pub use notify::{LogNotifier, LowBalanceWatch, QuotaNotice, QuotaNotifier};
pub use pricing::{GroupRatioTable, PriceQuote, PricingCatalog, StaticPricing, Usage};
pub use reservation::{Reservation, ReservationState};
