//! 数据模型模块
//!
//! - `channel`: 上游渠道与路由能力
//! - `account`: 用户与令牌

pub mod account;
pub mod channel;

pub use account::{Token, TokenStatus, User, UserStatus};
pub use channel::{Ability, Channel, ChannelStatus};
