//! 数据访问对象

pub mod ability;
pub mod channel;
pub mod log;
pub mod token;
pub mod user;

pub use ability::AbilityDao;
pub use channel::ChannelDao;
pub use log::{ConsumeLog, LogDao};
pub use token::TokenDao;
pub use user::UserDao;
