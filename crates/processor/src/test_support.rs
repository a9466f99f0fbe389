//! 单元测试夹具

use relaycast_balancer::{ChannelChooser, SqliteRoutingSource};
use relaycast_core::config::{ModelPrice, QuotaConfig};
use relaycast_core::database::dao::{AbilityDao, ChannelDao, TokenDao, UserDao};
use relaycast_core::database::{lock_db, open_database, DbConnection};
use relaycast_core::models::{Channel, Token, TokenStatus, User, UserStatus};
use relaycast_core::{AccountLookup, MemoryCache, SharedCacheRef};
use relaycast_quota::{GroupRatioTable, QuotaLedger, StaticPricing};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const MODEL: &str = "gpt-4o";

pub struct Fixture {
    pub db: DbConnection,
    pub cache: SharedCacheRef,
    pub lookup: AccountLookup,
    pub chooser: Arc<ChannelChooser>,
    pub ledger: QuotaLedger,
}

/// alice(default, 10000) 持有 sk-alice(1000)；bob 已禁用；两个 default 渠道
pub fn fixture() -> Fixture {
    let db = open_database(":memory:").unwrap();
    {
        let conn = lock_db(&db).unwrap();
        UserDao::insert(&conn, &User::new(1, "alice", "default", 10_000)).unwrap();
        let mut bob = User::new(2, "bob", "default", 10_000);
        bob.status = UserStatus::Disabled;
        UserDao::insert(&conn, &bob).unwrap();

        TokenDao::insert(&conn, &Token::new(1, 1, "sk-alice-0001", 1_000)).unwrap();
        TokenDao::insert(&conn, &Token::new(2, 2, "sk-bob-0002", 1_000)).unwrap();
        let mut disabled = Token::new(3, 1, "sk-disabled-0003", 1_000);
        disabled.status = TokenStatus::Disabled;
        TokenDao::insert(&conn, &disabled).unwrap();
        let mut expired = Token::new(4, 1, "sk-expired-0004", 1_000);
        expired.expired_time = 1;
        TokenDao::insert(&conn, &expired).unwrap();
        TokenDao::insert(&conn, &Token::new(5, 1, "sk-empty-0005", 0)).unwrap();
        TokenDao::insert(&conn, &Token::new(6, 1, "sk-unlimited-0006", 0).unlimited()).unwrap();

        for channel in [
            Channel::new(1, "primary", "default", MODEL),
            Channel::new(2, "backup", "default", MODEL),
        ] {
            ChannelDao::insert(&conn, &channel).unwrap();
            AbilityDao::rebuild_for_channel(&conn, &channel).unwrap();
        }
    }

    let cache: SharedCacheRef = Arc::new(MemoryCache::new());
    let lookup = AccountLookup::new(db.clone(), Some(cache.clone()), Duration::from_secs(60));
    let chooser = Arc::new(ChannelChooser::new(Duration::from_secs(60)));
    chooser.load(&SqliteRoutingSource::new(db.clone())).unwrap();
    let pricing = StaticPricing::new(HashMap::from([(MODEL.to_string(), ModelPrice::new(1.0, 2.0))]));
    let ledger = QuotaLedger::new(
        lookup.clone(),
        Arc::new(pricing),
        Arc::new(GroupRatioTable::default()),
        QuotaConfig::default(),
    );

    Fixture {
        db,
        cache,
        lookup,
        chooser,
        ledger,
    }
}
