//! 持久化存储
//!
//! 使用单个 SQLite 连接，由互斥锁保护，所有 DAO 都接收 `&Connection`。

pub mod dao;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::warn;

/// 共享数据库连接
pub type DbConnection = Arc<Mutex<Connection>>;

/// 打开数据库并初始化表结构，`:memory:` 打开内存库
pub fn open_database(path: &str) -> Result<DbConnection, rusqlite::Error> {
    let conn = if path == ":memory:" {
        Connection::open_in_memory()?
    } else {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                // 失败时由随后的 open 返回错误
                if let Err(e) = std::fs::create_dir_all(parent) {
                    warn!("[DB] 创建数据库目录失败: {}: {}", parent.display(), e);
                }
            }
        }
        Connection::open(path)?
    };
    conn.busy_timeout(Duration::from_secs(5))?;
    schema::create_tables(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 获取数据库锁
pub fn lock_db(db: &DbConnection) -> Result<MutexGuard<'_, Connection>, String> {
    db.lock().map_err(|e| format!("数据库锁获取失败: {e}"))
}
