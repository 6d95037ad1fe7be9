//! 数据库连接建立
//!
//! URL 前缀决定后端。SQLite 走 sqlx 连接池并带一组 WAL 配套 pragma，
//! MySQL/PostgreSQL 用 Sea-ORM 的 ConnectOptions。超时统一来自
//! database.timeout 配置。

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

use crate::errors::{QrifyError, Result};
use migration::{Migrator, MigratorTrait};

/// SQLite 性能 pragma
const SQLITE_PRAGMAS: [(&str, &str); 4] = [
    ("cache_size", "-64000"),
    ("temp_store", "memory"),
    ("mmap_size", "536870912"),
    ("wal_autocheckpoint", "1000"),
];

pub async fn connect_sqlite(database_url: &str) -> Result<DatabaseConnection> {
    use sea_orm::SqlxSqliteConnector;
    use sea_orm::sqlx::SqlitePool;
    use sea_orm::sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
    use std::str::FromStr;

    let timeout = Duration::from_secs(crate::config::get_config().database.timeout);

    let mut opt = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| QrifyError::database_config(format!("SQLite URL 无法解析: {}", e)))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(timeout);
    for (key, value) in SQLITE_PRAGMAS {
        opt = opt.pragma(key, value);
    }

    let pool = SqlitePool::connect_with(opt)
        .await
        .map_err(|e| QrifyError::database_connection(format!("SQLite 连接失败: {}", e)))?;

    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

pub async fn connect_generic(database_url: &str, backend_name: &str) -> Result<DatabaseConnection> {
    let db_config = &crate::config::get_config().database;
    let connect_timeout = Duration::from_secs(db_config.timeout);

    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(db_config.pool_size)
        .min_connections(db_config.pool_size.min(5))
        .connect_timeout(connect_timeout)
        .acquire_timeout(connect_timeout)
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(3600))
        .sqlx_logging(false);

    Database::connect(opt).await.map_err(|e| {
        QrifyError::database_connection(format!(
            "{} 连接失败: {}",
            backend_name.to_uppercase(),
            e
        ))
    })
}

pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    Migrator::up(db, None)
        .await
        .map_err(|e| QrifyError::database_operation(format!("迁移失败: {}", e)))?;

    info!("Database migrations completed");
    Ok(())
}
