pub mod audit;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, DbBackend,
    DbErr, EntityTrait, QuerySelect, Select, Statement, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{debug, error, info};

pub use audit::WriteContext;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database with custom configuration
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!(
        max_connections = config.max_connections,
        "Configuring database connection"
    );

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("kasir_db.max_connections", config.max_connections as f64);

    let db_pool = Database::connect(opt).await.map_err(|e| {
        error!(error = %e, "Database connection establishment failed");
        ServiceError::db_error(e)
    })?;

    if db_pool.get_database_backend() == DbBackend::Sqlite {
        // Readers keep going while one writer holds the lock.
        db_pool
            .execute(Statement::from_string(
                DbBackend::Sqlite,
                "PRAGMA journal_mode = WAL".to_string(),
            ))
            .await
            .map_err(ServiceError::db_error)?;
    }

    info!("Database connection pool established successfully");
    Ok(db_pool)
}

/// Establish DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Apply all pending migrations.
pub async fn run_migrations(db: &DbPool) -> Result<(), DbErr> {
    info!("Running database migrations");
    crate::migrator::Migrator::up(db, None).await?;
    info!("Database migrations completed");
    Ok(())
}

/// Drop every table and reapply all migrations.
pub async fn reset_database(db: &DbPool) -> Result<(), DbErr> {
    info!("Resetting database schema");
    crate::migrator::Migrator::fresh(db).await
}

/// Opens a transaction and records it for the commit/rollback counters.
///
/// On SQLite the write lock is taken before anything is read, so concurrent
/// writers queue on the busy timeout instead of failing on a stale snapshot.
pub async fn begin(db: &DbPool) -> Result<DatabaseTransaction, ServiceError> {
    let txn = db.begin().await.map_err(|e| {
        error!(error = %e, "failed to begin transaction");
        ServiceError::db_error(e)
    })?;
    if txn.get_database_backend() == DbBackend::Sqlite {
        txn.execute(Statement::from_string(
            DbBackend::Sqlite,
            "UPDATE stocks SET id = id WHERE 1 = 0".to_string(),
        ))
        .await
        .map_err(|e| {
            error!(error = %e, "failed to take sqlite write lock");
            ServiceError::db_error(e)
        })?;
    }
    counter!("kasir_db.transactions.begun", 1);
    Ok(txn)
}

/// Commits and counts the transaction.
pub async fn commit(txn: DatabaseTransaction) -> Result<(), ServiceError> {
    txn.commit().await.map_err(|e| {
        error!(error = %e, "transaction commit failed");
        counter!("kasir_db.transactions.failed", 1);
        ServiceError::db_error(e)
    })?;
    counter!("kasir_db.transactions.committed", 1);
    Ok(())
}

/// Cheap liveness probe used by the health endpoint.
pub async fn ping(db: &DbPool) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    db.execute(Statement::from_string(backend, "SELECT 1".to_string()))
        .await
        .map(|_| ())
}

/// True when row locks (`SELECT ... FOR UPDATE`) are meaningful. SQLite
/// serializes writers on its own.
pub fn supports_row_locks<C: ConnectionTrait>(conn: &C) -> bool {
    matches!(
        conn.get_database_backend(),
        DbBackend::Postgres | DbBackend::MySql
    )
}

/// True when decimal columns are stored as exact NUMERIC. SQLite keeps
/// them as REAL, so arithmetic on them belongs in Rust.
pub fn has_exact_decimals<C: ConnectionTrait>(conn: &C) -> bool {
    !matches!(conn.get_database_backend(), DbBackend::Sqlite)
}

/// Adds `FOR UPDATE` to a select on backends that support it.
pub fn for_update<E, C>(select: Select<E>, conn: &C) -> Select<E>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    if supports_row_locks(conn) {
        select.lock_exclusive()
    } else {
        select
    }
}
