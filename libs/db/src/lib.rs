//! SQLite database handle built on sqlx.
//!
//! `DbHandle` owns a `SqlitePool`, applies per-connection PRAGMAs taken from
//! the DSN, runs embedded migrations and hands out owned transactions. It
//! also carries a table of namespaced in-process locks (see [`locks`]) so
//! callers sharing one handle can serialize check-then-write sequences.
//!
//! # Example
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> db::Result<()> {
//!     use db::{ConnectOpts, DbHandle};
//!
//!     let db = DbHandle::connect("sqlite://data/app.db?wal=true", ConnectOpts::default()).await?;
//!
//!     sqlx::query("select 1").execute(db.pool()).await?;
//!
//!     let mut tx = db.begin().await?;
//!     sqlx::query("select 2").execute(&mut *tx).await?;
//!     tx.commit().await?;
//!
//!     db.close().await;
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod locks;
mod sqlite;

pub use locks::{DbLockGuard, KeyedLocks, LockConfig, LockError};
pub use sqlx::migrate::Migrator;

use std::str::FromStr;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use thiserror::Error;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Owned SQLite transaction. Dropping it without `commit()` rolls it back.
pub type SqliteTx = sqlx::Transaction<'static, Sqlite>;

/// Typed error for the DB handle and helpers.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Unknown DSN: {0}")]
    UnknownDsn(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Connection options.
#[derive(Clone, Debug)]
pub struct ConnectOpts {
    /// Maximum number of connections in the pool.
    pub max_conns: Option<u32>,
    /// Minimum number of connections in the pool.
    pub min_conns: Option<u32>,
    /// Timeout to acquire a connection from the pool.
    pub acquire_timeout: Option<Duration>,
    /// Idle timeout before a connection is closed.
    pub idle_timeout: Option<Duration>,
    /// Maximum lifetime for a connection.
    pub max_lifetime: Option<Duration>,
    /// Test connection health before acquire.
    pub test_before_acquire: bool,

    /// Busy timeout used when the DSN has no `busy_timeout` parameter.
    pub sqlite_busy_timeout: Option<Duration>,
    /// For file DSNs, create parent directories if missing.
    pub create_sqlite_dirs: bool,
}

impl Default for ConnectOpts {
    fn default() -> Self {
        Self {
            max_conns: Some(10),
            min_conns: None,
            acquire_timeout: Some(Duration::from_secs(30)),
            idle_timeout: None,
            max_lifetime: None,
            test_before_acquire: false,

            sqlite_busy_timeout: Some(Duration::from_millis(5_000)),
            create_sqlite_dirs: true,
        }
    }
}

/// Main handle.
pub struct DbHandle {
    pool: SqlitePool,
    dsn: String,
    in_memory: bool,
    locks: KeyedLocks,
}

impl DbHandle {
    /// Accept only `sqlite:` DSNs.
    ///
    /// Only leading whitespace is trimmed; the tail is not touched.
    pub fn validate_dsn(dsn: &str) -> Result<()> {
        let s = dsn.trim_start();
        if s.starts_with("sqlite:") {
            Ok(())
        } else {
            Err(DbError::UnknownDsn(dsn.to_string()))
        }
    }

    /// Connect and build handle.
    pub async fn connect(dsn: &str, opts: ConnectOpts) -> Result<Self> {
        Self::validate_dsn(dsn)?;
        let dsn = dsn.trim_start();

        let prepared = sqlite::prepare_sqlite_path(dsn, opts.create_sqlite_dirs)?;
        let (clean_dsn, pairs) = sqlite::extract_sqlite_pragmas(&prepared);
        let pragmas = sqlite::Pragmas::from_pairs(&pairs);
        let in_memory = sqlite::is_memory_dsn(&clean_dsn);

        let connect_opts = SqliteConnectOptions::from_str(&clean_dsn)?
            .create_if_missing(true)
            .foreign_keys(true);
        let connect_opts = pragmas.apply(connect_opts, in_memory, opts.sqlite_busy_timeout);

        let mut o = SqlitePoolOptions::new();
        if in_memory {
            // Every connection to `:memory:` is a separate database; keep exactly one alive.
            o = o
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            if let Some(n) = opts.max_conns {
                o = o.max_connections(n);
            }
            if let Some(n) = opts.min_conns {
                o = o.min_connections(n);
            }
            if let Some(t) = opts.idle_timeout {
                o = o.idle_timeout(t);
            }
            if let Some(t) = opts.max_lifetime {
                o = o.max_lifetime(t);
            }
        }
        if let Some(t) = opts.acquire_timeout {
            o = o.acquire_timeout(t);
        }
        if opts.test_before_acquire {
            o = o.test_before_acquire(true);
        }

        let pool = o.connect_with(connect_opts).await?;
        tracing::debug!(dsn = %clean_dsn, in_memory, "sqlite pool connected");

        Ok(Self {
            pool,
            dsn: clean_dsn,
            in_memory,
            locks: KeyedLocks::new(),
        })
    }

    /// Graceful pool close.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// DSN after PRAGMA parameters were stripped.
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    pub fn is_in_memory(&self) -> bool {
        self.in_memory
    }

    /// Begin an owned deferred transaction. Suitable for reads; a deferred
    /// transaction that reads and then writes fails with `SQLITE_BUSY` under
    /// WAL when another connection committed in between.
    pub async fn begin(&self) -> Result<SqliteTx> {
        Ok(self.pool.begin().await?)
    }

    /// Begin an owned transaction holding the write lock from the start.
    /// Competing writers wait up to the busy timeout instead of failing.
    pub async fn begin_immediate(&self) -> Result<SqliteTx> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Run `f` inside an immediate transaction; commit on `Ok`, roll back on `Err`.
    pub async fn transaction<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, std::result::Result<T, E>>,
        E: From<DbError>,
    {
        let mut tx = self.begin_immediate().await?;
        match f(&mut *tx).await {
            Ok(v) => {
                tx.commit().await.map_err(DbError::from)?;
                Ok(v)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    tracing::warn!(error = %rb, "transaction rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Apply embedded migrations.
    pub async fn run_migrations(&self, migrator: &Migrator) -> Result<()> {
        migrator.run(&self.pool).await?;
        Ok(())
    }

    // --- Locks ---

    /// Acquire the in-process lock `{module}:{key}` within `config.max_wait`.
    pub async fn lock(&self, module: &str, key: &str, config: &LockConfig) -> Result<DbLockGuard> {
        Ok(self.locks.lock(module, key, config).await?)
    }

    /// Non-blocking variant of [`DbHandle::lock`].
    pub fn try_lock(&self, module: &str, key: &str) -> Option<DbLockGuard> {
        self.locks.try_lock(module, key)
    }
}

// ===================== tests =====================
