//! Database connection and pool management.

use crate::error::{ErrorKind, Result, SqlxResultExt};
use crate::models::Table;
use crate::repo::Repository;
use crate::url::{Backend, DatabaseUrl};
use exn::ResultExt;
use manga_config::DatabaseConfig;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyConnection, AnyPool, Connection};
use sqlx::pool::PoolConnectionMetadata;
use std::time::Duration;
use tracing::instrument;

// Bot traffic is bursty but low volume, so 5-ish.
const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Database connection pool for the store.
///
/// This is the main entry point: build one at startup with
/// [`configure`](Self::configure) or [`from_config`](Self::from_config), call
/// [`connect`](Self::connect) once, then hand out clones (or
/// [`Repository`] handles) to whatever needs them. Clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: AnyPool,
    backend: Backend,
}

impl Database {
    fn new(url: DatabaseUrl, max: u32, acquire_timeout: Duration) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let mut options = AnyPoolOptions::new()
            // Runs for EVERY pooled connection, not only the first one.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max.max(1))
            .acquire_timeout(acquire_timeout);
        if url.is_in_memory() {
            // Each in-memory connection is its own database; the single
            // connection must never be recycled or the data goes with it.
            options = options.max_connections(1).idle_timeout(None).max_lifetime(None);
        }
        let pool = options
            .connect_lazy(url.as_str())
            .or_raise(|| ErrorKind::InvalidUrl(url.to_string()))?;
        tracing::debug!(backend = %url.backend(), "database pool configured");
        Ok(Self { pool, backend: url.backend() })
    }

    /// Build a pool for the given connection string.
    ///
    /// No connection is opened until the first operation. The connection
    /// string is normalized first (see [`DatabaseUrl`]).
    pub fn configure(url: impl AsRef<str>) -> Result<Self> {
        let url: DatabaseUrl = url.as_ref().parse()?;
        Self::new(url, MAX_CONNECTIONS, ACQUIRE_TIMEOUT)
    }

    /// Build a pool from loaded configuration.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let url: DatabaseUrl = config.url.parse()?;
        Self::new(url, config.max_connections, Duration::from_secs(config.acquire_timeout_secs))
    }

    /// Connect to an in-memory database with the schema already created.
    ///
    /// Note:
    /// - In-memory databases are destroyed when the pool closes.
    /// - Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let db = Self::new(DatabaseUrl::in_memory(), 1, ACQUIRE_TIMEOUT)?;
        db.connect().await?;
        Ok(db)
    }

    /// SQLite settings that have to be applied per connection. The `Any`
    /// driver has no typed options for them, so they are plain PRAGMAs.
    async fn apply_pragmas(conn: &mut AnyConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        if conn.backend_name() != "SQLite" {
            return Ok(());
        }
        sqlx::query(
            r#"
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 1500;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Ensure every table exists.
    ///
    /// Must be called once before any other operation. Tables that already
    /// exist are left alone, so calling this repeatedly is harmless.
    #[instrument("creating database schema", skip(self), fields(backend = %self.backend))]
    pub async fn connect(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.or_classify(None)?;
        for table in Table::ALL {
            sqlx::query(table.schema())
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Schema)?;
        }
        tx.commit().await.or_classify(None)?;
        Ok(())
    }

    /// Check that a connection can be acquired and answers.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.or_classify(None)?;
        conn.ping().await.or_classify(None)
    }

    /// Repository handle sharing this pool.
    pub fn repo(&self) -> Repository {
        Repository::from(self)
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Get a reference to the underlying connection pool.
    ///
    /// This is useful for running custom queries or transactions.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Close the database connection pool.
    ///
    /// This waits for all connections to be returned to the pool and then
    /// closes them. After calling this, the Database instance should not
    /// be used.
    pub async fn close(&self) {
        if self.backend == Backend::Sqlite {
            // Let SQLite update query planner statistics
            _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        }
        self.pool.close().await;
    }
}
