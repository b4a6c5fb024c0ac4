//! Postgres-backed relational store.
//!
//! The pool is bounded (`min 0`, `max 5`) and waits at most ten seconds for a
//! free connection. Connections are pool guards, so they go back to the pool
//! on every exit path including errors.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use common::metrics::STORE_CONNECT_TOTAL;
use configs::{ConfigTree, PostgresConfig};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, QueryResult, RuntimeErr,
    Statement, TryGetable, Value,
};
use tracing::{debug, info, instrument};
use url::Url;

use crate::errors::{StoreError, StoreKind, StoreResult};

pub const POOL_MIN_CONNECTIONS: u32 = 0;
pub const POOL_MAX_CONNECTIONS: u32 = 5;
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

const KIND: StoreKind = StoreKind::Relational;

/// SQLSTATE `invalid_catalog_name`: the requested database does not exist.
const INVALID_CATALOG_NAME: &str = "3D000";

#[derive(Default)]
pub struct Relational {
    pool: ArcSwapOption<DatabaseConnection>,
}

impl Relational {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.pool.load().is_some()
    }

    /// Open the pool described by the `postgres` section, creating the
    /// database when it is missing, then apply the schema script.
    ///
    /// Without a `postgres` section the store stays unconnected. Calling this
    /// again opens a fresh pool and drops the previous one.
    #[instrument(skip_all, fields(store = "relational"))]
    pub async fn connect(&self, config: &ConfigTree) -> StoreResult<()> {
        let Some(pg) = config
            .section::<PostgresConfig>("postgres")
            .map_err(|e| StoreError::config(KIND, e))?
        else {
            debug!("no postgres section, relational store left unconnected");
            return Ok(());
        };
        pg.validate().map_err(|e| StoreError::config(KIND, e))?;

        let target = dsn(&pg, &pg.database)?;
        let pool = match open_and_probe(&target, &pg.database).await {
            Ok(pool) => pool,
            Err(e) if is_missing_database(&e) => {
                debug!(database = %pg.database, "database does not exist");
                create_database(&pg).await?;
                info!(database = %pg.database, "created database");
                open_pool(&target).await.map_err(|e| StoreError::connect(KIND, e))?
            }
            Err(e) => return Err(StoreError::connect(KIND, e)),
        };

        apply_schema(&pool, &pg.schema).await?;
        self.pool.store(Some(Arc::new(pool)));
        STORE_CONNECT_TOTAL.with_label_values(&[KIND.as_str()]).inc();
        info!(host = %pg.host, port = pg.port, database = %pg.database, "relational store connected");
        Ok(())
    }

    /// Run a statement; returns the number of rows it affected.
    pub async fn execute<P>(&self, statement: &str, params: P) -> StoreResult<u64>
    where
        P: IntoIterator<Item = Value>,
    {
        let pool = self.pool()?;
        pool.execute(Statement::from_sql_and_values(DbBackend::Postgres, statement, params))
            .await
            .map(|done| done.rows_affected())
            .map_err(|e| StoreError::operation(KIND, e))
    }

    /// Run a statement and hand back the first column of its first row,
    /// e.g. the key from `INSERT ... RETURNING id`. `T` is whatever the
    /// column holds (`i32`, `i64`, `String`, `uuid::Uuid`, ...).
    ///
    /// `Ok(None)` when the statement returned no row. A column that does not
    /// decode as `T` is reported after the statement has already run.
    pub async fn execute_returning<T, P>(&self, statement: &str, params: P) -> StoreResult<Option<T>>
    where
        T: TryGetable,
        P: IntoIterator<Item = Value>,
    {
        let pool = self.pool()?;
        let row = pool
            .query_one(Statement::from_sql_and_values(DbBackend::Postgres, statement, params))
            .await
            .map_err(|e| StoreError::operation(KIND, e))?;
        match row {
            Some(row) => row
                .try_get_by_index::<T>(0)
                .map(Some)
                .map_err(|e| StoreError::operation(KIND, format_args!("statement ran, returned column unreadable: {e}"))),
            None => Ok(None),
        }
    }

    /// All rows matching `query`. An empty vector means zero rows, never failure.
    pub async fn fetch<P>(&self, query: &str, params: P) -> StoreResult<Vec<QueryResult>>
    where
        P: IntoIterator<Item = Value>,
    {
        let pool = self.pool()?;
        pool.query_all(Statement::from_sql_and_values(DbBackend::Postgres, query, params))
            .await
            .map_err(|e| StoreError::operation(KIND, e))
    }

    pub async fn fetch_one<P>(&self, query: &str, params: P) -> StoreResult<Option<QueryResult>>
    where
        P: IntoIterator<Item = Value>,
    {
        let pool = self.pool()?;
        pool.query_one(Statement::from_sql_and_values(DbBackend::Postgres, query, params))
            .await
            .map_err(|e| StoreError::operation(KIND, e))
    }

    /// Drop the pool. Outstanding handles keep it alive until they finish.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.swap(None) {
            if let Ok(pool) = Arc::try_unwrap(pool) {
                if let Err(e) = pool.close().await {
                    debug!(error = %e, "error while closing relational pool");
                }
            }
        }
    }

    fn pool(&self) -> StoreResult<Arc<DatabaseConnection>> {
        self.pool.load_full().ok_or(StoreError::Unavailable(KIND))
    }
}

fn dsn(pg: &PostgresConfig, database: &str) -> StoreResult<String> {
    let mut url = Url::parse("postgres://localhost").map_err(|e| StoreError::config(KIND, e))?;
    url.set_host(Some(&pg.host)).map_err(|e| StoreError::config(KIND, e))?;
    url.set_port(Some(pg.port))
        .map_err(|_| StoreError::config(KIND, "port cannot be set"))?;
    url.set_username(&pg.user)
        .map_err(|_| StoreError::config(KIND, "user cannot be set"))?;
    if !pg.password.is_empty() {
        url.set_password(Some(&pg.password))
            .map_err(|_| StoreError::config(KIND, "password cannot be set"))?;
    }
    url.set_path(database);
    Ok(url.to_string())
}

async fn open_pool(dsn: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opts = ConnectOptions::new(dsn.to_owned());
    opts.max_connections(POOL_MAX_CONNECTIONS)
        .min_connections(POOL_MIN_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_timeout(ACQUIRE_TIMEOUT)
        .sqlx_logging(false);
    Database::connect(opts).await
}

async fn open_and_probe(dsn: &str, database: &str) -> Result<DatabaseConnection, DbErr> {
    let pool = open_pool(dsn).await?;
    pool.query_one(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT 1 FROM pg_database WHERE datname = $1",
        [database.into()],
    ))
    .await?;
    Ok(pool)
}

fn is_missing_database(e: &DbErr) -> bool {
    let runtime = match e {
        DbErr::Conn(r) | DbErr::Exec(r) | DbErr::Query(r) => r,
        _ => return false,
    };
    match runtime {
        RuntimeErr::SqlxError(sea_orm::sqlx::Error::Database(db)) => {
            db.code().as_deref() == Some(INVALID_CATALOG_NAME)
        }
        _ => false,
    }
}

async fn create_database(pg: &PostgresConfig) -> StoreResult<()> {
    let server = open_pool(&dsn(pg, &pg.maintenance_database)?)
        .await
        .map_err(|e| StoreError::connect(KIND, e))?;
    let created = server
        .execute_unprepared(&format!("CREATE DATABASE {}", quote_ident(&pg.database)))
        .await;
    if let Err(e) = server.close().await {
        debug!(error = %e, "error while closing transient server pool");
    }
    match created {
        Ok(_) => Ok(()),
        // Another process won the race; the database is there either way.
        Err(e) if e.to_string().contains("already exists") => Ok(()),
        Err(e) => Err(StoreError::connect(KIND, e)),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

async fn apply_schema(pool: &DatabaseConnection, path: &Path) -> StoreResult<()> {
    let schema_err = |message: String| StoreError::Schema { path: path.display().to_string(), message };
    let sql = tokio::fs::read_to_string(path).await.map_err(|e| schema_err(e.to_string()))?;
    pool.execute_unprepared(&sql).await.map_err(|e| schema_err(e.to_string()))?;
    debug!(schema = %path.display(), "schema applied");
    Ok(())
}
