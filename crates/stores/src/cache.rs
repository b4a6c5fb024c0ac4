//! Redis key/value facade.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use common::metrics::STORE_CONNECT_TOTAL;
use configs::{ConfigTree, RedisConfig};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, instrument};

use crate::errors::{StoreError, StoreKind, StoreResult};

const KIND: StoreKind = StoreKind::Cache;

/// Thin wrapper over one multiplexed Redis connection.
///
/// Until [`Cache::connect`] finds a `redis` section every operation returns
/// [`StoreError::Unavailable`].
#[derive(Default)]
pub struct Cache {
    conn: ArcSwapOption<ConnectionManager>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.load().is_some()
    }

    #[instrument(skip_all, fields(store = "cache"))]
    pub async fn connect(&self, config: &ConfigTree) -> StoreResult<()> {
        let Some(redis_cfg) = config
            .section::<RedisConfig>("redis")
            .map_err(|e| StoreError::config(KIND, e))?
        else {
            debug!("no redis section, cache left unconnected");
            return Ok(());
        };
        let client = redis::Client::open(redis_cfg.url()).map_err(|e| StoreError::config(KIND, e))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::connect(KIND, e))?;
        self.conn.store(Some(Arc::new(manager)));
        STORE_CONNECT_TOTAL.with_label_values(&[KIND.as_str()]).inc();
        info!(host = %redis_cfg.host, port = redis_cfg.port, db = redis_cfg.database, "cache connected");
        Ok(())
    }

    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn()?;
        let value: Option<String> = conn.get(key).await.map_err(|e| StoreError::operation(KIND, e))?;
        Ok(value)
    }

    /// Fetch and remove `key` in one round trip (`GETDEL`).
    pub async fn get_del(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn()?;
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::operation(KIND, e))?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let _: () = conn.set(key, value).await.map_err(|e| StoreError::operation(KIND, e))?;
        Ok(())
    }

    /// Remove `key`; returns whether it existed.
    pub async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let removed: i64 = conn.del(key).await.map_err(|e| StoreError::operation(KIND, e))?;
        Ok(removed > 0)
    }

    /// Append to the list at `key`; returns the new length.
    pub async fn rpush(&self, key: &str, value: &str) -> StoreResult<usize> {
        let mut conn = self.conn()?;
        let len: usize = conn.rpush(key, value).await.map_err(|e| StoreError::operation(KIND, e))?;
        Ok(len)
    }

    pub async fn rpop(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn()?;
        let value: Option<String> = conn.rpop(key, None).await.map_err(|e| StoreError::operation(KIND, e))?;
        Ok(value)
    }

    pub async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn()?;
        let value: Option<String> = conn.hget(key, field).await.map_err(|e| StoreError::operation(KIND, e))?;
        Ok(value)
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let _: i64 = conn.hset(key, field, value).await.map_err(|e| StoreError::operation(KIND, e))?;
        Ok(())
    }

    fn conn(&self) -> StoreResult<ConnectionManager> {
        self.conn
            .load_full()
            .map(|manager| (*manager).clone())
            .ok_or(StoreError::Unavailable(KIND))
    }
}
