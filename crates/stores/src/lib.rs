//! Backend adapters behind one aggregate.
//!
//! [`Stores`] holds one adapter per backend kind. Each adapter starts
//! unconnected and is brought up by [`Stores::connect`], which runs the
//! connects one after another in [`StoreKind::CONNECT_ORDER`].

pub mod cache;
pub mod directory;
pub mod errors;
pub mod object;
pub mod relational;

use configs::ConfigTree;
use tracing::{error, info};

pub use cache::Cache;
pub use directory::Directory;
pub use errors::{StoreError, StoreKind, StoreResult};
pub use object::ObjectStore;
pub use relational::Relational;
pub use sea_orm::{QueryResult, Value as SqlValue};

#[derive(Default)]
pub struct Stores {
    pub relational: Relational,
    pub cache: Cache,
    pub directory: Directory,
    pub object: ObjectStore,
}

impl Stores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect every backend, sequentially: relational, cache, directory, object.
    ///
    /// Configuration errors from any backend and every relational or
    /// directory failure abort the sequence. A cache or object store that
    /// cannot reach its server is logged and left unconnected.
    pub async fn connect(&self, config: &ConfigTree) -> StoreResult<()> {
        self.relational.connect(config).await?;
        tolerate(StoreKind::Cache, self.cache.connect(config).await)?;
        self.directory.connect(config).await?;
        tolerate(StoreKind::Object, self.object.connect(config).await)?;
        info!(connected = ?self.connected(), "stores connected");
        Ok(())
    }

    pub fn is_connected(&self, kind: StoreKind) -> bool {
        match kind {
            StoreKind::Relational => self.relational.is_connected(),
            StoreKind::Cache => self.cache.is_connected(),
            StoreKind::Directory => self.directory.is_connected(),
            StoreKind::Object => self.object.is_connected(),
        }
    }

    /// Kinds that currently hold a live connection, in connect order.
    pub fn connected(&self) -> Vec<StoreKind> {
        StoreKind::CONNECT_ORDER
            .into_iter()
            .filter(|kind| self.is_connected(*kind))
            .collect()
    }
}

fn tolerate(kind: StoreKind, result: StoreResult<()>) -> StoreResult<()> {
    match result {
        Err(e @ StoreError::Connect { .. }) => {
            error!(store = %kind, error = %e, "store unreachable, continuing without it");
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn empty_config_only_brings_up_directory() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let tree = ConfigTree::from_value(json!({"directory": tmp.path().join("root")}));
        let stores = Stores::new();
        stores.connect(&tree).await?;
        assert_eq!(stores.connected(), vec![StoreKind::Directory]);
        assert!(tmp.path().join("root").is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn relational_config_error_aborts_before_other_stores() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let tree = ConfigTree::from_value(json!({
            "postgres": {"user": "app", "database": ""},
            "directory": tmp.path().join("root"),
        }));
        let stores = Stores::new();
        let err = stores.connect(&tree).await.unwrap_err();
        assert!(err.is_config());
        assert!(stores.connected().is_empty());
        Ok(())
    }

    #[test]
    fn unreachable_cache_is_tolerated_but_config_errors_are_not() {
        assert!(tolerate(StoreKind::Cache, Err(StoreError::connect(StoreKind::Cache, "refused"))).is_ok());
        assert!(tolerate(StoreKind::Cache, Err(StoreError::config(StoreKind::Cache, "bad url"))).is_err());
    }
}
