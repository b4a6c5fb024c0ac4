use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::errors::ConfigError;
use crate::tree::ConfigTree;

/// Shared pointer to the live [`ConfigTree`].
///
/// Readers take a snapshot with [`ConfigHandle::current`]; a reload swaps the
/// whole tree at once so no reader ever observes a half-applied change.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<ArcSwap<ConfigTree>>,
}

impl ConfigHandle {
    pub fn new(tree: ConfigTree) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(tree)) }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(Self::new(ConfigTree::load(path)?))
    }

    pub fn current(&self) -> Arc<ConfigTree> {
        self.inner.load_full()
    }

    pub fn replace(&self, tree: ConfigTree) {
        self.inner.store(Arc::new(tree));
    }

    /// Re-resolve from disk and the environment. On error the previous tree stays live.
    pub fn reload(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let tree = ConfigTree::load(path.as_ref())?;
        self.replace(tree);
        info!(path = %path.as_ref().display(), "configuration reloaded");
        Ok(())
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(ConfigTree::empty())
    }
}

impl From<ConfigTree> for ConfigHandle {
    fn from(tree: ConfigTree) -> Self {
        Self::new(tree)
    }
}
