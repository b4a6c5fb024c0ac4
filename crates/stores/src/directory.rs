//! Local filesystem store rooted at a single directory.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use common::metrics::STORE_CONNECT_TOTAL;
use configs::{ConfigTree, DirectoryConfig};
use directories::BaseDirs;
use futures::stream::{self, Stream};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::errors::{StoreError, StoreKind, StoreResult};

const KIND: StoreKind = StoreKind::Directory;
const DEFAULT_DIR_NAME: &str = ".backbone";

#[derive(Default)]
pub struct Directory {
    root: ArcSwapOption<PathBuf>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.root.load().is_some()
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.root.load_full().map(|root| (*root).clone())
    }

    /// Resolve the root from the `directory` section (default `~/.backbone`) and create it.
    #[instrument(skip_all, fields(store = "directory"))]
    pub async fn connect(&self, config: &ConfigTree) -> StoreResult<()> {
        let root = match config
            .section::<DirectoryConfig>("directory")
            .map_err(|e| StoreError::config(KIND, e))?
        {
            Some(dir) => expand_home(dir.root()),
            None => default_root(),
        };
        common::env::ensure_dir(&root)
            .await
            .map_err(|e| StoreError::connect(KIND, e))?;
        info!(root = %root.display(), "directory store ready");
        self.root.store(Some(Arc::new(root)));
        STORE_CONNECT_TOTAL.with_label_values(&[KIND.as_str()]).inc();
        Ok(())
    }

    pub async fn read(&self, path: &str) -> StoreResult<String> {
        let full = self.resolve(path)?;
        fs::read_to_string(&full).await.map_err(|e| not_found_or_failed(path, e))
    }

    /// Write `contents`, creating any missing parent directories.
    pub async fn write(&self, path: &str, contents: &str) -> StoreResult<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::operation(KIND, format_args!("{path}: {e}")))?;
        }
        fs::write(&full, contents)
            .await
            .map_err(|e| StoreError::operation(KIND, format_args!("{path}: {e}")))?;
        debug!(path, bytes = contents.len(), "file written");
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> StoreResult<()> {
        let full = self.resolve(path)?;
        fs::remove_file(&full).await.map_err(|e| not_found_or_failed(path, e))
    }

    /// Lazily list file names in `subdir` that start with `prefix`.
    ///
    /// Each item is read from the live directory when polled; nothing is
    /// snapshotted up front. A missing `subdir` yields an empty stream.
    pub fn walk(&self, subdir: &str, prefix: &str) -> StoreResult<impl Stream<Item = String> + Send + 'static> {
        let dir = self.resolve(subdir)?;
        let prefix: Arc<str> = Arc::from(prefix);
        Ok(stream::unfold(Walk::Pending(dir), move |state| {
            let prefix = Arc::clone(&prefix);
            async move { state.next_match(&prefix).await }
        }))
    }

    fn resolve(&self, relative: &str) -> StoreResult<PathBuf> {
        let root = self.root.load_full().ok_or(StoreError::Unavailable(KIND))?;
        let rel = Path::new(relative);
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(StoreError::InvalidPath(relative.to_string())),
            }
        }
        Ok(root.join(rel))
    }
}

enum Walk {
    Pending(PathBuf),
    Open(fs::ReadDir),
}

impl Walk {
    async fn next_match(self, prefix: &str) -> Option<(String, Walk)> {
        let mut entries = match self {
            Walk::Pending(dir) => match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "walk target unreadable");
                    return None;
                }
            },
            Walk::Open(entries) => entries,
        };
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
                    if is_file && name.starts_with(prefix) {
                        return Some((name, Walk::Open(entries)));
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, "directory walk interrupted");
                    return None;
                }
            }
        }
    }
}

fn not_found_or_failed(path: &str, e: std::io::Error) -> StoreError {
    if e.kind() == ErrorKind::NotFound {
        StoreError::NotFound(path.to_string())
    } else {
        StoreError::operation(KIND, format_args!("{path}: {e}"))
    }
}

fn default_root() -> PathBuf {
    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(DEFAULT_DIR_NAME),
        None => PathBuf::from(DEFAULT_DIR_NAME),
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), BaseDirs::new()) {
        (Ok(rest), Some(dirs)) => dirs.home_dir().join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tilde_expands_to_home() {
        let expanded = expand_home(Path::new("~/data"));
        if BaseDirs::new().is_some() {
            assert!(!expanded.starts_with("~"));
            assert!(expanded.ends_with("data"));
        }
        assert_eq!(expand_home(Path::new("/srv/data")), PathBuf::from("/srv/data"));
    }

    #[test]
    fn default_root_ends_with_dir_name() {
        assert!(default_root().ends_with(DEFAULT_DIR_NAME));
    }

    #[tokio::test]
    async fn unconnected_store_is_unavailable() {
        let store = Directory::new();
        assert!(matches!(store.read("a.txt").await, Err(StoreError::Unavailable(StoreKind::Directory))));
    }
}
