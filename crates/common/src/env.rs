//! Environment/runtime helpers

use std::path::Path;

use tracing::debug;

/// First non-empty value among `names`, checked in order.
pub fn first_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

/// Create `dir` (and parents) if missing.
pub async fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    if tokio::fs::metadata(dir).await.is_ok() {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {e}", dir.display()))?;
    debug!(dir = %dir.display(), "created directory");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_dir_creates_nested_path() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let nested = tmp.path().join("a/b/c");
        ensure_dir(&nested).await?;
        assert!(nested.is_dir());
        // second call is a no-op
        ensure_dir(&nested).await?;
        Ok(())
    }

    #[test]
    fn first_var_skips_unset_names() {
        assert_eq!(first_var(&["BACKBONE_TEST_SURELY_UNSET_1", "BACKBONE_TEST_SURELY_UNSET_2"]), None);
    }
}
