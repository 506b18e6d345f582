//! File-backed recipe store.
//!
//! Maps recipe names to files under the base directory. A name that already
//! has a file is a duplicate and refused at intake; the store never
//! overwrites a recipe. The combined job output lives at a single
//! well-known log path, overwritten each run.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::StoreError;

/// Recipe artifacts on disk.
pub struct RecipeStore {
    base_dir: PathBuf,
    log_file: String,
}

impl RecipeStore {
    pub fn new(base_dir: PathBuf, log_file: String) -> Self {
        Self { base_dir, log_file }
    }

    /// Ensure the base directory exists.
    pub async fn ensure_dirs(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }

    /// Absolute path a recipe name maps to.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// The well-known log artifact path.
    pub fn log_path(&self) -> PathBuf {
        self.base_dir.join(&self.log_file)
    }

    /// Whether a recipe with this name has already been stored.
    pub async fn contains(&self, name: &str) -> bool {
        fs::try_exists(self.path_for(name)).await.unwrap_or(false)
    }

    /// Persist a new recipe. The duplicate check happens at intake; this
    /// simply writes the bytes.
    pub async fn save(&self, name: &str, content: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.path_for(name);
        fs::write(&path, content).await?;
        Ok(path)
    }

    /// Load a stored recipe's bytes.
    pub async fn load(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        Ok(fs::read(self.path_for(name)).await?)
    }

    /// Overwrite the log artifact with a run's combined output record.
    pub async fn write_log(&self, record: &str) -> Result<PathBuf, StoreError> {
        let path = self.log_path();
        fs::write(&path, record.as_bytes()).await?;
        Ok(path)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> RecipeStore {
        RecipeStore::new(dir.to_path_buf(), "log.txt".into())
    }

    #[tokio::test]
    async fn save_and_contains() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        assert!(!store.contains("foo.yaml").await);
        store.save("foo.yaml", b"models: []").await.unwrap();
        assert!(store.contains("foo.yaml").await);
        assert_eq!(store.load("foo.yaml").await.unwrap(), b"models: []");
    }

    #[tokio::test]
    async fn log_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store.write_log("STDOUT: first, STDERR: ").await.unwrap();
        store.write_log("STDOUT: second, STDERR: ").await.unwrap();

        let contents = tokio::fs::read_to_string(store.log_path()).await.unwrap();
        assert_eq!(contents, "STDOUT: second, STDERR: ");
    }

    #[tokio::test]
    async fn load_missing_recipe_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(store.load("nothing.yaml").await.is_err());
    }
}
