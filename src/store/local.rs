// ABOUTME: Object store backed by a directory on the local filesystem
// ABOUTME: Keys map to relative paths below the configured root

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use super::ObjectStore;

/// Stores objects as plain files, e.g. `root/current/orders.csv`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("Invalid object key: {:?}", key);
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn has_objects(&self, prefix: &str) -> Result<bool> {
        Ok(!self.list_keys(prefix).await?.is_empty())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        // Only walk the deepest directory the prefix pins down.
        let start_dir = match prefix.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => self.path_for(dir)?,
            _ => self.root.clone(),
        };

        let mut keys = Vec::new();
        let mut pending = vec![start_dir];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to list directory {:?}", dir))
                }
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .with_context(|| format!("Failed to read directory {:?}", dir))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .with_context(|| format!("Failed to stat {:?}", path))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to stat {:?}", path))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        Self::ensure_parent(&path).await?;
        fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write {:?}", path))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let source = self.path_for(from)?;
        let destination = self.path_for(to)?;
        Self::ensure_parent(&destination).await?;
        fs::rename(&source, &destination)
            .await
            .with_context(|| format!("Failed to move {:?} to {:?}", source, destination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_and_list() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        assert!(!store.has_objects("current/").await.unwrap());
        store.put("current/orders.csv", b"id\n1\n".to_vec(), "text/csv").await.unwrap();
        store.put("current/staff.csv", b"id\n".to_vec(), "text/csv").await.unwrap();
        store.put("watermarks/orders.json", b"{}".to_vec(), "application/json").await.unwrap();

        assert!(store.has_objects("current/").await.unwrap());
        assert_eq!(
            store.list_keys("current/").await.unwrap(),
            vec!["current/orders.csv".to_string(), "current/staff.csv".to_string()]
        );
        assert_eq!(
            store.get("current/orders.csv").await.unwrap(),
            Some(b"id\n1\n".to_vec())
        );
        assert_eq!(store.get("current/missing.csv").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rename_creates_archive_directories() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.put("current/orders.csv", b"x".to_vec(), "text/csv").await.unwrap();

        store
            .rename("current/orders.csv", "archive/2024-01-01T00:00:00.000000Z/orders.csv")
            .await
            .unwrap();

        assert!(!store.exists("current/orders.csv").await.unwrap());
        assert!(store
            .exists("archive/2024-01-01T00:00:00.000000Z/orders.csv")
            .await
            .unwrap());
        assert!(!store.has_objects("current/").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(store.get("../etc/passwd").await.is_err());
        assert!(store.put("/abs", vec![], "text/plain").await.is_err());
    }
}
