// ABOUTME: In-process object store used by tests and dry runs
// ABOUTME: Keeps objects in a sorted map guarded by an async RwLock

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::ObjectStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every object, for byte-level comparisons in tests.
    pub async fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.objects.read().await.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn has_objects(&self, prefix: &str) -> Result<bool> {
        let objects = self.objects.read().await;
        Ok(objects
            .range(prefix.to_string()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(prefix)))
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.read().await;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<()> {
        self.objects.write().await.insert(key.to_string(), body);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut objects = self.objects.write().await;
        let Some(body) = objects.remove(from) else {
            bail!("Cannot move {}: object does not exist", from);
        };
        objects.insert(to.to_string(), body);
        Ok(())
    }
}
