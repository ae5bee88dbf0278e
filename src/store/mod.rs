// ABOUTME: Object store abstraction for the export target
// ABOUTME: S3, local-directory and in-memory backends behind one async trait

pub mod layout;
pub mod local;
pub mod memory;
pub mod s3;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::TargetConfig;

pub use layout::{archive_label, KeyLayout};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use s3::S3Store;

pub const CSV_CONTENT_TYPE: &str = "text/csv";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Minimal object store surface the sync cycle needs.
///
/// Keys are `/`-separated paths relative to the store root. Missing objects
/// are reported as `Ok(None)` / `Ok(false)`, never as errors.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Cheap check whether at least one object exists under `prefix`.
    async fn has_objects(&self, prefix: &str) -> Result<bool>;

    /// All keys under `prefix`, sorted.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    /// Move an object to a new key. The source no longer exists afterwards.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;
}

/// Open the store described by the target configuration.
pub async fn open(target: &TargetConfig) -> Result<Box<dyn ObjectStore>> {
    match target {
        TargetConfig::S3 {
            bucket,
            region,
            endpoint,
            force_path_style,
        } => {
            let store = S3Store::connect(
                bucket,
                region.as_deref(),
                endpoint.as_deref(),
                *force_path_style,
            )
            .await?;
            Ok(Box::new(store))
        }
        TargetConfig::Local { root } => Ok(Box::new(LocalStore::new(root.clone()))),
    }
}
