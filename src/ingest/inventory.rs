// ABOUTME: Snapshot inventory - detects whether any export exists yet
// ABOUTME: A single cheap existence probe on the live prefix

use anyhow::{Context, Result};

use crate::store::{KeyLayout, ObjectStore};

pub struct SnapshotInventory<'a> {
    store: &'a dyn ObjectStore,
    layout: &'a KeyLayout,
}

impl<'a> SnapshotInventory<'a> {
    pub fn new(store: &'a dyn ObjectStore, layout: &'a KeyLayout) -> Self {
        Self { store, layout }
    }

    /// `false` only while nothing has ever been exported to the live area.
    ///
    /// Store errors propagate: the cycle cannot choose between a first run
    /// and an incremental one without this answer.
    pub async fn has_any_artifacts(&self) -> Result<bool> {
        let prefix = self.layout.live_dir();
        self.store
            .has_objects(&prefix)
            .await
            .with_context(|| format!("Failed to check for existing exports under {}", prefix))
    }
}
