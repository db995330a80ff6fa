//! Cluster-state wrapper and on-disk persistence for the catalog.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::catalog::MetadataSnapshot;
use crate::resolver::{DocRelationResolver, RelationResolver};

/// One agreed-upon cluster state: the metadata catalog plus the epoch
/// at which it was committed.
///
/// Cheap to clone; the metadata is shared behind an `Arc`, so a no-op
/// mutation returns a snapshot whose metadata is pointer-equal to the
/// input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStateSnapshot {
    pub epoch: u64,
    pub metadata: Arc<MetadataSnapshot>,
}

impl ClusterStateSnapshot {
    pub fn new(epoch: u64, metadata: MetadataSnapshot) -> Self {
        Self {
            epoch,
            metadata: Arc::new(metadata),
        }
    }

    /// Fresh single-node state with an empty catalog.
    pub fn bootstrap() -> Self {
        Self::new(1, MetadataSnapshot::default())
    }

    /// Next committed state wrapping `metadata`, with the epoch bumped.
    pub fn with_metadata(&self, metadata: MetadataSnapshot) -> Self {
        Self {
            epoch: self.epoch.saturating_add(1),
            metadata: Arc::new(metadata),
        }
    }
}

/// JSON file persistence for the cluster state.
pub struct MetaStateStore {
    path: PathBuf,
}

impl MetaStateStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Loads persisted state, falling back to a fresh bootstrap
    /// snapshot when the file is missing or undecodable. Relations that
    /// fail re-resolution are kept but logged; reads of those relations
    /// will surface the same failure.
    pub fn load_or_init(&self) -> ClusterStateSnapshot {
        let Ok(data) = fs::read(&self.path) else {
            return ClusterStateSnapshot::bootstrap();
        };
        match serde_json::from_slice::<ClusterStateSnapshot>(&data) {
            Ok(state) => {
                let resolver = DocRelationResolver;
                for (name, _) in state.metadata.relations() {
                    if let Err(err) = resolver.resolve(name, &state.metadata) {
                        tracing::warn!(
                            relation = %name,
                            error = %err,
                            "persisted relation failed re-resolution on load"
                        );
                    }
                }
                state
            }
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to decode persisted cluster state; starting fresh"
                );
                ClusterStateSnapshot::bootstrap()
            }
        }
    }

    pub fn persist(&self, state: &ClusterStateSnapshot) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("create cluster state dir")?;
        }
        let data = serde_json::to_vec_pretty(state).context("serialize cluster state")?;
        fs::write(&self.path, data).context("write cluster state")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::create_relation;
    use strata_schema::{ColumnRef, DataType, RelationName, ServerVersion};

    #[test]
    fn bootstrap_starts_at_epoch_one_with_an_empty_catalog() {
        let state = ClusterStateSnapshot::bootstrap();
        assert_eq!(state.epoch, 1);
        assert!(state.metadata.is_empty());
        assert_eq!(state.metadata.column_oid(), 0);
    }

    #[test]
    fn with_metadata_bumps_the_epoch() {
        let state = ClusterStateSnapshot::bootstrap();
        let next = state.with_metadata(MetadataSnapshot::default());
        assert_eq!(next.epoch, 2);
    }

    #[test]
    fn missing_file_loads_as_bootstrap() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = MetaStateStore::open(dir.path().join("state.json"));
        assert_eq!(store.load_or_init(), ClusterStateSnapshot::bootstrap());
    }

    #[test]
    fn persisted_state_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = MetaStateStore::open(dir.path().join("meta/state.json"));

        let metadata = create_relation(
            &MetadataSnapshot::default(),
            RelationName::new("doc", "orders"),
            vec![ColumnRef::unassigned("id", DataType::Long, false)],
            vec![0],
            Vec::new(),
            ServerVersion::COLUMN_OID_VERSION,
        )
        .unwrap();
        let state = ClusterStateSnapshot::new(7, metadata);

        store.persist(&state).unwrap();
        assert_eq!(store.load_or_init(), state);
    }

    #[test]
    fn garbage_file_loads_as_bootstrap() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"not json").unwrap();
        let store = MetaStateStore::open(&path);
        assert_eq!(store.load_or_init(), ClusterStateSnapshot::bootstrap());
    }
}
