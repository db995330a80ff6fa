//! Seam to the storage-engine mapping layer.

use strata_schema::{RelationName, TableSchema};

/// Materializes a schema change against the underlying storage unit.
///
/// Invoked at most once per accepted mutation, after the new schema is
/// staged and before the metadata builder is finalized. A failure
/// aborts the mutation with the builder discarded, so implementations
/// must be safe to call for shapes that are never committed. May block
/// on file or network I/O.
pub trait StorageReconciler: Send + Sync {
    fn reconcile(&self, relation: &RelationName, schema: &TableSchema) -> anyhow::Result<()>;
}

/// Reconciler for embedded and test use; accepts every shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReconciler;

impl StorageReconciler for NoopReconciler {
    fn reconcile(&self, _relation: &RelationName, _schema: &TableSchema) -> anyhow::Result<()> {
        Ok(())
    }
}
