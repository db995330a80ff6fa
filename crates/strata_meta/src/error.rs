//! Failure taxonomy for schema mutations and relation resolution.

use strata_schema::{RelationName, SchemaViolation};
use thiserror::Error;

pub type MetaResult<T> = Result<T, MetaError>;

/// Failure modes of one schema mutation.
///
/// Every failure aborts the whole mutation; the caller's snapshot is
/// never partially updated. None of these are retried at this layer.
#[derive(Debug, Error)]
pub enum MetaError {
    /// Requested relation is absent from the current metadata.
    #[error("relation {relation} does not exist")]
    TableNotFound { relation: RelationName },

    /// Request is inconsistent with the current schema. Permanent;
    /// surfaced to the client.
    #[error("schema conflict on {relation}: {reason}")]
    SchemaConflict {
        relation: RelationName,
        reason: String,
    },

    /// The storage collaborator rejected the new shape. The builder was
    /// discarded before finalize.
    #[error("storage reconciliation rejected the new shape of {relation}")]
    StorageReconciliationFailed {
        relation: RelationName,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The freshly built metadata failed re-resolution. The candidate
    /// was discarded and never published; indicates an internal
    /// modeling inconsistency rather than bad user input.
    #[error("rebuilt metadata for {relation} failed re-resolution")]
    ValidationFailed {
        relation: RelationName,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The current persisted document for the relation could not be
    /// read back into a schema.
    #[error("persisted document for {relation} could not be read")]
    Corrupt {
        relation: RelationName,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Errors surfaced by a relation resolver.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("relation not found")]
    NotFound,

    #[error("relation document could not be decoded")]
    Corrupt {
        #[source]
        source: serde_json::Error,
    },

    #[error("relation document failed validation")]
    Invalid(#[from] SchemaViolation),

    /// Document decoded and validated but disagrees with its snapshot,
    /// e.g. an oid above the cluster-wide counter.
    #[error("relation document is inconsistent with its snapshot: {reason}")]
    Inconsistent { reason: String },
}
