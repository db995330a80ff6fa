//! Schema-mutation core for the StrataDB catalog.
//!
//! One mutation is applied at a time by an external single-writer
//! sequencer: the executor here is a pure function of
//! `(cluster state, request)` that either returns the state unchanged
//! (no-op), a new committed state, or a typed failure with no partial
//! effect. Structural validity is enforced by re-deriving every
//! relation from its persisted document before a candidate catalog is
//! published.

pub mod catalog;
pub mod error;
pub mod executor;
pub mod identity;
pub mod resolver;
pub mod state;
pub mod storage;

pub use catalog::{create_relation, MetadataBuilder, MetadataSnapshot, RelationDoc};
pub use error::{MetaError, MetaResult, ResolveError};
pub use executor::{AddColumnRequest, AddColumnTask};
pub use identity::assign_identities;
pub use resolver::{DocRelationResolver, RelationResolver};
pub use state::{ClusterStateSnapshot, MetaStateStore};
pub use storage::{NoopReconciler, StorageReconciler};
