//! Relation schema value types for the StrataDB catalog.
//!
//! Everything in this crate is an immutable value with structural
//! equality. Schemas are never mutated in place; a structural change
//! always produces a new `TableSchema`.

pub mod relation;
pub mod version;

pub use relation::{
    CheckConstraint, ColumnIdentity, ColumnRef, DataType, InvalidRelationName, RelationName,
    SchemaViolation, TableSchema,
};
pub use version::{IdentityEra, ServerVersion};
