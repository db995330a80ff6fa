//! Relation resolution: re-deriving a schema from its persisted
//! document.

use strata_schema::{RelationName, TableSchema};

use crate::catalog::MetadataSnapshot;
use crate::error::ResolveError;

/// Resolves a relation name against a metadata snapshot.
///
/// Must be deterministic and side-effect free: the mutation executor
/// uses the same resolver both to read the current schema and to
/// validate a freshly built catalog before it is published.
pub trait RelationResolver: Send + Sync {
    fn resolve(
        &self,
        name: &RelationName,
        metadata: &MetadataSnapshot,
    ) -> Result<TableSchema, ResolveError>;
}

/// Production resolver: decode the persisted document and run full
/// structural validation, plus cross-checks against the snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocRelationResolver;

impl RelationResolver for DocRelationResolver {
    fn resolve(
        &self,
        name: &RelationName,
        metadata: &MetadataSnapshot,
    ) -> Result<TableSchema, ResolveError> {
        let doc = metadata.get(name).ok_or(ResolveError::NotFound)?;
        let schema = doc
            .decode()
            .map_err(|source| ResolveError::Corrupt { source })?;
        if schema.relation != *name {
            return Err(ResolveError::Inconsistent {
                reason: format!(
                    "document stored under {name} describes {}",
                    schema.relation
                ),
            });
        }
        schema.validate()?;
        if let Some(max_oid) = schema.max_oid() {
            if max_oid > metadata.column_oid() {
                return Err(ResolveError::Inconsistent {
                    reason: format!(
                        "column oid {max_oid} exceeds cluster counter {}",
                        metadata.column_oid()
                    ),
                });
            }
        }
        Ok(schema)
    }
}
