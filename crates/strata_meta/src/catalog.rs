//! Cluster-wide metadata snapshot and its copy-on-write builder.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_schema::{
    CheckConstraint, ColumnRef, IdentityEra, RelationName, ServerVersion, TableSchema,
};

use crate::error::{MetaError, MetaResult};
use crate::identity::assign_identities;

/// Persisted representation of one relation: the JSON document the
/// rest of the cluster replicates. Reads always re-derive the schema
/// from this document instead of trusting in-memory values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationDoc {
    doc: serde_json::Value,
}

impl RelationDoc {
    pub fn encode(schema: &TableSchema) -> serde_json::Result<Self> {
        Ok(Self {
            doc: serde_json::to_value(schema)?,
        })
    }

    pub fn decode(&self) -> serde_json::Result<TableSchema> {
        serde_json::from_value(self.doc.clone())
    }

    /// Wraps a raw document, e.g. one received from replication or
    /// recovery tooling. The document is not validated here; resolution
    /// is where malformed documents surface.
    pub fn from_value(doc: serde_json::Value) -> Self {
        Self { doc }
    }
}

/// The full immutable catalog: every relation's persisted document plus
/// the cluster-wide column oid counter.
///
/// Invariant: every oid referenced by any relation is less than or
/// equal to `column_oid` and unique within its owning relation. New
/// snapshots are produced only by [`MetadataBuilder::build`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    relations: BTreeMap<RelationName, Arc<RelationDoc>>,
    column_oid: u64,
}

impl MetadataSnapshot {
    pub fn get(&self, name: &RelationName) -> Option<&Arc<RelationDoc>> {
        self.relations.get(name)
    }

    pub fn contains(&self, name: &RelationName) -> bool {
        self.relations.contains_key(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = (&RelationName, &Arc<RelationDoc>)> {
        self.relations.iter()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Current value of the cluster-wide column oid counter; the
    /// highest oid ever issued under this snapshot's lineage.
    pub fn column_oid(&self) -> u64 {
        self.column_oid
    }
}

/// Staged edits over a base snapshot.
///
/// Copy-on-write: unedited relations are shared with the base by
/// reference, edited relations are replaced wholesale. `build` consumes
/// the builder, so it can never be finalized twice; on any failure the
/// builder is simply dropped and nothing is applied.
#[derive(Debug)]
pub struct MetadataBuilder {
    relations: BTreeMap<RelationName, Arc<RelationDoc>>,
    column_oid: u64,
}

impl MetadataBuilder {
    pub fn from_snapshot(snapshot: &MetadataSnapshot) -> Self {
        Self {
            relations: snapshot.relations.clone(),
            column_oid: snapshot.column_oid,
        }
    }

    /// Mints the next cluster-wide column oid. Monotonic; the counter
    /// only ever advances, even when the surrounding mutation aborts.
    pub fn next_column_oid(&mut self) -> u64 {
        self.column_oid += 1;
        self.column_oid
    }

    /// Stages a wholesale replacement of one relation's document.
    pub fn replace(&mut self, name: RelationName, doc: RelationDoc) {
        self.relations.insert(name, Arc::new(doc));
    }

    pub fn build(self) -> MetadataSnapshot {
        MetadataSnapshot {
            relations: self.relations,
            column_oid: self.column_oid,
        }
    }
}

/// Creates a new relation in `metadata`, minting column oids when the
/// creating server version is identity-aware. Used by bootstrap paths;
/// ALTER-time changes go through the mutation executor instead.
pub fn create_relation(
    metadata: &MetadataSnapshot,
    relation: RelationName,
    columns: Vec<ColumnRef>,
    primary_key: Vec<usize>,
    checks: Vec<CheckConstraint>,
    created_version: ServerVersion,
) -> MetaResult<MetadataSnapshot> {
    if metadata.contains(&relation) {
        return Err(MetaError::SchemaConflict {
            relation,
            reason: "relation already exists".to_string(),
        });
    }

    let mut builder = MetadataBuilder::from_snapshot(metadata);
    let era = IdentityEra::for_created_version(created_version);
    let columns = assign_identities(era, columns, &mut builder);
    let table = TableSchema::new(relation.clone(), columns, primary_key, checks, created_version);
    table.validate().map_err(|err| MetaError::SchemaConflict {
        relation: relation.clone(),
        reason: err.reason,
    })?;
    let doc = RelationDoc::encode(&table).map_err(|source| MetaError::ValidationFailed {
        relation: relation.clone(),
        source: Box::new(source),
    })?;
    builder.replace(relation, doc);
    Ok(builder.build())
}
