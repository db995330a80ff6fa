//! The add-column mutation executor: one request applied to one
//! cluster state, committed whole or not at all.

use std::collections::BTreeSet;
use std::sync::Arc;

use strata_schema::{CheckConstraint, ColumnIdentity, ColumnRef, RelationName, TableSchema};

use crate::catalog::{MetadataBuilder, RelationDoc};
use crate::error::{MetaError, MetaResult, ResolveError};
use crate::identity::assign_identities;
use crate::resolver::RelationResolver;
use crate::state::ClusterStateSnapshot;
use crate::storage::StorageReconciler;

/// One "add columns" schema mutation. Column identities must be
/// `Unassigned` at request time; the executor mints them.
#[derive(Debug, Clone, PartialEq)]
pub struct AddColumnRequest {
    pub relation: RelationName,
    /// Columns to append, in order.
    pub columns: Vec<ColumnRef>,
    /// Primary-key extensions, indexing into the combined
    /// existing-then-new column list.
    pub primary_key: Vec<usize>,
    pub checks: Vec<CheckConstraint>,
}

/// Structural delta of a request against the current schema, computed
/// before any oid is minted.
struct StagedChange {
    appended: Vec<ColumnRef>,
    primary_key: Vec<usize>,
    checks: Vec<CheckConstraint>,
}

impl StagedChange {
    fn is_noop(&self, current: &TableSchema) -> bool {
        self.appended.is_empty()
            && self.primary_key == current.primary_key
            && self.checks == current.checks
    }
}

/// Applies add-column requests to the cluster state.
///
/// A pure function of `(state, request)`: no internal locking, retries,
/// or timeouts. The surrounding sequencer applies one mutation at a
/// time, in submission order, and owns redelivery; the no-op short
/// circuit makes redelivered requests safe.
pub struct AddColumnTask {
    resolver: Arc<dyn RelationResolver>,
    reconciler: Arc<dyn StorageReconciler>,
}

impl AddColumnTask {
    pub fn new(resolver: Arc<dyn RelationResolver>, reconciler: Arc<dyn StorageReconciler>) -> Self {
        Self {
            resolver,
            reconciler,
        }
    }

    /// Executes one request. Returns the input state untouched when the
    /// request was already applied, otherwise a new committed state.
    /// Any failure discards all staged edits; `current` stays
    /// authoritative with no partial effect.
    pub fn execute(
        &self,
        current: &ClusterStateSnapshot,
        request: &AddColumnRequest,
    ) -> MetaResult<ClusterStateSnapshot> {
        let relation = &request.relation;
        let current_table = match self.resolver.resolve(relation, &current.metadata) {
            Ok(table) => table,
            Err(ResolveError::NotFound) => {
                return Err(MetaError::TableNotFound {
                    relation: relation.clone(),
                })
            }
            Err(err) => {
                return Err(MetaError::Corrupt {
                    relation: relation.clone(),
                    source: Box::new(err),
                })
            }
        };

        // Work out the structural delta first so a redelivered request
        // that was already applied never reaches the oid counter.
        let staged = stage_change(&current_table, request)?;
        if staged.is_noop(&current_table) {
            tracing::debug!(relation = %relation, "add-column request already applied");
            return Ok(current.clone());
        }

        let mut builder = MetadataBuilder::from_snapshot(&current.metadata);
        let added = staged.appended.len();
        let minted = assign_identities(current_table.era, staged.appended, &mut builder);

        let mut columns = current_table.columns.clone();
        columns.extend(minted);
        let new_table = TableSchema {
            relation: current_table.relation.clone(),
            columns,
            primary_key: staged.primary_key,
            checks: staged.checks,
            created_version: current_table.created_version,
            era: current_table.era,
        };
        new_table
            .validate()
            .map_err(|err| MetaError::SchemaConflict {
                relation: relation.clone(),
                reason: err.reason,
            })?;

        let doc = RelationDoc::encode(&new_table).map_err(|source| MetaError::ValidationFailed {
            relation: relation.clone(),
            source: Box::new(source),
        })?;
        builder.replace(relation.clone(), doc);

        // Storage must accept the shape before the catalog is
        // finalized; on failure the builder is dropped unapplied.
        self.reconciler
            .reconcile(relation, &new_table)
            .map_err(|source| MetaError::StorageReconciliationFailed {
                relation: relation.clone(),
                source: source.into(),
            })?;

        let new_metadata = builder.build();

        // Validation gate: the rebuilt catalog entry must round-trip
        // through the same read path every node will use.
        if let Err(err) = self.resolver.resolve(relation, &new_metadata) {
            tracing::error!(
                relation = %relation,
                error = %err,
                "rebuilt relation failed re-resolution; candidate metadata discarded"
            );
            return Err(MetaError::ValidationFailed {
                relation: relation.clone(),
                source: Box::new(err),
            });
        }

        let next = current.with_metadata(new_metadata);
        tracing::info!(
            relation = %relation,
            added_columns = added,
            epoch = next.epoch,
            column_oid = next.metadata.column_oid(),
            "committed add-column mutation"
        );
        Ok(next)
    }
}

fn stage_change(current: &TableSchema, request: &AddColumnRequest) -> MetaResult<StagedChange> {
    let conflict = |reason: String| MetaError::SchemaConflict {
        relation: request.relation.clone(),
        reason,
    };

    let mut requested = BTreeSet::new();
    for column in &request.columns {
        if column.identity != ColumnIdentity::Unassigned {
            return Err(conflict(format!(
                "column {:?} arrived with a pre-assigned identity",
                column.name
            )));
        }
        if !requested.insert(column.name.as_str()) {
            return Err(conflict(format!(
                "column {:?} appears twice in the request",
                column.name
            )));
        }
    }

    // A column that already exists with an identical shape is a retry
    // artifact and is skipped; a different shape is a conflict.
    let mut appended = Vec::new();
    for column in &request.columns {
        match current.column(&column.name) {
            Some(existing) if existing.same_shape(column) => {}
            Some(_) => {
                return Err(conflict(format!(
                    "column {:?} already exists with a different definition",
                    column.name
                )))
            }
            None => appended.push(column.clone()),
        }
    }

    // Primary-key indices address the combined existing-then-requested
    // column list. Resolve each to a name, then to its position in the
    // resulting table, so retried requests land on the same columns.
    let combined_len = current.columns.len() + request.columns.len();
    let mut primary_key = current.primary_key.clone();
    for &idx in &request.primary_key {
        if idx >= combined_len {
            return Err(conflict(format!(
                "primary key index {idx} out of bounds for {combined_len} columns"
            )));
        }
        let name = if idx < current.columns.len() {
            current.columns[idx].name.as_str()
        } else {
            request.columns[idx - current.columns.len()].name.as_str()
        };
        let final_idx = current.column_index(name).or_else(|| {
            appended
                .iter()
                .position(|c| c.name == name)
                .map(|pos| current.columns.len() + pos)
        });
        let Some(final_idx) = final_idx else {
            return Err(conflict(format!(
                "primary key index {idx} does not resolve to a column"
            )));
        };
        if !primary_key.contains(&final_idx) {
            primary_key.push(final_idx);
        }
    }

    let mut checks = current.checks.clone();
    for check in &request.checks {
        for referenced in &check.referenced_columns {
            let known = current.column(referenced).is_some()
                || request.columns.iter().any(|c| c.name == *referenced);
            if !known {
                return Err(conflict(format!(
                    "check constraint {:?} references unknown column {referenced:?}",
                    check.name
                )));
            }
        }
        match current.checks.iter().find(|c| c.name == check.name) {
            Some(existing) if existing == check => {}
            Some(_) => {
                return Err(conflict(format!(
                    "check constraint {:?} already exists with a different expression",
                    check.name
                )))
            }
            None => checks.push(check.clone()),
        }
    }

    Ok(StagedChange {
        appended,
        primary_key,
        checks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{create_relation, MetadataSnapshot};
    use crate::resolver::DocRelationResolver;
    use crate::storage::NoopReconciler;
    use strata_schema::{DataType, ServerVersion};

    fn relation() -> RelationName {
        RelationName::new("doc", "t")
    }

    fn task() -> AddColumnTask {
        AddColumnTask::new(Arc::new(DocRelationResolver), Arc::new(NoopReconciler))
    }

    fn oid_state() -> ClusterStateSnapshot {
        let metadata = create_relation(
            &MetadataSnapshot::default(),
            relation(),
            vec![ColumnRef::unassigned("a", DataType::Int, false)],
            vec![0],
            Vec::new(),
            ServerVersion::COLUMN_OID_VERSION,
        )
        .unwrap();
        ClusterStateSnapshot::new(1, metadata)
    }

    fn request(columns: Vec<ColumnRef>) -> AddColumnRequest {
        AddColumnRequest {
            relation: relation(),
            columns,
            primary_key: Vec::new(),
            checks: Vec::new(),
        }
    }

    #[test]
    fn unknown_relation_fails_with_table_not_found() {
        let state = ClusterStateSnapshot::bootstrap();
        let err = task()
            .execute(
                &state,
                &request(vec![ColumnRef::unassigned("b", DataType::Text, true)]),
            )
            .unwrap_err();
        assert!(matches!(err, MetaError::TableNotFound { .. }));
    }

    #[test]
    fn duplicate_column_in_request_is_a_conflict() {
        let state = oid_state();
        let err = task()
            .execute(
                &state,
                &request(vec![
                    ColumnRef::unassigned("b", DataType::Text, true),
                    ColumnRef::unassigned("b", DataType::Text, true),
                ]),
            )
            .unwrap_err();
        assert!(matches!(err, MetaError::SchemaConflict { .. }));
    }

    #[test]
    fn pre_assigned_identity_is_a_conflict() {
        let state = oid_state();
        let column = ColumnRef::unassigned("b", DataType::Text, true)
            .with_identity(ColumnIdentity::Oid(42));
        let err = task().execute(&state, &request(vec![column])).unwrap_err();
        assert!(matches!(err, MetaError::SchemaConflict { .. }));
    }

    #[test]
    fn collision_with_a_different_shape_is_a_conflict() {
        let state = oid_state();
        // "a" exists as non-nullable Int.
        let err = task()
            .execute(
                &state,
                &request(vec![ColumnRef::unassigned("a", DataType::Text, true)]),
            )
            .unwrap_err();
        assert!(matches!(err, MetaError::SchemaConflict { .. }));
        // Counter untouched by the failed attempt.
        assert_eq!(state.metadata.column_oid(), 1);
    }

    #[test]
    fn out_of_bounds_primary_key_index_is_a_conflict() {
        let state = oid_state();
        let req = AddColumnRequest {
            relation: relation(),
            columns: vec![ColumnRef::unassigned("b", DataType::Int, false)],
            primary_key: vec![9],
            checks: Vec::new(),
        };
        let err = task().execute(&state, &req).unwrap_err();
        assert!(matches!(err, MetaError::SchemaConflict { .. }));
    }

    #[test]
    fn dangling_check_reference_is_a_conflict_before_any_oid_is_minted() {
        let state = oid_state();
        let req = AddColumnRequest {
            relation: relation(),
            columns: vec![ColumnRef::unassigned("b", DataType::Int, true)],
            primary_key: Vec::new(),
            checks: vec![CheckConstraint {
                name: "chk".to_string(),
                expression: "zzz > 0".to_string(),
                referenced_columns: vec!["zzz".to_string()],
            }],
        };
        let err = task().execute(&state, &req).unwrap_err();
        assert!(matches!(err, MetaError::SchemaConflict { .. }));
        assert_eq!(state.metadata.column_oid(), 1);
    }

    #[test]
    fn exact_duplicate_request_short_circuits_without_minting() {
        let state = oid_state();
        let req = request(vec![ColumnRef::unassigned("b", DataType::Text, true)]);
        let applied = task().execute(&state, &req).unwrap();
        assert_eq!(applied.metadata.column_oid(), 2);

        let retried = task().execute(&applied, &req).unwrap();
        assert!(Arc::ptr_eq(&retried.metadata, &applied.metadata));
        assert_eq!(retried.epoch, applied.epoch);
        assert_eq!(retried.metadata.column_oid(), 2);
    }

    #[test]
    fn partially_applied_retry_converges() {
        let state = oid_state();
        let applied = task()
            .execute(
                &state,
                &request(vec![ColumnRef::unassigned("b", DataType::Text, true)]),
            )
            .unwrap();

        // Redelivered request carries both the already-applied "b" and
        // a new "c"; only "c" gets a fresh oid.
        let retried = task()
            .execute(
                &applied,
                &request(vec![
                    ColumnRef::unassigned("b", DataType::Text, true),
                    ColumnRef::unassigned("c", DataType::Long, true),
                ]),
            )
            .unwrap();
        let table = DocRelationResolver
            .resolve(&relation(), &retried.metadata)
            .unwrap();
        assert_eq!(table.column("b").unwrap().identity, ColumnIdentity::Oid(2));
        assert_eq!(table.column("c").unwrap().identity, ColumnIdentity::Oid(3));
        assert_eq!(retried.metadata.column_oid(), 3);
    }

    #[test]
    fn primary_key_extension_maps_combined_indices_onto_the_new_table() {
        let state = oid_state();
        let req = AddColumnRequest {
            relation: relation(),
            columns: vec![ColumnRef::unassigned("b", DataType::Long, false)],
            // Combined list is [a, b]; index 1 is the new column.
            primary_key: vec![1],
            checks: Vec::new(),
        };
        let next = task().execute(&state, &req).unwrap();
        let table = DocRelationResolver
            .resolve(&relation(), &next.metadata)
            .unwrap();
        assert_eq!(table.primary_key, vec![0, 1]);

        // Retrying the same request is a no-op even though it names a
        // primary-key index.
        let retried = task().execute(&next, &req).unwrap();
        assert!(Arc::ptr_eq(&retried.metadata, &next.metadata));
    }

    #[test]
    fn check_constraints_are_appended_and_idempotent() {
        let state = oid_state();
        let check = CheckConstraint {
            name: "b_positive".to_string(),
            expression: "b > 0".to_string(),
            referenced_columns: vec!["b".to_string()],
        };
        let req = AddColumnRequest {
            relation: relation(),
            columns: vec![ColumnRef::unassigned("b", DataType::Int, true)],
            primary_key: Vec::new(),
            checks: vec![check.clone()],
        };
        let next = task().execute(&state, &req).unwrap();
        let table = DocRelationResolver
            .resolve(&relation(), &next.metadata)
            .unwrap();
        assert_eq!(table.checks, vec![check]);

        let retried = task().execute(&next, &req).unwrap();
        assert!(Arc::ptr_eq(&retried.metadata, &next.metadata));

        // Same name, different expression: conflict.
        let mut clashing = req.clone();
        clashing.checks[0].expression = "b > 1".to_string();
        let err = task().execute(&next, &clashing).unwrap_err();
        assert!(matches!(err, MetaError::SchemaConflict { .. }));
    }
}
