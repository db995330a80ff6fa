//! Version-gated assignment of cluster-wide column identities.

use strata_schema::{ColumnIdentity, ColumnRef, IdentityEra};

use crate::catalog::MetadataBuilder;

/// Assigns identities to columns about to join a relation of the given
/// era.
///
/// Oid-era relations draw strictly increasing oids from the builder's
/// cluster-wide counter. Legacy relations keep every column
/// `Unassigned`, matching their existing columns; the era is fixed at
/// creation time and never changes on later mutation, even after the
/// cluster upgrades.
///
/// Callers must decide *before* calling this that the columns will
/// actually be appended: the counter only ever advances, so an oid
/// minted here is spent even if the surrounding mutation later aborts.
pub fn assign_identities(
    era: IdentityEra,
    columns: Vec<ColumnRef>,
    builder: &mut MetadataBuilder,
) -> Vec<ColumnRef> {
    columns
        .into_iter()
        .map(|column| {
            let identity = match era {
                IdentityEra::OidAssigned => ColumnIdentity::Oid(builder.next_column_oid()),
                IdentityEra::Legacy => ColumnIdentity::Unassigned,
            };
            column.with_identity(identity)
        })
        .collect()
}
