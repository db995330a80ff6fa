//! Relation names, column references, and the table schema value type.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::version::{IdentityEra, ServerVersion};

/// Catalog-unique relation identifier (`schema.name`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationName {
    schema: String,
    name: String,
}

impl RelationName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RelationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Relation name that could not be parsed from its `schema.name` form.
#[derive(Debug, Error)]
#[error("invalid relation name: {0:?}")]
pub struct InvalidRelationName(pub String);

impl FromStr for RelationName {
    type Err = InvalidRelationName;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.split_once('.') {
            Some((schema, name)) if !schema.is_empty() && !name.is_empty() => {
                Ok(RelationName::new(schema, name))
            }
            _ => Err(InvalidRelationName(raw.to_string())),
        }
    }
}

// Relation names serialize as their `schema.name` form so they can key
// JSON maps in persisted metadata.
impl Serialize for RelationName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RelationName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// Column data types understood by the schema core. Deliberately not a
/// full SQL type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int,
    Long,
    Float,
    Double,
    Text,
    Timestamp,
    Ip,
    Object,
}

/// Column identity: a cluster-wide oid minted by the metadata builder,
/// or `Unassigned` for relations created before the oid era.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnIdentity {
    Unassigned,
    Oid(u64),
}

/// One column definition, owned by exactly one `TableSchema`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub identity: ColumnIdentity,
}

impl ColumnRef {
    /// Column as it appears in a request, before identity assignment.
    pub fn unassigned(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
            identity: ColumnIdentity::Unassigned,
        }
    }

    pub fn with_identity(mut self, identity: ColumnIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Structural comparison ignoring identity. Used to recognize a
    /// retried request whose columns were already materialized.
    pub fn same_shape(&self, other: &ColumnRef) -> bool {
        self.name == other.name
            && self.data_type == other.data_type
            && self.nullable == other.nullable
    }
}

/// Analyzed check constraint. `referenced_columns` carries the column
/// names the expression mentions so structural validation does not need
/// an expression parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraint {
    pub name: String,
    pub expression: String,
    pub referenced_columns: Vec<String>,
}

/// Structural invariant violated by a table schema.
#[derive(Debug, Error)]
#[error("invalid schema for {relation}: {reason}")]
pub struct SchemaViolation {
    pub relation: String,
    pub reason: String,
}

/// Authoritative description of one relation.
///
/// Equality is structural: two schemas with identical columns, keys,
/// constraints, and creation version are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub relation: RelationName,
    /// Ordered column definitions.
    pub columns: Vec<ColumnRef>,
    /// Indices into `columns` forming the primary key.
    pub primary_key: Vec<usize>,
    pub checks: Vec<CheckConstraint>,
    /// Server version active when the relation was created. Never
    /// changes after creation.
    pub created_version: ServerVersion,
    /// Identity era, resolved once at creation from `created_version`.
    pub era: IdentityEra,
}

impl TableSchema {
    pub fn new(
        relation: RelationName,
        columns: Vec<ColumnRef>,
        primary_key: Vec<usize>,
        checks: Vec<CheckConstraint>,
        created_version: ServerVersion,
    ) -> Self {
        let era = IdentityEra::for_created_version(created_version);
        Self {
            relation,
            columns,
            primary_key,
            checks,
            created_version,
            era,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnRef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Highest column oid held by this schema, if any.
    pub fn max_oid(&self) -> Option<u64> {
        self.columns
            .iter()
            .filter_map(|c| match c.identity {
                ColumnIdentity::Oid(oid) => Some(oid),
                ColumnIdentity::Unassigned => None,
            })
            .max()
    }

    /// Checks every structural invariant of the schema.
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        let fail = |reason: String| SchemaViolation {
            relation: self.relation.to_string(),
            reason,
        };

        if self.columns.is_empty() {
            return Err(fail("relation has no columns".to_string()));
        }

        let mut names = BTreeSet::new();
        for column in &self.columns {
            if column.name.trim().is_empty() {
                return Err(fail("column with empty name".to_string()));
            }
            if !names.insert(column.name.as_str()) {
                return Err(fail(format!("duplicate column name {:?}", column.name)));
            }
        }

        let mut key_seen = BTreeSet::new();
        for &idx in &self.primary_key {
            if idx >= self.columns.len() {
                return Err(fail(format!(
                    "primary key index {idx} out of bounds for {} columns",
                    self.columns.len()
                )));
            }
            if !key_seen.insert(idx) {
                return Err(fail(format!("duplicate primary key index {idx}")));
            }
            if self.columns[idx].nullable {
                return Err(fail(format!(
                    "primary key column {:?} must not be nullable",
                    self.columns[idx].name
                )));
            }
        }

        let mut check_names = BTreeSet::new();
        for check in &self.checks {
            if check.name.trim().is_empty() {
                return Err(fail("check constraint with empty name".to_string()));
            }
            if !check_names.insert(check.name.as_str()) {
                return Err(fail(format!("duplicate check constraint {:?}", check.name)));
            }
            for referenced in &check.referenced_columns {
                if !names.contains(referenced.as_str()) {
                    return Err(fail(format!(
                        "check constraint {:?} references unknown column {referenced:?}",
                        check.name
                    )));
                }
            }
        }

        // Mixed-identity relations are not a valid state in either era.
        match self.era {
            IdentityEra::Legacy => {
                for column in &self.columns {
                    if column.identity != ColumnIdentity::Unassigned {
                        return Err(fail(format!(
                            "legacy relation cannot hold an oid on column {:?}",
                            column.name
                        )));
                    }
                }
            }
            IdentityEra::OidAssigned => {
                let mut oids = BTreeSet::new();
                for column in &self.columns {
                    match column.identity {
                        ColumnIdentity::Oid(oid) => {
                            if !oids.insert(oid) {
                                return Err(fail(format!(
                                    "column oid {oid} assigned more than once"
                                )));
                            }
                        }
                        ColumnIdentity::Unassigned => {
                            return Err(fail(format!(
                                "column {:?} is missing an oid",
                                column.name
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
