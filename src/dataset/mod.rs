//! Data sets
//!
//! A [`DataSet`] owns a collection of tables and the relations between them.
//! It is the only place where cross-table rules run: foreign-key checks,
//! cascades, and the data-set-wide `EnforceConstraints` and `CaseSensitive`
//! toggles.

mod cascade;
mod dataset;
mod relation;
mod rows;
mod snapshot;

pub use dataset::{DataSet, DataSetId, TableKey};
pub use relation::{DataRelation, RelationCollection};
pub use snapshot::{
    ColumnSnapshot, ConstraintSnapshot, RelationSnapshot, SchemaSnapshot, TableSnapshot,
};
