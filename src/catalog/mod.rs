//! Catalog module
//!
//! This module contains the schema side of a table: data types, columns,
//! constraints and the named collections that hold them.

pub mod collection;
pub mod constraint;
pub mod schema;
pub mod types;

pub use collection::{fold, Named, NamedCollection};
pub use constraint::{
    AcceptRejectRule, Constraint, ConstraintCollection, ForeignKeyConstraint, Rule,
    UniqueConstraint,
};
pub use schema::{ColumnCollection, ColumnId, ColumnKey, DataColumn};
pub use types::DataType;
