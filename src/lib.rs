//! arcset - An in-memory relational data engine written in Rust
//!
//! This library provides typed tables with change tracking and the rules that
//! keep related tables consistent:
//! - Columns, data types and named collections (catalog)
//! - Rows with original, current and proposed versions (storage)
//! - Unique and foreign-key constraints
//! - Data sets holding tables and the relations between them
//!
//! ```
//! use arcset::{DataColumn, DataSet, DataTable, DataType, Value};
//!
//! let mut ds = DataSet::new("shop");
//! let mut customers = DataTable::new("customers");
//! customers.add_column(DataColumn::new("id", DataType::Int32)).unwrap();
//! customers.set_primary_key(&["id"]).unwrap();
//! let mut orders = DataTable::new("orders");
//! orders.add_column(DataColumn::new("customer", DataType::Int32)).unwrap();
//! ds.add_table(customers).unwrap();
//! ds.add_table(orders).unwrap();
//! ds.relate("customer_orders", "customers", &["id"], "orders", &["customer"]).unwrap();
//!
//! let ann = ds.add_values("customers", vec![Value::Int32(1)]).unwrap();
//! ds.add_values("orders", vec![Value::Int32(1)]).unwrap();
//! assert_eq!(ds.child_rows("customer_orders", ann).unwrap().len(), 1);
//! ```

pub mod catalog;
pub mod config;
pub mod dataset;
pub mod error;
pub mod expression;
pub mod storage;

pub use catalog::{
    AcceptRejectRule, ColumnId, ColumnKey, Constraint, DataColumn, DataType,
    ForeignKeyConstraint, Rule, UniqueConstraint,
};
pub use config::DataSetConfig;
pub use dataset::{DataRelation, DataSet, SchemaSnapshot, TableKey};
pub use error::{Error, ErrorKind, Result};
pub use expression::{ExpressionEvaluator, RowView};
pub use storage::{
    ColumnChangeEvent, DataTable, RowAction, RowChangeEvent, RowChangeListener, RowId, RowState,
    RowVersion, TableId, Value,
};
