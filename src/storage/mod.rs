//! Storage module
//!
//! This module contains the row storage of a table:
//! - Cell values and key projection
//! - Row records and their versions
//! - Ordered key indexes
//! - Row-change notifications
//! - The table itself and its row operations

pub mod events;
pub mod index;
pub mod row;
pub mod table;
mod table_rows;
pub mod tuple;

pub use events::{ColumnChangeEvent, RowAction, RowChangeEvent, RowChangeListener};
pub use index::IndexKey;
pub use row::{RowId, RowState, RowVersion};
pub use table::{DataTable, TableId};
pub(crate) use table_rows::{EditMode, RowSnapshot};
pub use tuple::{any_null, project, Value};
