//! Row change notifications
//!
//! Listeners registered on a table observe row additions, edits, deletions,
//! accepts and rejects. The `*_changing` and `*_deleting` hooks run before the
//! change is applied and may veto it by returning an error; the row stays as it
//! was. While a changing hook runs, the row refuses edits through the edit
//! API with [`Error::InRowChangingEvent`](crate::Error::InRowChangingEvent).

use super::row::RowId;
use super::table::DataTable;
use super::tuple::Value;
use crate::catalog::ColumnId;
use crate::error::Result;

/// What happened to a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowAction {
    Add,
    Change,
    Delete,
    Commit,
    Rollback,
}

/// Notification about one row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowChangeEvent {
    pub row: RowId,
    pub action: RowAction,
}

/// Notification about one column value
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChangeEvent {
    pub row: RowId,
    pub column: ColumnId,
    pub value: Value,
}

/// Observer of a table's row changes
///
/// All methods default to doing nothing.
pub trait RowChangeListener {
    /// Before an add, edit commit, accept or reject; an error vetoes the change
    fn row_changing(&mut self, _table: &mut DataTable, _event: &RowChangeEvent) -> Result<()> {
        Ok(())
    }

    /// After a change was applied
    fn row_changed(&mut self, _table: &DataTable, _event: &RowChangeEvent) {}

    /// Before a delete; an error vetoes it
    fn row_deleting(&mut self, _table: &mut DataTable, _event: &RowChangeEvent) -> Result<()> {
        Ok(())
    }

    /// After a delete
    fn row_deleted(&mut self, _table: &DataTable, _event: &RowChangeEvent) {}

    /// After a single value was written
    fn column_changed(&mut self, _table: &DataTable, _event: &ColumnChangeEvent) {}

    /// After every row was cleared out of the table
    fn table_cleared(&mut self, _table: &DataTable) {}
}
