//! Row operations of a table
//!
//! Every mutation is split into a `stage_*` step that fires the changing
//! notification and runs the table-local checks without touching committed
//! data, and a `commit_*` step that cannot fail. The table's public methods
//! chain the two; the data set slots its foreign-key checks and cascades in
//! between.

use tracing::trace;

use super::events::RowAction;
use super::row::{RowId, RowRecord, RowState, RowVersion};
use super::table::DataTable;
use super::tuple::{project, Value};
use crate::catalog::{ColumnId, ColumnKey};
use crate::error::{Error, Result};
use crate::expression::RowView;

/// How a staged write reached the row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EditMode {
    /// The row is detached; the write went straight to its proposed values
    Detached,
    /// An edit was already open
    Explicit,
    /// The write opened an edit that must be ended (or cancelled) now
    Implicit,
}

/// A detached row that passed the checks for being added
#[derive(Debug)]
pub(crate) struct StagedAdd {
    pub(crate) row: RowId,
    pub(crate) values: Vec<Value>,
}

/// An open edit that passed the checks for being committed
#[derive(Debug)]
pub(crate) struct StagedEdit {
    pub(crate) row: RowId,
    pub(crate) old: Vec<Value>,
    pub(crate) new: Vec<Value>,
    /// False when nothing was written; committing only closes the edit
    pub(crate) touched: bool,
}

/// The row storage of a table, captured so a multi-row operation can be undone
#[derive(Debug, Clone)]
pub(crate) struct RowSnapshot {
    records: Vec<RowRecord>,
    rows: Vec<RowId>,
}

/// A row cleared for deletion
#[derive(Debug)]
pub(crate) struct StagedDelete {
    pub(crate) row: RowId,
    pub(crate) values: Vec<Value>,
}

impl DataTable {
    pub(crate) fn record(&self, row: RowId) -> Result<&RowRecord> {
        self.records.get(row.0).ok_or_else(|| {
            Error::argument(format!(
                "row {} does not belong to table '{}'",
                row.0,
                self.table_name()
            ))
        })
    }

    fn record_mut(&mut self, row: RowId) -> Result<&mut RowRecord> {
        let name = self.table_name().to_string();
        self.records.get_mut(row.0).ok_or_else(|| {
            Error::argument(format!("row {} does not belong to table '{}'", row.0, name))
        })
    }

    // ===== Row collection =====

    /// Number of rows in the table, deleted rows included
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows in table order, deleted rows included
    pub fn rows(&self) -> impl Iterator<Item = RowId> + '_ {
        self.rows.iter().copied()
    }

    /// Row at a position of the row collection
    pub fn row_at(&self, index: isize) -> Result<RowId> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.rows.get(i).copied())
            .ok_or(Error::IndexOutOfRange(index))
    }

    pub fn row_state(&self, row: RowId) -> Result<RowState> {
        Ok(self.record(row)?.state)
    }

    pub fn has_version(&self, row: RowId, version: RowVersion) -> Result<bool> {
        Ok(self.record(row)?.has_version(version))
    }

    // ===== Values =====

    /// Value of a column in the default version of a row
    pub fn get(&self, row: RowId, column: impl ColumnKey) -> Result<Value> {
        self.get_version(row, column, RowVersion::Default)
    }

    /// Value of a column in a specific version of a row
    ///
    /// Computed columns are evaluated against the same version.
    pub fn get_version(
        &self,
        row: RowId,
        column: impl ColumnKey,
        version: RowVersion,
    ) -> Result<Value> {
        let ordinal = column.resolve(&self.columns, self.table_name())?;
        let values = self.record(row)?.values(version)?;
        self.read_value(row, values, ordinal)
    }

    fn read_value(&self, row: RowId, values: &[Value], ordinal: usize) -> Result<Value> {
        let column = self.columns.at(ordinal as isize)?;
        match (column.expression_text(), self.evaluator()) {
            (Some(expression), Some(evaluator)) => {
                evaluator.evaluate(expression, &RowView::new(self, row, values))
            }
            (Some(_), None) => Ok(Value::Null),
            (None, _) => Ok(values.get(ordinal).cloned().unwrap_or_default()),
        }
    }

    /// All values of the default version of a row
    pub fn item_array(&self, row: RowId) -> Result<Vec<Value>> {
        self.item_array_version(row, RowVersion::Default)
    }

    pub fn item_array_version(&self, row: RowId, version: RowVersion) -> Result<Vec<Value>> {
        let values = self.record(row)?.values(version)?;
        (0..self.columns.len())
            .map(|ordinal| self.read_value(row, values, ordinal))
            .collect()
    }

    /// Raw stored values of a version, computed columns unevaluated
    pub(crate) fn raw_values(&self, row: RowId, version: RowVersion) -> Result<&[Value]> {
        self.record(row)?.values(version)
    }

    /// Write one value
    ///
    /// Outside an explicit edit the write is committed at once, and rolled
    /// back when the commit fails.
    pub fn set(
        &mut self,
        row: RowId,
        column: impl ColumnKey,
        value: impl Into<Value>,
    ) -> Result<()> {
        let ordinal = column.resolve(&self.columns, self.table_name())?;
        let record = self.record(row)?;
        if record.state != RowState::Detached && !record.editing {
            self.ensure_local_mutation()?;
        }
        let mode = self.stage_value(row, ordinal, value.into(), false)?;
        if mode == EditMode::Implicit {
            if let Err(e) = self.end_edit_local(row) {
                self.records[row.0].cancel_edit();
                return Err(e);
            }
        }
        self.notify_column(row, ordinal);
        Ok(())
    }

    /// Replace all values of a row
    ///
    /// A shorter array leaves trailing columns null (then default or sequence
    /// values); a longer one is an argument error.
    pub fn set_item_array(&mut self, row: RowId, values: Vec<Value>) -> Result<()> {
        let record = self.record(row)?;
        if record.state != RowState::Detached && !record.editing {
            self.ensure_local_mutation()?;
        }
        let mode = self.stage_item_array(row, &values, false)?;
        if mode == EditMode::Implicit {
            if let Err(e) = self.end_edit_local(row) {
                self.records[row.0].cancel_edit();
                return Err(e);
            }
        }
        Ok(())
    }

    pub(crate) fn notify_column(&mut self, row: RowId, ordinal: usize) {
        let value = self.records[row.0]
            .working_values()
            .and_then(|v| v.get(ordinal).cloned())
            .unwrap_or_default();
        if let Ok(column) = self.columns.at(ordinal as isize) {
            let id = column.id();
            self.fire_column_changed(row, id, value);
        }
    }

    /// Normalize a value bound for `ordinal`: nulls become sequence or default
    /// values, others are coerced to the column type
    fn prepare_value(
        &mut self,
        ordinal: usize,
        value: Value,
        existing: &Value,
        detached: bool,
        bypass_read_only: bool,
    ) -> Result<Value> {
        let column = self
            .columns
            .at_mut(ordinal)
            .ok_or(Error::IndexOutOfRange(ordinal as isize))?;
        let guarded = column.read_only && !detached && !bypass_read_only;
        let value = if value.is_null() {
            if column.auto_increment && !existing.is_null() {
                existing.clone()
            } else if column.auto_increment {
                if guarded {
                    return Err(Error::ReadOnly(column.name.clone()));
                }
                column.next_auto_value()?
            } else {
                column.default_value.clone()
            }
        } else {
            column.convert(value)?
        };
        if guarded && value != *existing {
            return Err(Error::ReadOnly(column.name.clone()));
        }
        Ok(value)
    }

    fn edit_mode(record: &RowRecord) -> EditMode {
        if record.state == RowState::Detached {
            EditMode::Detached
        } else if record.editing {
            EditMode::Explicit
        } else {
            EditMode::Implicit
        }
    }

    /// Write one normalized value into the proposed version, opening an
    /// implicit edit when none is open
    pub(crate) fn stage_value(
        &mut self,
        row: RowId,
        ordinal: usize,
        value: Value,
        bypass_read_only: bool,
    ) -> Result<EditMode> {
        let record = self.record(row)?;
        record.ensure_editable()?;
        let mode = Self::edit_mode(record);
        let existing = record
            .working_values()
            .and_then(|v| v.get(ordinal).cloned())
            .unwrap_or_default();

        let column = self.columns.at(ordinal as isize)?;
        if column.expression_text().is_some() {
            return Err(Error::ReadOnly(column.name().to_string()));
        }
        let value = self.prepare_value(
            ordinal,
            value,
            &existing,
            mode == EditMode::Detached,
            bypass_read_only,
        )?;

        let record = &mut self.records[row.0];
        if mode == EditMode::Implicit {
            record.begin_edit()?;
        }
        if let Some(slot) = record.proposed_mut().and_then(|v| v.get_mut(ordinal)) {
            *slot = value;
        }
        if mode != EditMode::Detached {
            record.touched = true;
        }
        Ok(mode)
    }

    /// Write a whole value array into the proposed version
    pub(crate) fn stage_item_array(
        &mut self,
        row: RowId,
        values: &[Value],
        bypass_read_only: bool,
    ) -> Result<EditMode> {
        let count = self.columns.len();
        if values.len() > count {
            return Err(Error::argument(
                "Input array is longer than the number of columns in this table.",
            ));
        }
        let record = self.record(row)?;
        record.ensure_editable()?;
        let mode = Self::edit_mode(record);
        let existing = record.working_values().cloned().unwrap_or_default();

        let mut prepared = Vec::with_capacity(count);
        for ordinal in 0..count {
            let current = existing.get(ordinal).cloned().unwrap_or_default();
            if self.columns.at(ordinal as isize)?.expression_text().is_some() {
                prepared.push(current);
                continue;
            }
            let supplied = values.get(ordinal).cloned().unwrap_or_default();
            prepared.push(self.prepare_value(
                ordinal,
                supplied,
                &current,
                mode == EditMode::Detached,
                bypass_read_only,
            )?);
        }

        let record = &mut self.records[row.0];
        if mode == EditMode::Implicit {
            record.begin_edit()?;
        }
        if let Some(proposed) = record.proposed_mut() {
            *proposed = prepared;
        }
        if mode != EditMode::Detached {
            record.touched = true;
        }
        Ok(mode)
    }

    // ===== Lifecycle =====

    /// Create a detached row holding default and sequence values
    ///
    /// Auto-increment columns consume their next value here, whether or not
    /// the row is ever added. Fails once a sequence runs out of values.
    pub fn new_row(&mut self) -> Result<RowId> {
        let mut values = Vec::with_capacity(self.columns.len());
        for column in self.columns.iter_mut() {
            let value = if column.expression.is_some() {
                Value::Null
            } else if column.auto_increment {
                column.next_auto_value()?
            } else {
                column.default_value.clone()
            };
            values.push(value);
        }
        let row = RowId(self.records.len());
        self.records.push(RowRecord::detached(values));
        trace!(table = %self.table_name(), row = row.0, "Created detached row");
        Ok(row)
    }

    /// Add a detached row created by [`new_row`](Self::new_row)
    pub fn add_row(&mut self, row: RowId) -> Result<()> {
        self.ensure_local_mutation()?;
        let staged = self.stage_add(row)?;
        self.commit_add(staged);
        Ok(())
    }

    /// Create and add a row from a value array
    pub fn add_values(&mut self, values: Vec<Value>) -> Result<RowId> {
        self.ensure_local_mutation()?;
        let row = self.new_detached_from(&values)?;
        self.add_row(row)?;
        Ok(row)
    }

    pub(crate) fn new_detached_from(&mut self, values: &[Value]) -> Result<RowId> {
        if values.len() > self.columns.len() {
            return Err(Error::argument(
                "Input array is longer than the number of columns in this table.",
            ));
        }
        let row = self.new_row()?;
        self.stage_item_array(row, values, false)?;
        Ok(row)
    }

    pub(crate) fn stage_add(&mut self, row: RowId) -> Result<StagedAdd> {
        let record = self.record(row)?;
        if record.in_changing {
            return Err(Error::InRowChangingEvent);
        }
        if record.state != RowState::Detached {
            return Err(Error::argument("This row already belongs to this table."));
        }
        let values = record.proposed().cloned().ok_or(Error::RowNotInTable)?;
        self.fire_changing(row, RowAction::Add)?;
        self.check_not_null(&values)?;
        self.check_unique(row, &values)?;
        Ok(StagedAdd { row, values })
    }

    pub(crate) fn commit_add(&mut self, staged: StagedAdd) {
        let StagedAdd { row, values } = staged;
        self.records[row.0].attach();
        self.rows.push(row);
        self.index_insert(row, &values);
        trace!(table = %self.table_name(), row = row.0, "Row added");
        self.fire_changed(row, RowAction::Add);
    }

    /// Open an edit on a row
    pub fn begin_edit(&mut self, row: RowId) -> Result<()> {
        self.record_mut(row)?.begin_edit()
    }

    /// Drop an edit that failed to commit
    pub(crate) fn abort_edit(&mut self, row: RowId) {
        if let Some(record) = self.records.get_mut(row.0) {
            record.cancel_edit();
        }
    }

    /// Discard the proposed values of an open edit
    pub fn cancel_edit(&mut self, row: RowId) -> Result<()> {
        let record = self.record_mut(row)?;
        if record.in_changing {
            return Err(Error::InRowChangingEvent);
        }
        record.cancel_edit();
        Ok(())
    }

    /// Commit an open edit
    ///
    /// On failure the row stays in edit mode with its proposed values.
    pub fn end_edit(&mut self, row: RowId) -> Result<()> {
        let record = self.record(row)?;
        if record.editing && record.touched {
            self.ensure_local_mutation()?;
        }
        self.end_edit_local(row)
    }

    fn end_edit_local(&mut self, row: RowId) -> Result<()> {
        let staged = self.stage_edit(row)?;
        self.commit_edit(staged);
        Ok(())
    }

    pub(crate) fn stage_edit(&mut self, row: RowId) -> Result<Option<StagedEdit>> {
        let record = self.record(row)?;
        if record.in_changing {
            return Err(Error::InRowChangingEvent);
        }
        if !record.editing {
            return Ok(None);
        }
        let old = record.current().cloned().unwrap_or_default();
        let new = record.proposed().cloned().unwrap_or_default();
        if !record.touched {
            return Ok(Some(StagedEdit { row, old, new, touched: false }));
        }
        self.fire_changing(row, RowAction::Change)?;
        self.check_not_null(&new)?;
        self.check_unique(row, &new)?;
        Ok(Some(StagedEdit { row, old, new, touched: true }))
    }

    pub(crate) fn commit_edit(&mut self, staged: Option<StagedEdit>) {
        let Some(StagedEdit { row, old, new, touched }) = staged else {
            return;
        };
        if !touched {
            self.records[row.0].cancel_edit();
            return;
        }
        self.index_remove(row, &old);
        self.records[row.0].commit_proposed();
        self.index_insert(row, &new);
        trace!(
            table = %self.table_name(),
            row = row.0,
            state = ?self.records[row.0].state,
            "Row edit committed"
        );
        self.fire_changed(row, RowAction::Change);
    }

    /// Delete a row
    ///
    /// An added row is removed at once; other rows become `Deleted` and keep
    /// their original values until accepted or rejected.
    pub fn delete_row(&mut self, row: RowId) -> Result<()> {
        self.ensure_local_mutation()?;
        let staged = self.stage_delete(row)?;
        self.commit_delete(staged);
        Ok(())
    }

    pub(crate) fn stage_delete(&mut self, row: RowId) -> Result<StagedDelete> {
        let record = self.record(row)?;
        if record.in_changing {
            return Err(Error::InRowChangingEvent);
        }
        match record.state {
            RowState::Deleted => return Err(Error::DeletedRowInaccessible),
            RowState::Detached => return Err(Error::RowNotInTable),
            _ => {}
        }
        let values = record.current().cloned().unwrap_or_default();
        self.fire_changing(row, RowAction::Delete)?;
        Ok(StagedDelete { row, values })
    }

    pub(crate) fn commit_delete(&mut self, staged: StagedDelete) {
        let StagedDelete { row, values } = staged;
        self.index_remove(row, &values);
        if self.records[row.0].state == RowState::Added {
            self.records[row.0].remove();
            self.rows.retain(|r| *r != row);
        } else {
            self.records[row.0].mark_deleted();
        }
        trace!(table = %self.table_name(), row = row.0, "Row deleted");
        self.fire_changed(row, RowAction::Delete);
    }

    /// Delete a row and drop it from the table for good
    pub fn remove_row(&mut self, row: RowId) -> Result<()> {
        self.ensure_local_mutation()?;
        let staged = self.stage_delete(row)?;
        self.commit_delete(staged);
        self.purge(row);
        Ok(())
    }

    /// Remove the row at a position of the row collection
    pub fn remove_at(&mut self, index: isize) -> Result<()> {
        let row = self.row_at(index)?;
        self.remove_row(row)
    }

    /// Physically drop a deleted row
    pub(crate) fn purge(&mut self, row: RowId) {
        if self.records[row.0].state == RowState::Deleted {
            self.records[row.0].remove();
            self.rows.retain(|r| *r != row);
        }
    }

    /// Apply a cascaded key change to a visible row
    pub(crate) fn apply_update(&mut self, row: RowId, new: Vec<Value>) {
        let Some(old) = self.records[row.0].current().cloned() else {
            return;
        };
        self.index_remove(row, &old);
        let record = &mut self.records[row.0];
        if let Some(proposed) = record.proposed_mut() {
            for (i, value) in new.iter().enumerate() {
                if old.get(i) != Some(value) {
                    if let Some(slot) = proposed.get_mut(i) {
                        *slot = value.clone();
                    }
                }
            }
        }
        record.set_current(Some(new.clone()));
        if record.state == RowState::Unchanged {
            record.state = RowState::Modified;
        }
        self.index_insert(row, &new);
        trace!(table = %self.table_name(), row = row.0, "Cascaded update applied");
        self.fire_changed(row, RowAction::Change);
    }

    /// Apply a cascaded delete to a visible row
    pub(crate) fn apply_delete(&mut self, row: RowId) {
        let values = self.records[row.0].current().cloned().unwrap_or_default();
        self.commit_delete(StagedDelete { row, values });
    }

    // ===== Accept / reject =====

    /// Accept the pending changes of a row
    pub fn accept_row(&mut self, row: RowId) -> Result<()> {
        self.ensure_local_mutation()?;
        self.accept_record(row)
    }

    /// Reject the pending changes of a row
    pub fn reject_row(&mut self, row: RowId) -> Result<()> {
        self.ensure_local_mutation()?;
        self.reject_record(row, true)
    }

    /// Accept every pending change in the table
    pub fn accept_changes(&mut self) -> Result<()> {
        self.ensure_local_mutation()?;
        for row in self.rows.clone() {
            self.accept_record(row)?;
        }
        Ok(())
    }

    /// Reject every pending change in the table
    pub fn reject_changes(&mut self) -> Result<()> {
        self.ensure_local_mutation()?;
        for row in self.rows.clone() {
            self.reject_record(row, false)?;
        }
        Ok(())
    }

    pub(crate) fn accept_record(&mut self, row: RowId) -> Result<()> {
        let record = self.record(row)?;
        if record.in_changing {
            return Err(Error::InRowChangingEvent);
        }
        if record.state == RowState::Detached {
            return Err(Error::RowNotInTable);
        }
        if record.editing {
            self.end_edit_local(row)?;
        }
        if self.records[row.0].state == RowState::Unchanged {
            return Ok(());
        }
        self.fire_changing(row, RowAction::Commit)?;
        let was_deleted = self.records[row.0].state == RowState::Deleted;
        self.records[row.0].accept();
        if was_deleted {
            self.rows.retain(|r| *r != row);
        }
        trace!(table = %self.table_name(), row = row.0, "Row accepted");
        self.fire_changed(row, RowAction::Commit);
        Ok(())
    }

    /// Restore the original values of a row
    ///
    /// `check_unique` re-checks the restored key against the other rows.
    pub(crate) fn reject_record(&mut self, row: RowId, check_unique: bool) -> Result<()> {
        let record = self.record(row)?;
        if record.in_changing {
            return Err(Error::InRowChangingEvent);
        }
        let state = record.state;
        match state {
            RowState::Detached => return Err(Error::RowNotInTable),
            RowState::Unchanged if !record.editing => return Ok(()),
            _ => {}
        }
        let before = record.current().cloned();
        if check_unique && matches!(state, RowState::Modified | RowState::Deleted) {
            if let Some(original) = record.original().cloned() {
                self.check_unique(row, &original)?;
            }
        }
        self.fire_changing(row, RowAction::Rollback)?;

        self.records[row.0].reject();
        match state {
            RowState::Added => {
                if let Some(values) = &before {
                    self.index_remove(row, values);
                }
                self.rows.retain(|r| *r != row);
            }
            RowState::Modified | RowState::Deleted => {
                if let Some(values) = &before {
                    self.index_remove(row, values);
                }
                if let Some(values) = self.records[row.0].current().cloned() {
                    self.index_insert(row, &values);
                }
            }
            _ => {}
        }
        trace!(table = %self.table_name(), row = row.0, "Row rejected");
        self.fire_changed(row, RowAction::Rollback);
        Ok(())
    }

    pub(crate) fn snapshot_rows(&self) -> RowSnapshot {
        RowSnapshot {
            records: self.records.clone(),
            rows: self.rows.clone(),
        }
    }

    /// Put back the rows captured by [`snapshot_rows`](Self::snapshot_rows)
    ///
    /// No notifications fire.
    pub(crate) fn restore_rows(&mut self, snapshot: RowSnapshot) {
        self.records = snapshot.records;
        self.rows = snapshot.rows;
        self.rebuild_indexes();
        trace!(table = %self.table_name(), "Rows restored");
    }

    /// Force an unchanged row to `Added`
    pub fn set_added(&mut self, row: RowId) -> Result<()> {
        self.record_mut(row)?.set_state(RowState::Added)
    }

    /// Force an unchanged row to `Modified`
    pub fn set_modified(&mut self, row: RowId) -> Result<()> {
        self.record_mut(row)?.set_state(RowState::Modified)
    }

    // ===== Row errors =====

    pub fn set_row_error(&mut self, row: RowId, error: impl Into<String>) -> Result<()> {
        let error = error.into();
        self.record_mut(row)?.error = (!error.is_empty()).then_some(error);
        Ok(())
    }

    pub fn row_error(&self, row: RowId) -> Result<Option<&str>> {
        Ok(self.record(row)?.error.as_deref())
    }

    pub fn clear_row_errors(&mut self, row: RowId) -> Result<()> {
        self.record_mut(row)?.error = None;
        Ok(())
    }

    /// True when any row of the table carries an error
    pub fn has_errors(&self) -> bool {
        self.rows.iter().any(|r| self.records[r.0].error.is_some())
    }

    pub fn rows_in_error(&self) -> Vec<RowId> {
        self.rows
            .iter()
            .copied()
            .filter(|r| self.records[r.0].error.is_some())
            .collect()
    }

    // ===== Queries =====

    /// Find a visible row by primary-key values
    pub fn find(&self, key: &[Value]) -> Result<Option<RowId>> {
        let pk = self
            .constraints
            .primary_key()
            .ok_or_else(|| Error::MissingPrimaryKey(self.table_name().to_string()))?;
        if key.len() != pk.columns.len() {
            return Err(Error::argument(format!(
                "Expecting {} value(s) for the key being indexed, but received {} value(s).",
                pk.columns.len(),
                key.len()
            )));
        }
        let mut coerced = Vec::with_capacity(key.len());
        for (id, value) in pk.columns.iter().zip(key) {
            let column = self
                .columns
                .by_id(*id)
                .ok_or_else(|| Error::argument("primary key column is missing"))?;
            coerced.push(column.data_type().coerce(value.clone())?);
        }
        Ok(self.rows_with_key(&pk.columns, &coerced).first().copied())
    }

    /// True when a visible row has these primary-key values
    pub fn contains(&self, key: &[Value]) -> Result<bool> {
        Ok(self.find(key)?.is_some())
    }

    /// Visible rows for which `predicate` holds, in table order
    pub fn select<F>(&self, predicate: F) -> Vec<RowId>
    where
        F: Fn(&RowView<'_>) -> bool,
    {
        self.rows
            .iter()
            .copied()
            .filter(|row| {
                self.records[row.0]
                    .current()
                    .is_some_and(|values| predicate(&RowView::new(self, *row, values)))
            })
            .collect()
    }

    /// Rows whose state is one of `states`
    pub fn get_changes(&self, states: &[RowState]) -> Vec<RowId> {
        self.rows
            .iter()
            .copied()
            .filter(|row| states.contains(&self.records[row.0].state))
            .collect()
    }

    /// True when any row has a pending change
    pub fn has_changes(&self) -> bool {
        self.rows
            .iter()
            .any(|row| self.records[row.0].state != RowState::Unchanged)
    }

    /// Existing row for a load: the visible row with the same primary key
    pub(crate) fn find_for_load(&self, values: &[Value]) -> Result<Option<RowId>> {
        let Some(pk) = self.constraints.primary_key() else {
            return Ok(None);
        };
        let ordinals = self.columns.ordinals(&pk.columns);
        let mut key = Vec::with_capacity(ordinals.len());
        for ordinal in ordinals {
            let value = values.get(ordinal).cloned().unwrap_or_default();
            let column = self.columns.at(ordinal as isize)?;
            key.push(column.data_type().coerce(value)?);
        }
        Ok(self.rows_with_key(&pk.columns, &key).first().copied())
    }

    /// Update the row with the same primary key, or add a new one
    ///
    /// Read-only columns may be written. With `accept` the row ends up
    /// `Unchanged`.
    pub fn load_data_row(&mut self, values: Vec<Value>, accept: bool) -> Result<RowId> {
        self.ensure_local_mutation()?;
        let row = match self.find_for_load(&values)? {
            Some(row) => {
                self.begin_edit(row)?;
                let outcome = self
                    .stage_item_array(row, &values, true)
                    .and_then(|_| self.end_edit_local(row));
                if let Err(e) = outcome {
                    self.records[row.0].cancel_edit();
                    return Err(e);
                }
                row
            }
            None => {
                if values.len() > self.columns.len() {
                    return Err(Error::argument(
                        "Input array is longer than the number of columns in this table.",
                    ));
                }
                let row = self.new_row()?;
                self.stage_item_array(row, &values, true)?;
                self.add_row(row)?;
                row
            }
        };
        if accept {
            self.accept_record(row)?;
        }
        Ok(row)
    }

    /// Remove every row
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_local_mutation()?;
        self.clear_rows();
        Ok(())
    }

    pub(crate) fn clear_rows(&mut self) {
        for row in std::mem::take(&mut self.rows) {
            self.records[row.0].remove();
        }
        for index in &mut self.indexes {
            index.clear();
        }
        trace!(table = %self.table_name(), "Table cleared");
        self.fire_cleared();
    }

    /// Values of `columns` in a version of a row
    pub(crate) fn key_of(
        &self,
        row: RowId,
        columns: &[ColumnId],
        version: RowVersion,
    ) -> Result<Vec<Value>> {
        let values = self.record(row)?.values(version)?;
        Ok(project(values, &self.columns.ordinals(columns)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataColumn, DataType, UniqueConstraint};
    use crate::error::ErrorKind;
    use crate::storage::{RowChangeEvent, RowChangeListener};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn numbers() -> DataTable {
        let mut table = DataTable::new("numbers");
        table
            .add_column(DataColumn::new("id", DataType::Int32).auto_increment(1, 1))
            .unwrap();
        table.add_column(DataColumn::new("name", DataType::String)).unwrap();
        table
            .add_column(DataColumn::new("qty", DataType::Int32).default_value(10))
            .unwrap();
        table
    }

    #[test]
    fn test_new_row_defaults() {
        let mut table = numbers();
        let row = table.new_row().unwrap();
        assert_eq!(table.row_state(row).unwrap(), RowState::Detached);
        assert_eq!(table.get(row, "id").unwrap(), Value::Int32(1));
        assert_eq!(table.get(row, "qty").unwrap(), Value::Int32(10));
        assert!(!table.has_version(row, RowVersion::Original).unwrap());
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn test_add_and_accept() {
        let mut table = numbers();
        let row = table.add_values(vec![Value::Null, "a".into()]).unwrap();
        assert_eq!(table.row_state(row).unwrap(), RowState::Added);
        assert_eq!(
            table.item_array(row).unwrap(),
            vec![Value::Int32(1), "a".into(), Value::Int32(10)]
        );

        table.accept_changes().unwrap();
        assert_eq!(table.row_state(row).unwrap(), RowState::Unchanged);
        table.accept_row(row).unwrap();
        assert_eq!(table.row_state(row).unwrap(), RowState::Unchanged);
    }

    #[test]
    fn test_auto_increment_advances_with_explicit_values() {
        let mut table = numbers();
        table.add_values(vec![Value::Int32(100), "x".into()]).unwrap();
        let row = table.add_values(vec![Value::Null, "y".into()]).unwrap();
        assert_eq!(table.get(row, "id").unwrap(), Value::Int32(2));
    }

    #[test]
    fn test_implicit_edit_marks_modified() {
        let mut table = numbers();
        let row = table.add_values(vec![Value::Null, "a".into()]).unwrap();
        table.accept_changes().unwrap();

        table.set(row, "name", "b").unwrap();
        assert_eq!(table.row_state(row).unwrap(), RowState::Modified);
        assert_eq!(
            table.get_version(row, "name", RowVersion::Original).unwrap(),
            Value::from("a")
        );

        table.reject_row(row).unwrap();
        assert_eq!(table.get(row, "name").unwrap(), Value::from("a"));
        assert_eq!(table.row_state(row).unwrap(), RowState::Unchanged);
    }

    #[test]
    fn test_explicit_edit() {
        let mut table = numbers();
        let row = table.add_values(vec![Value::Null, "a".into()]).unwrap();
        table.accept_changes().unwrap();

        table.begin_edit(row).unwrap();
        table.set(row, "name", "b").unwrap();
        assert_eq!(table.get_version(row, "name", RowVersion::Current).unwrap(), Value::from("a"));
        assert_eq!(table.get_version(row, "name", RowVersion::Proposed).unwrap(), Value::from("b"));
        table.cancel_edit(row).unwrap();
        assert_eq!(table.get(row, "name").unwrap(), Value::from("a"));
        assert_eq!(table.row_state(row).unwrap(), RowState::Unchanged);
    }

    #[test]
    fn test_failed_end_edit_stays_in_edit() {
        let mut table = numbers();
        table.set_column_allow_null("name", false).unwrap();
        let row = table.add_values(vec![Value::Null, "a".into()]).unwrap();

        table.begin_edit(row).unwrap();
        table.set(row, "name", Value::Null).unwrap();
        assert_eq!(table.end_edit(row).unwrap_err().kind(), ErrorKind::NoNullAllowed);
        assert!(table.has_version(row, RowVersion::Proposed).unwrap());
        table.cancel_edit(row).unwrap();

        assert_eq!(
            table.set(row, "name", Value::Null).unwrap_err().kind(),
            ErrorKind::NoNullAllowed
        );
        assert_eq!(table.get(row, "name").unwrap(), Value::from("a"));
        assert!(!table.has_version(row, RowVersion::Proposed).unwrap());
    }

    #[test]
    fn test_delete_states() {
        let mut table = numbers();
        let added = table.add_values(vec![Value::Null, "a".into()]).unwrap();
        table.delete_row(added).unwrap();
        assert_eq!(table.row_state(added).unwrap(), RowState::Detached);
        assert_eq!(table.get(added, "name").unwrap_err(), Error::RowNotInTable);
        assert_eq!(table.row_count(), 0);

        let row = table.add_values(vec![Value::Null, "b".into()]).unwrap();
        table.accept_changes().unwrap();
        table.delete_row(row).unwrap();
        assert_eq!(table.row_state(row).unwrap(), RowState::Deleted);
        assert_eq!(table.get(row, "name").unwrap_err(), Error::DeletedRowInaccessible);
        assert_eq!(
            table.get_version(row, "name", RowVersion::Original).unwrap(),
            Value::from("b")
        );

        table.accept_changes().unwrap();
        assert_eq!(table.row_count(), 0);
        assert_eq!(table.accept_row(row).unwrap_err(), Error::RowNotInTable);
        assert_eq!(table.reject_row(row).unwrap_err(), Error::RowNotInTable);
    }

    #[test]
    fn test_item_array_lengths() {
        let mut table = numbers();
        let err = table
            .add_values(vec![Value::Null, "a".into(), Value::Int32(1), Value::Int32(2)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);

        let row = table.add_values(vec![]).unwrap();
        assert_eq!(table.get(row, "name").unwrap(), Value::Null);
        assert_eq!(table.get(row, "qty").unwrap(), Value::Int32(10));
    }

    #[test]
    fn test_read_only_and_load_data_row() {
        let mut table = numbers();
        table.set_column_read_only("name", true).unwrap();
        table.set_primary_key(&["id"]).unwrap();
        let row = table.add_values(vec![Value::Int32(1), "a".into()]).unwrap();

        assert_eq!(table.set(row, "name", "b").unwrap_err().kind(), ErrorKind::ReadOnly);

        let same = table
            .load_data_row(vec![Value::Int32(1), "b".into(), Value::Int32(3)], true)
            .unwrap();
        assert_eq!(same, row);
        assert_eq!(table.get(row, "name").unwrap(), Value::from("b"));
        assert_eq!(table.row_state(row).unwrap(), RowState::Unchanged);

        let other = table.load_data_row(vec![Value::Int32(7), "c".into()], false).unwrap();
        assert_ne!(other, row);
        assert_eq!(table.row_state(other).unwrap(), RowState::Added);
    }

    #[test]
    fn test_unique_violation_on_add() {
        let mut table = numbers();
        let uc = UniqueConstraint::new(&table, "", &["name"]).unwrap();
        table.add_constraint(uc).unwrap();
        table.add_values(vec![Value::Null, "a".into()]).unwrap();

        let err = table.add_values(vec![Value::Null, "A".into()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Constraint);
        assert_eq!(table.row_count(), 1);

        table.add_values(vec![Value::Null, Value::Null]).unwrap();
        table.add_values(vec![Value::Null, Value::Null]).unwrap();
    }

    #[test]
    fn test_exhausted_sequence_refuses_rows() {
        let mut table = DataTable::new("tickets");
        let id = DataColumn::new("id", DataType::Int32).auto_increment(i64::from(i32::MAX), 1);
        table.add_column(id).unwrap();
        table.add_values(vec![Value::Null]).unwrap();

        let err = table.add_values(vec![Value::Null]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_unique_double_treats_signed_zeros_alike() {
        let mut table = DataTable::new("readings");
        table.add_column(DataColumn::new("value", DataType::Double)).unwrap();
        let uc = UniqueConstraint::new(&table, "", &["value"]).unwrap();
        table.add_constraint(uc).unwrap();

        table.add_values(vec![Value::Double(0.0)]).unwrap();
        let err = table.add_values(vec![Value::Double(-0.0)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Constraint);
    }

    #[test]
    fn test_find_by_primary_key() {
        let mut table = numbers();
        assert_eq!(
            table.find(&[Value::Int32(1)]).unwrap_err().kind(),
            ErrorKind::MissingPrimaryKey
        );
        table.set_primary_key(&["id"]).unwrap();
        let row = table.add_values(vec![Value::Null, "a".into()]).unwrap();

        assert_eq!(table.find(&[Value::Int64(1)]).unwrap(), Some(row));
        assert!(!table.contains(&[Value::Int32(5)]).unwrap());
        assert_eq!(
            table.find(&[Value::Int32(1), Value::Int32(2)]).unwrap_err().kind(),
            ErrorKind::Argument
        );
    }

    #[test]
    fn test_select_and_changes() {
        let mut table = numbers();
        let a = table.add_values(vec![Value::Null, "a".into(), Value::Int32(1)]).unwrap();
        let b = table.add_values(vec![Value::Null, "b".into(), Value::Int32(5)]).unwrap();

        let big = table.select(|row| row.get("qty").map_or(false, |v| v.as_i32() > Some(2)));
        assert_eq!(big, vec![b]);
        assert_eq!(table.get_changes(&[RowState::Added]), vec![a, b]);

        table.accept_changes().unwrap();
        assert!(!table.has_changes());
        table.set_modified(a).unwrap();
        assert_eq!(table.get_changes(&[RowState::Modified]), vec![a]);
        assert_eq!(table.set_added(a).unwrap_err().kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_row_errors() {
        let mut table = numbers();
        let row = table.add_values(vec![]).unwrap();
        assert!(!table.has_errors());
        table.set_row_error(row, "bad").unwrap();
        assert_eq!(table.row_error(row).unwrap(), Some("bad"));
        assert_eq!(table.rows_in_error(), vec![row]);
        table.clear_row_errors(row).unwrap();
        assert!(!table.has_errors());
    }

    struct Reentrant {
        seen: Rc<RefCell<Vec<Error>>>,
    }

    impl RowChangeListener for Reentrant {
        fn row_changing(&mut self, table: &mut DataTable, event: &RowChangeEvent) -> Result<()> {
            if event.action == RowAction::Change {
                if let Err(e) = table.end_edit(event.row) {
                    self.seen.borrow_mut().push(e);
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_end_edit_inside_row_changing() {
        let mut table = numbers();
        let seen = Rc::new(RefCell::new(Vec::new()));
        table.add_listener(Box::new(Reentrant { seen: seen.clone() }));
        let row = table.add_values(vec![Value::Null, "a".into()]).unwrap();

        table.set(row, "name", "b").unwrap();
        assert_eq!(seen.borrow().as_slice(), &[Error::InRowChangingEvent]);
        assert_eq!(table.get(row, "name").unwrap(), Value::from("b"));
    }

    #[test]
    fn test_clear_and_copy() {
        let mut table = numbers();
        table.set_primary_key(&["id"]).unwrap();
        table.add_values(vec![Value::Null, "a".into()]).unwrap();

        let copy = table.copy();
        assert_eq!(copy.row_count(), 1);
        assert_ne!(copy.id(), table.id());
        assert_eq!(copy.primary_key().len(), 1);

        let schema = table.clone_schema();
        assert_eq!(schema.row_count(), 0);
        assert_eq!(schema.columns().len(), 3);

        table.clear().unwrap();
        assert_eq!(table.row_count(), 0);
        assert!(copy.contains(&[Value::Int32(1)]).unwrap());
    }
}
