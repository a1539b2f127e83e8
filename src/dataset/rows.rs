//! Row operations routed through the data set
//!
//! These mirror the row methods of [`DataTable`](crate::DataTable) and add the
//! cross-table work: a child row must find its parent, and a parent delete or
//! key change runs the foreign keys' rules over the child rows. Every method
//! works for any table of the data set, with or without foreign keys.

use tracing::{trace, warn};

use super::cascade::CascadePlan;
use super::dataset::{rows_matching, DataSet, TableKey};
use crate::catalog::{AcceptRejectRule, ColumnKey};
use crate::error::{Error, Result};
use crate::storage::table::display_key;
use crate::storage::{
    any_null, project, DataTable, EditMode, IndexKey, RowId, RowSnapshot, RowState, RowVersion,
    Value,
};

impl DataSet {
    /// Create a detached row of a table
    pub fn new_row(&mut self, table: impl TableKey) -> Result<RowId> {
        let index = table.resolve(self)?;
        self.table_at_index_mut(index)?.new_row()
    }

    /// Add a detached row to its table
    pub fn add_row(&mut self, table: impl TableKey, row: RowId) -> Result<()> {
        let index = table.resolve(self)?;
        self.add_row_at(index, row)
    }

    /// Create and add a row from a value array
    pub fn add_values(&mut self, table: impl TableKey, values: Vec<Value>) -> Result<RowId> {
        let index = table.resolve(self)?;
        let row = self.table_at_index_mut(index)?.new_detached_from(&values)?;
        self.add_row_at(index, row)?;
        Ok(row)
    }

    fn add_row_at(&mut self, index: usize, row: RowId) -> Result<()> {
        let staged = self.table_at_index_mut(index)?.stage_add(row)?;
        self.check_parent_exists(index, &staged.values)?;
        self.table_at_index_mut(index)?.commit_add(staged);
        Ok(())
    }

    /// Update the row with the same primary key, or add a new one
    ///
    /// Read-only columns may be written. With `accept` the row ends up
    /// `Unchanged`.
    pub fn load_data_row(
        &mut self,
        table: impl TableKey,
        values: Vec<Value>,
        accept: bool,
    ) -> Result<RowId> {
        let index = table.resolve(self)?;
        let existing = self.table_at_index(index)?.find_for_load(&values)?;
        let row = match existing {
            Some(row) => {
                self.table_at_index_mut(index)?.begin_edit(row)?;
                let staged = self
                    .table_at_index_mut(index)?
                    .stage_item_array(row, &values, true);
                let outcome = staged.and_then(|_| self.end_edit_at(index, row));
                if let Err(e) = outcome {
                    self.table_at_index_mut(index)?.abort_edit(row);
                    return Err(e);
                }
                row
            }
            None => {
                let target = self.table_at_index_mut(index)?;
                if values.len() > target.columns().len() {
                    return Err(Error::argument(
                        "Input array is longer than the number of columns in this table.",
                    ));
                }
                let row = target.new_row()?;
                target.stage_item_array(row, &values, true)?;
                self.add_row_at(index, row)?;
                row
            }
        };
        if accept {
            self.accept_row_at(index, row)?;
        }
        Ok(row)
    }

    // ===== Values =====

    /// Write one value
    ///
    /// Outside an explicit edit the write is committed at once, with the
    /// foreign-key checks and cascades of an edit.
    pub fn set(
        &mut self,
        table: impl TableKey,
        row: RowId,
        column: impl ColumnKey,
        value: impl Into<Value>,
    ) -> Result<()> {
        let index = table.resolve(self)?;
        let target = self.table_at_index_mut(index)?;
        let ordinal = column.resolve(target.columns(), target.table_name())?;
        let mode = target.stage_value(row, ordinal, value.into(), false)?;
        self.finish_write(index, row, mode)?;
        self.table_at_index_mut(index)?.notify_column(row, ordinal);
        Ok(())
    }

    /// Replace all values of a row
    pub fn set_item_array(
        &mut self,
        table: impl TableKey,
        row: RowId,
        values: Vec<Value>,
    ) -> Result<()> {
        let index = table.resolve(self)?;
        let mode = self
            .table_at_index_mut(index)?
            .stage_item_array(row, &values, false)?;
        self.finish_write(index, row, mode)
    }

    fn finish_write(&mut self, index: usize, row: RowId, mode: EditMode) -> Result<()> {
        if mode != EditMode::Implicit {
            return Ok(());
        }
        if let Err(e) = self.end_edit_at(index, row) {
            self.table_at_index_mut(index)?.abort_edit(row);
            return Err(e);
        }
        Ok(())
    }

    // ===== Edits =====

    pub fn begin_edit(&mut self, table: impl TableKey, row: RowId) -> Result<()> {
        let index = table.resolve(self)?;
        self.table_at_index_mut(index)?.begin_edit(row)
    }

    pub fn cancel_edit(&mut self, table: impl TableKey, row: RowId) -> Result<()> {
        let index = table.resolve(self)?;
        self.table_at_index_mut(index)?.cancel_edit(row)
    }

    /// Commit an open edit
    ///
    /// On failure the row stays in edit mode with its proposed values.
    pub fn end_edit(&mut self, table: impl TableKey, row: RowId) -> Result<()> {
        let index = table.resolve(self)?;
        self.end_edit_at(index, row)
    }

    pub(crate) fn end_edit_at(&mut self, index: usize, row: RowId) -> Result<()> {
        let Some(staged) = self.table_at_index_mut(index)?.stage_edit(row)? else {
            return Ok(());
        };
        if !staged.touched {
            self.table_at_index_mut(index)?.commit_edit(Some(staged));
            return Ok(());
        }
        self.check_parent_exists(index, &staged.new)?;
        let (old, new) = (staged.old.clone(), staged.new.clone());
        let plan = CascadePlan::for_update(self, index, row, old, new)?;
        plan.validate(self)?;
        self.table_at_index_mut(index)?.commit_edit(Some(staged));
        plan.apply(self)
    }

    // ===== Deletes =====

    /// Delete a row, applying the delete rules of the foreign keys that
    /// reference it
    pub fn delete_row(&mut self, table: impl TableKey, row: RowId) -> Result<()> {
        let index = table.resolve(self)?;
        self.delete_row_at(index, row)
    }

    fn delete_row_at(&mut self, index: usize, row: RowId) -> Result<()> {
        let staged = self.table_at_index_mut(index)?.stage_delete(row)?;
        let plan = CascadePlan::for_delete(self, index, row, staged.values.clone())?;
        plan.validate(self)?;
        self.table_at_index_mut(index)?.commit_delete(staged);
        plan.apply(self)
    }

    /// Delete a row and drop it from its table for good
    pub fn remove_row(&mut self, table: impl TableKey, row: RowId) -> Result<()> {
        let index = table.resolve(self)?;
        self.delete_row_at(index, row)?;
        self.table_at_index_mut(index)?.purge(row);
        Ok(())
    }

    // ===== Accept / reject =====

    /// Accept the pending changes of a row
    ///
    /// Child rows follow when their foreign key's accept/reject rule is
    /// `Cascade`.
    pub fn accept_row(&mut self, table: impl TableKey, row: RowId) -> Result<()> {
        let index = table.resolve(self)?;
        self.accept_row_at(index, row)
    }

    fn accept_row_at(&mut self, index: usize, row: RowId) -> Result<()> {
        let record = self.table_at_index(index)?.record(row)?;
        if record.in_changing {
            return Err(Error::InRowChangingEvent);
        }
        if record.state == RowState::Detached {
            return Err(Error::RowNotInTable);
        }
        if record.editing {
            self.end_edit_at(index, row)?;
        }
        if self.table_at_index(index)?.row_state(row)? == RowState::Unchanged {
            return Ok(());
        }
        let children = self.cascading_children(index, row)?;
        self.table_at_index_mut(index)?.accept_record(row)?;
        for (child_index, child) in children {
            if self.table_at_index(child_index)?.row_state(child)? != RowState::Detached {
                self.accept_row_at(child_index, child)?;
            }
        }
        Ok(())
    }

    /// Reject the pending changes of a row
    ///
    /// The restored values must satisfy the foreign keys again; undoing an
    /// added parent runs the delete rules. Child rows under an accept/reject
    /// rule of `Cascade` are rejected first. When any step fails, every row
    /// is left as it was.
    pub fn reject_row(&mut self, table: impl TableKey, row: RowId) -> Result<()> {
        let index = table.resolve(self)?;
        self.reject_row_at(index, row, false)
    }

    /// `cascaded` is set for rows rejected along with their parent, whose own
    /// values are restored next; the outermost call owns the rollback
    fn reject_row_at(&mut self, index: usize, row: RowId, cascaded: bool) -> Result<()> {
        let record = self.table_at_index(index)?.record(row)?;
        if record.in_changing {
            return Err(Error::InRowChangingEvent);
        }
        let state = record.state;
        match state {
            RowState::Detached => return Err(Error::RowNotInTable),
            RowState::Unchanged if !record.editing => return Ok(()),
            _ => {}
        }

        // the row's own restored key is checked before any row changes
        if matches!(state, RowState::Modified | RowState::Deleted) {
            if let Some(original) = record.original().cloned() {
                self.table_at_index(index)?.check_unique(row, &original)?;
                if !cascaded {
                    self.check_parent_exists(index, &original)?;
                }
            }
        }

        let mut children = Vec::new();
        for (child_index, child) in self.cascading_children(index, row)? {
            let child_state = self.table_at_index(child_index)?.row_state(child)?;
            if child_state != RowState::Detached && (child_index, child) != (index, row) {
                children.push((child_index, child));
            }
        }
        if children.is_empty() || cascaded {
            return self.reject_cascaded(index, row, state, children);
        }

        let saved = self.snapshot_rows();
        if let Err(e) = self.reject_cascaded(index, row, state, children) {
            self.restore_rows(saved);
            return Err(e);
        }
        Ok(())
    }

    /// Reject `children`, then the row itself along with its delete or update rules
    fn reject_cascaded(
        &mut self,
        index: usize,
        row: RowId,
        state: RowState,
        children: Vec<(usize, RowId)>,
    ) -> Result<()> {
        for (child_index, child) in children {
            self.reject_row_at(child_index, child, true)?;
        }

        let record = self.table_at_index(index)?.record(row)?;
        let current = record.current().cloned();
        let original = record.original().cloned();
        let plan = match (state, current, original) {
            (RowState::Added, Some(current), _) => {
                Some(CascadePlan::for_delete(self, index, row, current)?)
            }
            (RowState::Modified, Some(current), Some(original)) => {
                Some(CascadePlan::for_update(self, index, row, current, original)?)
            }
            _ => None,
        };
        if let Some(plan) = &plan {
            plan.validate(self)?;
        }
        self.table_at_index_mut(index)?.reject_record(row, true)?;
        if let Some(plan) = plan {
            plan.apply(self)?;
        }
        Ok(())
    }

    fn snapshot_rows(&self) -> Vec<RowSnapshot> {
        self.tables.iter().map(DataTable::snapshot_rows).collect()
    }

    fn restore_rows(&mut self, saved: Vec<RowSnapshot>) {
        for (table, snapshot) in self.tables.iter_mut().zip(saved) {
            table.restore_rows(snapshot);
        }
        warn!(data_set = %self.name(), "Reject rolled back");
    }

    /// Child rows whose foreign key cascades accept and reject from this row
    fn cascading_children(&self, index: usize, row: RowId) -> Result<Vec<(usize, RowId)>> {
        let parent = self.table_at_index(index)?;
        let record = parent.record(row)?;
        let version = if record.state == RowState::Deleted {
            RowVersion::Original
        } else {
            RowVersion::Current
        };
        let mut children = Vec::new();
        for (child_index, child) in self.tables.iter().enumerate() {
            for fk in child.constraints().foreign_keys() {
                if fk.related_table != parent.id()
                    || fk.accept_reject_rule != AcceptRejectRule::Cascade
                {
                    continue;
                }
                let key = parent.key_of(row, &fk.related_columns, version)?;
                let mut matched = rows_matching(child, &fk.columns, &key, RowVersion::Current);
                matched.extend(rows_matching(child, &fk.columns, &key, RowVersion::Original));
                for child_row in matched {
                    if !children.contains(&(child_index, child_row)) {
                        children.push((child_index, child_row));
                    }
                }
            }
        }
        Ok(children)
    }

    /// Accept every pending change in every table
    pub fn accept_changes(&mut self) -> Result<()> {
        for index in 0..self.tables.len() {
            let rows: Vec<RowId> = self.table_at_index(index)?.rows().collect();
            for row in rows {
                if self.table_at_index(index)?.record(row)?.editing {
                    self.end_edit_at(index, row)?;
                }
                self.table_at_index_mut(index)?.accept_record(row)?;
            }
        }
        trace!(data_set = %self.name(), "Accepted changes");
        Ok(())
    }

    /// Reject every pending change in every table
    ///
    /// All tables return to their accepted state together, so foreign keys
    /// are not re-checked row by row.
    pub fn reject_changes(&mut self) -> Result<()> {
        for index in 0..self.tables.len() {
            let rows: Vec<RowId> = self.table_at_index(index)?.rows().collect();
            for row in rows {
                self.table_at_index_mut(index)?.reject_record(row, false)?;
            }
        }
        trace!(data_set = %self.name(), "Rejected changes");
        Ok(())
    }

    /// True when any table has a pending change
    pub fn has_changes(&self) -> bool {
        self.tables.iter().any(|t| t.has_changes())
    }

    /// Remove every row of one table
    ///
    /// With constraints enforced this fails while rows of another table
    /// refer to it.
    pub fn clear_table(&mut self, table: impl TableKey) -> Result<()> {
        let index = table.resolve(self)?;
        let target = self.table_at_index(index)?;
        if self.enforce_constraints {
            for child in self.tables.iter().filter(|t| t.id() != target.id()) {
                for fk in child.constraints().foreign_keys() {
                    if fk.related_table != target.id() {
                        continue;
                    }
                    let ordinals = child.columns().ordinals(&fk.columns);
                    if child.visible_values().any(|v| !any_null(v, &ordinals)) {
                        return Err(Error::invalid_constraint(format!(
                            "cannot clear table {} because ForeignKeyConstraint {} enforces constraints and there are child rows in {}",
                            target.table_name(),
                            fk.name(),
                            child.table_name()
                        )));
                    }
                }
            }
        }
        self.table_at_index_mut(index)?.clear_rows();
        Ok(())
    }

    /// Remove every row of every table
    pub fn clear(&mut self) {
        for table in self.tables.iter_mut() {
            table.clear_rows();
        }
    }

    // ===== Referential checks =====

    /// With constraints enforced, every non-null foreign key in `values` must
    /// match a parent row
    ///
    /// A row of a self-referencing table may be its own parent.
    pub(crate) fn check_parent_exists(&self, index: usize, values: &[Value]) -> Result<()> {
        if !self.enforce_constraints {
            return Ok(());
        }
        let table = self.table_at_index(index)?;
        for fk in table.constraints().foreign_keys() {
            let ordinals = table.columns().ordinals(&fk.columns);
            if any_null(values, &ordinals) {
                continue;
            }
            let key = project(values, &ordinals);
            let parent = self.table_by_id(fk.related_table)?;
            if !parent.rows_with_key(&fk.related_columns, &key).is_empty() {
                continue;
            }
            if fk.related_table == table.id() {
                let cs = table.case_sensitive();
                let own = project(values, &table.columns().ordinals(&fk.related_columns));
                if IndexKey::new(own, cs) == IndexKey::new(key.clone(), cs) {
                    continue;
                }
            }
            let shown = IndexKey::new(key.clone(), table.case_sensitive())
                .map(|k| display_key(&k))
                .unwrap_or_default();
            return Err(Error::constraint(format!(
                "ForeignKeyConstraint {} requires the child key values ({}) to exist in the parent table.",
                fk.name(),
                shown
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataColumn, DataType, ForeignKeyConstraint, Rule};
    use crate::error::ErrorKind;
    use crate::storage::DataTable;

    fn orders() -> DataSet {
        let mut ds = DataSet::new("shop");
        let mut customers = DataTable::new("customers");
        customers.add_column(DataColumn::new("id", DataType::Int32)).unwrap();
        customers.add_column(DataColumn::new("name", DataType::String)).unwrap();
        customers.set_primary_key(&["id"]).unwrap();
        let mut orders = DataTable::new("orders");
        orders
            .add_column(DataColumn::new("id", DataType::Int32).auto_increment(1, 1))
            .unwrap();
        orders.add_column(DataColumn::new("customer", DataType::Int32)).unwrap();
        ds.add_table(customers).unwrap();
        ds.add_table(orders).unwrap();
        ds.relate("customer_orders", "customers", &["id"], "orders", &["customer"])
            .unwrap();
        ds
    }

    #[test]
    fn test_child_needs_parent() {
        let mut ds = orders();
        let err = ds.add_values("orders", vec![Value::Null, Value::Int32(7)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Constraint);
        assert_eq!(ds.table("orders").unwrap().row_count(), 0);

        ds.add_values("customers", vec![Value::Int32(7), "ann".into()]).unwrap();
        ds.add_values("orders", vec![Value::Null, Value::Int32(7)]).unwrap();
        ds.add_values("orders", vec![Value::Null, Value::Null]).unwrap();
        assert_eq!(ds.table("orders").unwrap().row_count(), 2);
    }

    #[test]
    fn test_direct_mutation_refused() {
        let mut ds = orders();
        let err = ds
            .table_mut("orders")
            .unwrap()
            .add_values(vec![Value::Null, Value::Null])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_cascade_delete_and_update() {
        let mut ds = orders();
        let ann = ds.add_values("customers", vec![Value::Int32(1), "ann".into()]).unwrap();
        let o1 = ds.add_values("orders", vec![Value::Null, Value::Int32(1)]).unwrap();
        ds.accept_changes().unwrap();

        ds.set("customers", ann, "id", 2).unwrap();
        assert_eq!(ds.table("orders").unwrap().get(o1, "customer").unwrap(), Value::Int32(2));
        assert_eq!(ds.table("orders").unwrap().row_state(o1).unwrap(), RowState::Modified);

        ds.delete_row("customers", ann).unwrap();
        assert_eq!(ds.table("orders").unwrap().row_state(o1).unwrap(), RowState::Deleted);

        ds.reject_changes().unwrap();
        assert_eq!(ds.table("orders").unwrap().get(o1, "customer").unwrap(), Value::Int32(1));
        assert_eq!(ds.table("customers").unwrap().row_state(ann).unwrap(), RowState::Unchanged);
    }

    #[test]
    fn test_delete_rule_none() {
        let mut ds = DataSet::new("ds");
        let mut parent = DataTable::new("parent");
        parent.add_column(DataColumn::new("id", DataType::Int32)).unwrap();
        let mut child = DataTable::new("child");
        child.add_column(DataColumn::new("pid", DataType::Int32)).unwrap();
        ds.add_table(parent).unwrap();
        ds.add_table(child).unwrap();
        let fk = ForeignKeyConstraint::new(
            "fk",
            ds.table("parent").unwrap(),
            &["id"],
            ds.table("child").unwrap(),
            &["pid"],
        )
        .unwrap()
        .with_delete_rule(Rule::None);
        ds.add_foreign_key(fk).unwrap();
        let p = ds.add_values("parent", vec![Value::Int32(1)]).unwrap();
        ds.add_values("child", vec![Value::Int32(1)]).unwrap();

        let err = ds.delete_row("parent", p).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConstraint);
        assert_eq!(ds.table("parent").unwrap().row_state(p).unwrap(), RowState::Added);
    }

    #[test]
    fn test_clear_table_with_children() {
        let mut ds = orders();
        ds.add_values("customers", vec![Value::Int32(1), "ann".into()]).unwrap();
        ds.add_values("orders", vec![Value::Null, Value::Int32(1)]).unwrap();

        let err = ds.clear_table("customers").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConstraint);
        ds.clear_table("orders").unwrap();
        ds.clear_table("customers").unwrap();
        assert!(!ds.has_changes());
    }

    #[test]
    fn test_load_data_row_updates_by_key() {
        let mut ds = orders();
        let row = ds
            .load_data_row("customers", vec![Value::Int32(1), "ann".into()], true)
            .unwrap();
        let same = ds
            .load_data_row("customers", vec![Value::Int32(1), "anne".into()], false)
            .unwrap();
        assert_eq!(row, same);
        let customers = ds.table("customers").unwrap();
        assert_eq!(customers.get(row, "name").unwrap(), Value::from("anne"));
        assert_eq!(customers.row_state(row).unwrap(), RowState::Modified);
    }

    #[test]
    fn test_reject_restores_parent_check() {
        let mut ds = orders();
        let ann = ds.add_values("customers", vec![Value::Int32(1), "ann".into()]).unwrap();
        let order = ds.add_values("orders", vec![Value::Null, Value::Int32(1)]).unwrap();
        ds.accept_changes().unwrap();

        ds.add_values("customers", vec![Value::Int32(2), "bob".into()]).unwrap();
        ds.set("orders", order, "customer", 2).unwrap();
        ds.delete_row("customers", ann).unwrap();
        assert_eq!(ds.table("orders").unwrap().row_state(order).unwrap(), RowState::Modified);

        // order 1 would point at the deleted customer again
        let err = ds.reject_row("orders", order).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Constraint);
        ds.reject_row("customers", ann).unwrap();
        ds.reject_row("orders", order).unwrap();
        assert_eq!(ds.table("orders").unwrap().get(order, "customer").unwrap(), Value::Int32(1));
    }
}
