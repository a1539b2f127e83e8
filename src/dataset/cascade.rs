//! Referential actions
//!
//! Deleting a parent row or changing its key can touch child rows in other
//! tables, which in turn can have children of their own. A [`CascadePlan`]
//! collects every affected row first without changing anything, is then
//! validated as a whole, and only then applied. A failure at any step leaves
//! every table as it was.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use super::dataset::DataSet;
use crate::catalog::{ColumnId, ForeignKeyConstraint, Rule};
use crate::error::{Error, Result};
use crate::storage::table::display_key;
use crate::storage::{any_null, project, IndexKey, RowId, Value};

/// A row of the data set, addressed by table position
type Slot = (usize, RowId);

/// One change whose effects on child rows still have to be worked out
#[derive(Debug)]
enum Effect {
    Delete {
        table: usize,
        values: Vec<Value>,
    },
    Update {
        table: usize,
        old: Vec<Value>,
        new: Vec<Value>,
    },
}

/// Every row touched by one parent change
#[derive(Debug)]
pub(crate) struct CascadePlan {
    /// The row whose change started the cascade; the caller commits it
    root: Slot,
    /// New values of updated rows
    updates: IndexMap<Slot, Vec<Value>>,
    deletes: IndexSet<Slot>,
}

impl CascadePlan {
    fn new(root: Slot) -> Self {
        Self {
            root,
            updates: IndexMap::new(),
            deletes: IndexSet::new(),
        }
    }

    /// Plan the deletion of `row`, whose current values are `values`
    pub(crate) fn for_delete(
        ds: &DataSet,
        table: usize,
        row: RowId,
        values: Vec<Value>,
    ) -> Result<Self> {
        let mut plan = Self::new((table, row));
        plan.deletes.insert((table, row));
        plan.run(ds, Effect::Delete { table, values })?;
        Ok(plan)
    }

    /// Plan the change of `row` from `old` to `new`
    pub(crate) fn for_update(
        ds: &DataSet,
        table: usize,
        row: RowId,
        old: Vec<Value>,
        new: Vec<Value>,
    ) -> Result<Self> {
        let mut plan = Self::new((table, row));
        plan.updates.insert((table, row), new.clone());
        plan.run(ds, Effect::Update { table, old, new })?;
        Ok(plan)
    }

    /// True when the plan touches no row besides the root
    pub(crate) fn is_trivial(&self) -> bool {
        self.updates.keys().chain(self.deletes.iter()).all(|slot| *slot == self.root)
    }

    fn run(&mut self, ds: &DataSet, first: Effect) -> Result<()> {
        let mut queue = VecDeque::from([first]);
        while let Some(effect) = queue.pop_front() {
            self.expand(ds, effect, &mut queue)?;
        }
        Ok(())
    }

    /// Values a row will hold once the plan so far is applied
    fn planned_values(&self, ds: &DataSet, slot: Slot) -> Result<Vec<Value>> {
        if let Some(values) = self.updates.get(&slot) {
            return Ok(values.clone());
        }
        let table = ds.table_at_index(slot.0)?;
        Ok(table.record(slot.1)?.current().cloned().unwrap_or_default())
    }

    fn expand(&mut self, ds: &DataSet, effect: Effect, queue: &mut VecDeque<Effect>) -> Result<()> {
        let parent_index = match &effect {
            Effect::Delete { table, .. } | Effect::Update { table, .. } => *table,
        };
        let parent = ds.table_at_index(parent_index)?;
        let parent_id = parent.id();

        for (child_index, child) in ds.tables.iter().enumerate() {
            for fk in child.constraints().foreign_keys() {
                if fk.related_table != parent_id {
                    continue;
                }
                let parent_ordinals = parent.columns().ordinals(&fk.related_columns);
                match &effect {
                    Effect::Delete { values, .. } => {
                        if any_null(values, &parent_ordinals) {
                            continue;
                        }
                        let key = project(values, &parent_ordinals);
                        let matched = child.rows_with_key(&fk.columns, &key);
                        let children = self.live_children(child_index, matched);
                        if children.is_empty() {
                            continue;
                        }
                        match fk.delete_rule {
                            Rule::None if ds.enforce_constraints => {
                                return Err(Error::invalid_constraint(format!(
                                    "Cannot delete this row because constraints are enforced on relation {}, and deleting this row will strand child rows.",
                                    fk.name
                                )));
                            }
                            Rule::None => {}
                            Rule::Cascade => {
                                for row in children {
                                    let values = self.planned_values(ds, (child_index, row))?;
                                    self.updates.shift_remove(&(child_index, row));
                                    if self.deletes.insert((child_index, row)) {
                                        queue.push_back(Effect::Delete {
                                            table: child_index,
                                            values,
                                        });
                                    }
                                }
                            }
                            rule => self.rewrite_children(
                                ds,
                                child_index,
                                fk,
                                children,
                                rule,
                                None,
                                queue,
                            )?,
                        }
                    }
                    Effect::Update { old, new, .. } => {
                        if any_null(old, &parent_ordinals) {
                            continue;
                        }
                        let old_key = project(old, &parent_ordinals);
                        let new_key = project(new, &parent_ordinals);
                        let cs = parent.case_sensitive();
                        let old_index_key = IndexKey::new(old_key.clone(), cs);
                        if old_index_key == IndexKey::new(new_key.clone(), cs) {
                            continue;
                        }
                        let matched = child.rows_with_key(&fk.columns, &old_key);
                        let children = self.live_children(child_index, matched);
                        if children.is_empty() {
                            continue;
                        }
                        match fk.update_rule {
                            Rule::None if ds.enforce_constraints => {
                                return Err(Error::constraint(format!(
                                    "Cannot make this change because constraints are enforced on relation {}, and changing this value will strand child rows.",
                                    fk.name
                                )));
                            }
                            Rule::None => {}
                            rule => self.rewrite_children(
                                ds,
                                child_index,
                                fk,
                                children,
                                rule,
                                Some(&new_key),
                                queue,
                            )?,
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Children that the plan neither deletes nor is rooted at
    fn live_children(&self, table: usize, rows: Vec<RowId>) -> Vec<RowId> {
        rows.into_iter()
            .filter(|row| {
                let slot = (table, *row);
                slot != self.root && !self.deletes.contains(&slot)
            })
            .collect()
    }

    /// Write new key values into child rows: the parent's new key for
    /// `Cascade`, nulls or column defaults otherwise
    #[allow(clippy::too_many_arguments)]
    fn rewrite_children(
        &mut self,
        ds: &DataSet,
        child_index: usize,
        fk: &ForeignKeyConstraint,
        children: Vec<RowId>,
        rule: Rule,
        new_key: Option<&[Value]>,
        queue: &mut VecDeque<Effect>,
    ) -> Result<()> {
        let child = ds.table_at_index(child_index)?;
        let ordinals = child.columns().ordinals(&fk.columns);
        for row in children {
            let old = self.planned_values(ds, (child_index, row))?;
            let mut new = old.clone();
            for (part, (&ordinal, id)) in ordinals.iter().zip(&fk.columns).enumerate() {
                new[ordinal] = match rule {
                    Rule::SetNull => Value::Null,
                    Rule::SetDefault => default_of(ds, child_index, *id)?,
                    _ => new_key
                        .and_then(|key| key.get(part).cloned())
                        .unwrap_or_default(),
                };
            }
            if new == old {
                continue;
            }
            self.updates.insert((child_index, row), new.clone());
            queue.push_back(Effect::Update { table: child_index, old, new });
        }
        Ok(())
    }

    /// Check every planned row against not-null, unique and foreign-key rules
    pub(crate) fn validate(&self, ds: &DataSet) -> Result<()> {
        for (&(index, row), values) in &self.updates {
            if (index, row) == self.root || self.deletes.contains(&(index, row)) {
                continue;
            }
            let table = ds.table_at_index(index)?;
            table.check_not_null(values)?;
            if !ds.enforce_constraints {
                continue;
            }
            for unique in table.constraints().unique_constraints() {
                if let Some(key) = self.key_taken(ds, index, row, &unique.columns, values)? {
                    return Err(Error::constraint(format!(
                        "column '{}' is constrained to be unique. Value '{}' is already present",
                        table.columns().names_of(&unique.columns).join(", "),
                        display_key(&key)
                    )));
                }
            }
            for fk in table.constraints().foreign_keys() {
                let ordinals = table.columns().ordinals(&fk.columns);
                if any_null(values, &ordinals) {
                    continue;
                }
                let key = project(values, &ordinals);
                let parent_index = ds
                    .index_of_id(fk.related_table)
                    .ok_or_else(|| Error::TableNotFound(format!("{:?}", fk.related_table)))?;
                if !self.key_exists_after(ds, parent_index, &fk.related_columns, &key)? {
                    return Err(Error::constraint(format!(
                        "ForeignKeyConstraint {} requires the child key values ({}) to exist in the parent table.",
                        fk.name,
                        key.iter().map(Value::to_string).collect::<Vec<_>>().join(", ")
                    )));
                }
            }
        }
        Ok(())
    }

    /// The key `row` would share with another row once the plan is applied
    fn key_taken(
        &self,
        ds: &DataSet,
        index: usize,
        row: RowId,
        columns: &[ColumnId],
        values: &[Value],
    ) -> Result<Option<IndexKey>> {
        let table = ds.table_at_index(index)?;
        let cs = table.case_sensitive();
        let ordinals = table.columns().ordinals(columns);
        let Some(key) = IndexKey::from_row(values, &ordinals, cs) else {
            return Ok(None);
        };
        let stays = table.rows_with_key(columns, key.parts()).into_iter().any(|other| {
            let slot = (index, other);
            other != row && !self.deletes.contains(&slot) && !self.updates.contains_key(&slot)
        });
        let moves_in = self.updates.iter().any(|(&(i, other), new)| {
            i == index
                && other != row
                && !self.deletes.contains(&(i, other))
                && IndexKey::from_row(new, &ordinals, cs).is_some_and(|k| k == key)
        });
        Ok((stays || moves_in).then_some(key))
    }

    /// True when a parent row will hold `key` over `columns` once the plan is applied
    fn key_exists_after(
        &self,
        ds: &DataSet,
        index: usize,
        columns: &[ColumnId],
        key: &[Value],
    ) -> Result<bool> {
        let table = ds.table_at_index(index)?;
        let cs = table.case_sensitive();
        let ordinals = table.columns().ordinals(columns);
        let Some(wanted) = IndexKey::new(key.to_vec(), cs) else {
            return Ok(true);
        };
        let stays = table.rows_with_key(columns, key).into_iter().any(|row| {
            let slot = (index, row);
            !self.deletes.contains(&slot) && !self.updates.contains_key(&slot)
        });
        let moves_in = self.updates.iter().any(|(&(i, row), new)| {
            i == index
                && !self.deletes.contains(&(i, row))
                && IndexKey::from_row(new, &ordinals, cs).is_some_and(|k| k == wanted)
        });
        Ok(stays || moves_in)
    }

    /// Apply every planned change except the root's
    pub(crate) fn apply(self, ds: &mut DataSet) -> Result<()> {
        if !self.is_trivial() {
            debug!(
                updates = self.updates.len(),
                deletes = self.deletes.len(),
                "Applying cascade"
            );
        }
        for (slot, values) in self.updates {
            if slot == self.root || self.deletes.contains(&slot) {
                continue;
            }
            ds.table_at_index_mut(slot.0)?.apply_update(slot.1, values);
        }
        for slot in self.deletes {
            if slot == self.root {
                continue;
            }
            ds.table_at_index_mut(slot.0)?.apply_delete(slot.1);
        }
        Ok(())
    }
}

fn default_of(ds: &DataSet, table: usize, column: ColumnId) -> Result<Value> {
    let table = ds.table_at_index(table)?;
    Ok(table
        .columns()
        .by_id(column)
        .map(|c| c.default().clone())
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataColumn, DataType};
    use crate::storage::DataTable;

    fn data_set(rule: Rule) -> DataSet {
        let mut ds = DataSet::new("ds");
        let mut parent = DataTable::new("parent");
        parent.add_column(DataColumn::new("id", DataType::Int32)).unwrap();
        parent.set_primary_key(&["id"]).unwrap();
        let mut child = DataTable::new("child");
        child.add_column(DataColumn::new("id", DataType::Int32)).unwrap();
        child
            .add_column(DataColumn::new("parent_id", DataType::Int32).default_value(0))
            .unwrap();
        ds.add_table(parent).unwrap();
        ds.add_table(child).unwrap();
        let fk = ForeignKeyConstraint::new(
            "fk",
            ds.table("parent").unwrap(),
            &["id"],
            ds.table("child").unwrap(),
            &["parent_id"],
        )
        .unwrap()
        .with_delete_rule(rule)
        .with_update_rule(rule);
        ds.add_foreign_key(fk).unwrap();
        ds.add_values("parent", vec![Value::Int32(1)]).unwrap();
        ds.add_values("child", vec![Value::Int32(10), Value::Int32(1)]).unwrap();
        ds.add_values("child", vec![Value::Int32(11), Value::Int32(1)]).unwrap();
        ds
    }

    #[test]
    fn test_delete_plan_collects_children() {
        let ds = data_set(Rule::Cascade);
        let row = ds.table("parent").unwrap().row_at(0).unwrap();
        let plan = CascadePlan::for_delete(&ds, 0, row, vec![Value::Int32(1)]).unwrap();
        assert_eq!(plan.deletes.len(), 3);
        assert!(!plan.is_trivial());
        plan.validate(&ds).unwrap();
    }

    #[test]
    fn test_delete_plan_rule_none() {
        let ds = data_set(Rule::None);
        let row = ds.table("parent").unwrap().row_at(0).unwrap();
        let err = CascadePlan::for_delete(&ds, 0, row, vec![Value::Int32(1)]).unwrap_err();
        assert!(matches!(err, Error::InvalidConstraint(_)));
    }

    #[test]
    fn test_update_plan_set_default_needs_parent() {
        let ds = data_set(Rule::SetDefault);
        let row = ds.table("parent").unwrap().row_at(0).unwrap();
        let (old, new) = (vec![Value::Int32(1)], vec![Value::Int32(2)]);
        let plan = CascadePlan::for_update(&ds, 0, row, old, new).unwrap();
        assert_eq!(plan.updates.len(), 3);
        // children would point at parent 0, which does not exist
        assert!(matches!(plan.validate(&ds), Err(Error::Constraint(_))));
    }

    #[test]
    fn test_unchanged_key_plans_nothing() {
        let ds = data_set(Rule::Cascade);
        let row = ds.table("parent").unwrap().row_at(0).unwrap();
        let (old, new) = (vec![Value::Int32(1)], vec![Value::Int32(1)]);
        let plan = CascadePlan::for_update(&ds, 0, row, old, new).unwrap();
        assert!(plan.is_trivial());
    }
}
