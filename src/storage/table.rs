//! Tables
//!
//! A [`DataTable`] owns its columns, constraints and rows, and keeps one index
//! per column list that constraints or relations search. This module holds the
//! schema side of the table; row operations live in `table_rows`.
//!
//! A table that takes part in a foreign key refuses row mutations made
//! directly on it: those go through the owning [`DataSet`](crate::DataSet),
//! which runs the cross-table checks and cascades.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::events::{ColumnChangeEvent, RowAction, RowChangeEvent, RowChangeListener};
use super::index::{IndexKey, RowIndex};
use super::row::{RowId, RowRecord};
use super::tuple::{any_null, Value};
use crate::catalog::collection::{fold, Named};
use crate::catalog::constraint::same_column_set;
use crate::catalog::{
    ColumnCollection, ColumnId, ColumnKey, Constraint, ConstraintCollection, DataColumn,
    UniqueConstraint,
};
use crate::dataset::DataSetId;
use crate::error::{Error, Result};
use crate::expression::ExpressionEvaluator;

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique table identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(u64);

impl TableId {
    fn next() -> Self {
        TableId(NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An in-memory table
pub struct DataTable {
    id: TableId,
    name: String,
    namespace: String,
    pub(crate) data_set: Option<DataSetId>,
    pub(crate) case_sensitive: bool,
    /// Case sensitivity was set on the table itself, not inherited
    pub(crate) case_sensitive_explicit: bool,
    pub(crate) enforce_constraints: bool,
    minimum_capacity: usize,
    pub(crate) columns: ColumnCollection,
    pub(crate) constraints: ConstraintCollection,
    /// Row arena; a `RowId` is a position in here
    pub(crate) records: Vec<RowRecord>,
    /// Rows currently in the table, in insertion order
    pub(crate) rows: Vec<RowId>,
    pub(crate) indexes: Vec<RowIndex>,
    /// Columns used by relations, with reference counts
    pub(crate) pinned: HashMap<ColumnId, usize>,
    /// Key column lists referenced by foreign keys, with reference counts
    pub(crate) referenced: Vec<(Vec<ColumnId>, usize)>,
    evaluator: Option<Box<dyn ExpressionEvaluator>>,
    listeners: Vec<Box<dyn RowChangeListener>>,
}

impl DataTable {
    /// Create an empty, standalone table
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TableId::next(),
            name: name.into(),
            namespace: String::new(),
            data_set: None,
            case_sensitive: false,
            case_sensitive_explicit: false,
            enforce_constraints: true,
            minimum_capacity: 50,
            columns: ColumnCollection::new(),
            constraints: ConstraintCollection::new(),
            records: Vec::new(),
            rows: Vec::new(),
            indexes: Vec::new(),
            pinned: HashMap::new(),
            referenced: Vec::new(),
            evaluator: None,
            listeners: Vec::new(),
        }
    }

    /// Set the namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn table_name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The data set owning this table, if any
    pub fn data_set(&self) -> Option<DataSetId> {
        self.data_set
    }

    pub fn columns(&self) -> &ColumnCollection {
        &self.columns
    }

    pub fn constraints(&self) -> &ConstraintCollection {
        &self.constraints
    }

    /// Whether string comparisons in this table are case-sensitive
    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Whether constraints are checked on mutation
    pub fn enforce_constraints(&self) -> bool {
        self.enforce_constraints
    }

    pub fn minimum_capacity(&self) -> usize {
        self.minimum_capacity
    }

    /// Reserve room for at least `capacity` rows
    pub fn set_minimum_capacity(&mut self, capacity: usize) {
        self.minimum_capacity = capacity;
        self.records
            .reserve(capacity.saturating_sub(self.records.len()));
    }

    /// Rename a standalone table
    pub fn set_table_name(&mut self, name: impl Into<String>) -> Result<()> {
        if self.data_set.is_some() {
            return Err(Error::invalid_operation(
                "rename a table that belongs to a DataSet through the DataSet",
            ));
        }
        self.name = name.into();
        Ok(())
    }

    /// Change the namespace of a standalone table
    pub fn set_namespace(&mut self, namespace: impl Into<String>) -> Result<()> {
        if self.data_set.is_some() {
            return Err(Error::invalid_operation(
                "change the namespace of a table that belongs to a DataSet through the DataSet",
            ));
        }
        self.namespace = namespace.into();
        Ok(())
    }

    pub(crate) fn rename_unchecked(&mut self, name: String) {
        self.name = name;
    }

    /// Install the evaluator used for computed columns
    pub fn set_expression_evaluator(&mut self, evaluator: Box<dyn ExpressionEvaluator>) {
        self.evaluator = Some(evaluator);
    }

    pub(crate) fn evaluator(&self) -> Option<&dyn ExpressionEvaluator> {
        self.evaluator.as_deref()
    }

    /// Register a row change listener
    pub fn add_listener(&mut self, listener: Box<dyn RowChangeListener>) {
        self.listeners.push(listener);
    }

    /// Drop every registered listener
    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    /// The primary-key columns, empty when there is no primary key
    pub fn primary_key(&self) -> Vec<&DataColumn> {
        self.constraints
            .primary_key()
            .map(|pk| {
                pk.columns
                    .iter()
                    .filter_map(|id| self.columns.by_id(*id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True when a foreign key of this or another table involves this table
    pub fn has_foreign_keys(&self) -> bool {
        self.constraints.foreign_keys().next().is_some() || !self.referenced.is_empty()
    }

    /// Row mutations of foreign-key participants must go through the data set
    pub(crate) fn ensure_local_mutation(&self) -> Result<()> {
        if self.has_foreign_keys() {
            return Err(Error::invalid_operation(format!(
                "table '{}' takes part in a foreign key; change it through its DataSet",
                self.name
            )));
        }
        Ok(())
    }

    // ===== Columns =====

    /// Add a column, filling existing rows with its default or sequence values
    pub fn add_column(&mut self, mut column: DataColumn) -> Result<ColumnId> {
        if column.name.is_empty() {
            column.name = self.columns.next_default_name();
        }
        column.validate()?;
        if self.columns.contains(&column.name) {
            return Err(Error::DuplicateName(format!(
                "a column named '{}' already belongs to this DataTable",
                column.name
            )));
        }

        let mut fills = Vec::with_capacity(self.records.len());
        for record in &self.records {
            let fill = if record.is_removed() || column.expression.is_some() {
                Value::Null
            } else if column.auto_increment {
                column.next_auto_value()?
            } else {
                column.default_value.clone()
            };
            if fill.is_null()
                && !column.allow_null
                && column.expression.is_none()
                && !record.is_removed()
            {
                return Err(Error::NoNullAllowed(column.name.clone()));
            }
            fills.push(fill);
        }

        let wants_unique = column.unique;
        column.unique = false;
        let name = column.name.clone();
        let ordinal = self.columns.push(column)?;
        for (record, fill) in self.records.iter_mut().zip(&fills) {
            record.push_column(fill);
        }
        let id = self
            .columns
            .at(ordinal as isize)
            .map(DataColumn::id)?;

        if wants_unique {
            let unique = UniqueConstraint {
                name: String::new(),
                table: self.id,
                columns: vec![id],
                is_primary_key: false,
            };
            if let Err(e) = self.add_unique(unique) {
                self.drop_column_at(ordinal);
                return Err(e);
            }
        }
        debug!(table = %self.name, column = %name, ordinal, "Added column");
        Ok(id)
    }

    /// Remove a column that no constraint or relation uses
    pub fn remove_column(&mut self, column: impl ColumnKey) -> Result<DataColumn> {
        let ordinal = column.resolve(&self.columns, &self.name)?;
        let col = self.columns.at(ordinal as isize)?;
        let id = col.id();
        if self.pinned.contains_key(&id) {
            return Err(Error::argument(format!(
                "cannot remove column '{}' because it is part of a relation",
                col.name()
            )));
        }
        if let Some(c) = self.constraints.iter().find(|c| c.columns().contains(&id)) {
            return Err(Error::argument(format!(
                "cannot remove column '{}' because it is part of the constraint '{}' on table '{}'",
                col.name(),
                c.name(),
                self.name
            )));
        }
        let removed = self.drop_column_at(ordinal).ok_or(Error::IndexOutOfRange(ordinal as isize))?;
        debug!(table = %self.name, column = %removed.name(), "Removed column");
        Ok(removed)
    }

    fn drop_column_at(&mut self, ordinal: usize) -> Option<DataColumn> {
        let removed = self.columns.remove_at(ordinal)?;
        for record in &mut self.records {
            record.remove_column(ordinal);
        }
        Some(removed)
    }

    /// Rename a column
    pub fn rename_column(&mut self, column: impl ColumnKey, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::argument(
                "ColumnName is required when it is part of a DataTable",
            ));
        }
        let ordinal = column.resolve(&self.columns, &self.name)?;
        self.columns.rename_at(ordinal, name)
    }

    fn column_mut(&mut self, column: impl ColumnKey) -> Result<&mut DataColumn> {
        let ordinal = column.resolve(&self.columns, &self.name)?;
        self.columns
            .at_mut(ordinal)
            .ok_or(Error::IndexOutOfRange(ordinal as isize))
    }

    fn column_ref(&self, column: impl ColumnKey) -> Result<&DataColumn> {
        let ordinal = column.resolve(&self.columns, &self.name)?;
        self.columns.at(ordinal as isize)
    }

    /// Change whether a column accepts nulls
    pub fn set_column_allow_null(&mut self, column: impl ColumnKey, allow: bool) -> Result<()> {
        let col = self.column_ref(column)?;
        let (id, ordinal) = (col.id(), col.ordinal());
        if allow {
            if self.is_primary_key_column(id) {
                return Err(Error::argument(format!(
                    "column '{}' is part of the primary key and cannot allow nulls",
                    col.name()
                )));
            }
        } else if col.expression.is_none() && self.visible_values().any(|v| v[ordinal].is_null()) {
            return Err(Error::invalid_operation(format!(
                "column '{}' has null values in it",
                col.name()
            )));
        }
        self.column_mut(ordinal)?.allow_null = allow;
        Ok(())
    }

    /// Install or remove the single-column unique constraint of a column
    pub fn set_column_unique(&mut self, column: impl ColumnKey, unique: bool) -> Result<()> {
        let col = self.column_ref(column)?;
        let id = col.id();
        if col.unique == unique {
            return Ok(());
        }
        if unique {
            let constraint = UniqueConstraint {
                name: String::new(),
                table: self.id,
                columns: vec![id],
                is_primary_key: false,
            };
            self.add_unique(constraint)?;
            return Ok(());
        }
        let unique = self
            .constraints
            .find_unique(&[id])
            .ok_or_else(|| Error::ConstraintNotFound(col.name().to_string()))?;
        if unique.is_primary_key {
            return Err(Error::argument(format!(
                "column '{}' is the primary key and must stay unique",
                col.name()
            )));
        }
        let name = unique.name.clone();
        self.remove_constraint(&name)?;
        Ok(())
    }

    pub fn set_column_read_only(&mut self, column: impl ColumnKey, read_only: bool) -> Result<()> {
        self.column_mut(column)?.read_only = read_only;
        Ok(())
    }

    /// Turn auto-increment on or off
    pub fn set_column_auto_increment(
        &mut self,
        column: impl ColumnKey,
        enabled: bool,
    ) -> Result<()> {
        let col = self.column_mut(column)?;
        if enabled {
            if col.expression.is_some() {
                return Err(Error::argument(format!(
                    "cannot set AutoIncrement on column '{}' that has an expression",
                    col.name
                )));
            }
            if !col.default_value.is_null() {
                return Err(Error::argument(format!(
                    "cannot set AutoIncrement on column '{}' that has a DefaultValue",
                    col.name
                )));
            }
            col.check_auto_increment()?;
        }
        col.auto_increment = enabled;
        Ok(())
    }

    /// Restart the sequence of an auto-increment column at `seed`
    pub fn set_column_auto_increment_seed(
        &mut self,
        column: impl ColumnKey,
        seed: i64,
    ) -> Result<()> {
        let col = self.column_mut(column)?;
        col.auto_increment_seed = seed;
        col.auto_increment_current = seed;
        Ok(())
    }

    pub fn set_column_auto_increment_step(
        &mut self,
        column: impl ColumnKey,
        step: i64,
    ) -> Result<()> {
        if step == 0 {
            return Err(Error::argument("AutoIncrementStep must be a non-zero value"));
        }
        self.column_mut(column)?.auto_increment_step = step;
        Ok(())
    }

    /// Set the value substituted for nulls
    pub fn set_column_default(
        &mut self,
        column: impl ColumnKey,
        value: impl Into<Value>,
    ) -> Result<()> {
        let col = self.column_mut(column)?;
        let value = col.data_type.coerce(value.into())?;
        if col.auto_increment && !value.is_null() {
            return Err(Error::argument(format!(
                "cannot set a DefaultValue on the AutoIncrement column '{}'",
                col.name
            )));
        }
        col.default_value = value;
        Ok(())
    }

    /// Set or clear a column's expression; stored values of the column are reset
    pub fn set_column_expression(
        &mut self,
        column: impl ColumnKey,
        expression: Option<&str>,
    ) -> Result<()> {
        let col = self.column_mut(column)?;
        if expression.is_some() && col.auto_increment {
            return Err(Error::argument(format!(
                "cannot create an expression on column '{}' that has AutoIncrement set",
                col.name
            )));
        }
        col.expression = expression.map(str::to_string);
        let ordinal = col.ordinal;
        if expression.is_some() {
            for record in &mut self.records {
                record.clear_column(ordinal);
            }
        }
        Ok(())
    }

    pub fn set_column_max_length(&mut self, column: impl ColumnKey, max_length: i32) -> Result<()> {
        self.column_mut(column)?.max_length = max_length;
        Ok(())
    }

    pub fn set_column_caption(
        &mut self,
        column: impl ColumnKey,
        caption: impl Into<String>,
    ) -> Result<()> {
        self.column_mut(column)?.caption = Some(caption.into());
        Ok(())
    }

    fn is_primary_key_column(&self, id: ColumnId) -> bool {
        self.constraints
            .primary_key()
            .is_some_and(|pk| pk.columns.contains(&id))
    }

    // ===== Constraints =====

    /// Set the primary key; an empty list clears it
    ///
    /// An existing unique constraint over the same columns is promoted,
    /// otherwise a new one is installed. Key columns stop accepting nulls.
    pub fn set_primary_key(&mut self, columns: &[&str]) -> Result<()> {
        let old = self.constraints.primary_key().map(|pk| (pk.name.clone(), pk.columns.clone()));

        if columns.is_empty() {
            if let Some((name, _)) = old {
                self.remove_constraint(&name)?;
            }
            return Ok(());
        }

        let ids = crate::catalog::constraint::resolve_columns(self, columns)?;
        if let Some((_, cols)) = &old {
            if *cols == ids {
                return Ok(());
            }
        }
        let ordinals = self.columns.ordinals(&ids);
        if self.visible_values().any(|v| any_null(v, &ordinals)) {
            return Err(Error::argument(format!(
                "column '{}' has null values in it",
                self.columns.names_of(&ids).join(", ")
            )));
        }

        if let Some((name, _)) = &old {
            if self.constraints.find_unique(&ids).map(|c| &c.name) != Some(name) {
                self.ensure_unreferenced(name)?;
            }
        }

        let existing = self.constraints.find_unique(&ids).map(|c| c.name.clone());
        let promoted = match existing {
            Some(name) => name,
            None => self.add_unique(UniqueConstraint {
                name: String::new(),
                table: self.id,
                columns: ids.clone(),
                is_primary_key: false,
            })?,
        };

        if let Some((name, _)) = old {
            if !name.eq_ignore_ascii_case(&promoted) {
                self.remove_constraint(&name)?;
            }
        }
        if let Some(Constraint::Unique(c)) = self.constraints.get_mut(&promoted) {
            c.is_primary_key = true;
        }
        for id in &ids {
            if let Some(ordinal) = self.columns.ordinal_of(*id) {
                if let Some(col) = self.columns.at_mut(ordinal) {
                    col.allow_null = false;
                }
            }
        }
        debug!(table = %self.name, constraint = %promoted, "Set primary key");
        Ok(())
    }

    /// Add a unique constraint, returning the name it was installed under
    ///
    /// Foreign keys are installed through the owning data set.
    pub fn add_constraint(&mut self, constraint: impl Into<Constraint>) -> Result<String> {
        match constraint.into() {
            Constraint::Unique(unique) => self.add_unique(unique),
            Constraint::ForeignKey(fk) => Err(Error::invalid_operation(format!(
                "foreign key '{}' must be added through the DataSet owning both tables",
                fk.name
            ))),
        }
    }

    pub(crate) fn add_unique(&mut self, mut unique: UniqueConstraint) -> Result<String> {
        if unique.table != self.id {
            return Err(Error::argument(
                "the constraint's columns do not belong to this table",
            ));
        }
        if unique.columns.is_empty() {
            return Err(Error::ArgumentNull("columns".to_string()));
        }
        if unique.columns.iter().any(|id| self.columns.by_id(*id).is_none()) {
            return Err(Error::argument(
                "the constraint references a column that is not in this table",
            ));
        }
        let candidate = Constraint::Unique(unique.clone());
        if let Some(existing) = self.constraints.find_equivalent(&candidate) {
            return Err(Error::argument(format!(
                "constraint matches constraint named '{}' already in collection",
                existing.name()
            )));
        }
        if unique.is_primary_key && self.constraints.primary_key().is_some() {
            return Err(Error::argument("this table already has a primary key"));
        }
        if unique.name.is_empty() {
            unique.name = self.constraints.next_default_name();
        }
        self.constraints.ensure_name_free(&unique.name)?;
        if self.enforce_constraints
            && self
                .find_duplicate(&unique.columns, self.case_sensitive)
                .is_some()
        {
            return Err(Error::argument(
                "These columns don't currently have unique values.",
            ));
        }

        let name = unique.name.clone();
        let columns = unique.columns.clone();
        let is_primary_key = unique.is_primary_key;
        self.constraints.insert(Constraint::Unique(unique))?;
        self.ensure_index(&columns);
        if let [single] = columns.as_slice() {
            if let Some(ordinal) = self.columns.ordinal_of(*single) {
                if let Some(col) = self.columns.at_mut(ordinal) {
                    col.unique = true;
                }
            }
        }
        if is_primary_key {
            for id in &columns {
                if let Some(ordinal) = self.columns.ordinal_of(*id) {
                    if let Some(col) = self.columns.at_mut(ordinal) {
                        col.allow_null = false;
                    }
                }
            }
        }
        debug!(table = %self.name, constraint = %name, "Added unique constraint");
        Ok(name)
    }

    /// True when `name` can be removed without breaking a dependent foreign key
    pub fn can_remove(&self, name: &str) -> bool {
        match self.constraints.get(name) {
            Some(Constraint::Unique(c)) => !self.is_key_referenced(&c.columns),
            Some(Constraint::ForeignKey(_)) => true,
            None => false,
        }
    }

    fn ensure_unreferenced(&self, name: &str) -> Result<()> {
        if !self.can_remove(name) {
            return Err(Error::argument(format!(
                "cannot remove unique constraint '{}'; remove the foreign key constraint that depends on it first",
                name
            )));
        }
        Ok(())
    }

    /// Remove a unique constraint
    ///
    /// Fails while a foreign key depends on it. Foreign keys are removed
    /// through the owning data set.
    pub fn remove_constraint(&mut self, name: &str) -> Result<Constraint> {
        match self.constraints.get(name) {
            None => Err(Error::ConstraintNotFound(name.to_string())),
            Some(Constraint::ForeignKey(fk)) => Err(Error::invalid_operation(format!(
                "foreign key '{}' must be removed through the DataSet",
                fk.name
            ))),
            Some(Constraint::Unique(_)) => {
                self.ensure_unreferenced(name)?;
                self.remove_constraint_unchecked(name)
            }
        }
    }

    pub(crate) fn remove_constraint_unchecked(&mut self, name: &str) -> Result<Constraint> {
        let removed = self
            .constraints
            .remove(name)
            .ok_or_else(|| Error::ConstraintNotFound(name.to_string()))?;
        let columns = removed.columns().to_vec();
        self.release_index(&columns);
        if let (Constraint::Unique(_), [single]) = (&removed, columns.as_slice()) {
            let still_unique = self.constraints.find_unique(&[*single]).is_some();
            if let Some(ordinal) = self.columns.ordinal_of(*single) {
                if let Some(col) = self.columns.at_mut(ordinal) {
                    col.unique = still_unique;
                }
            }
        }
        debug!(table = %self.name, constraint = %removed.name(), "Removed constraint");
        Ok(removed)
    }

    /// Rename a constraint
    pub fn rename_constraint(&mut self, name: &str, new_name: &str) -> Result<()> {
        if new_name.is_empty() {
            return Err(Error::argument(
                "ConstraintName cannot be empty while the constraint belongs to a table",
            ));
        }
        self.constraints.rename(name, new_name)
    }

    pub(crate) fn is_key_referenced(&self, columns: &[ColumnId]) -> bool {
        self.referenced
            .iter()
            .any(|(cols, _)| same_column_set(cols, columns))
    }

    pub(crate) fn add_key_reference(&mut self, columns: &[ColumnId]) {
        match self.referenced.iter_mut().find(|(cols, _)| cols == columns) {
            Some((_, count)) => *count += 1,
            None => self.referenced.push((columns.to_vec(), 1)),
        }
    }

    pub(crate) fn release_key_reference(&mut self, columns: &[ColumnId]) {
        if let Some(pos) = self.referenced.iter().position(|(cols, _)| cols == columns) {
            self.referenced[pos].1 -= 1;
            if self.referenced[pos].1 == 0 {
                self.referenced.remove(pos);
            }
        }
    }

    pub(crate) fn pin_columns(&mut self, columns: &[ColumnId]) {
        for id in columns {
            *self.pinned.entry(*id).or_insert(0) += 1;
        }
    }

    pub(crate) fn unpin_columns(&mut self, columns: &[ColumnId]) {
        for id in columns {
            if let Some(count) = self.pinned.get_mut(id) {
                *count -= 1;
                if *count == 0 {
                    self.pinned.remove(id);
                }
            }
        }
    }

    // ===== Case sensitivity =====

    /// Set case sensitivity on the table itself
    ///
    /// Unique constraints are re-checked under the new comparison first.
    pub fn set_case_sensitive(&mut self, case_sensitive: bool) -> Result<()> {
        self.ensure_local_mutation()?;
        if !self.pinned.is_empty() {
            return Err(Error::argument(format!(
                "table '{}' takes part in a relation; change CaseSensitive through its DataSet",
                self.name
            )));
        }
        self.check_unique_under(case_sensitive)?;
        self.case_sensitive_explicit = true;
        self.apply_case_sensitive(case_sensitive);
        Ok(())
    }

    /// Fail if any unique constraint would have duplicates under `case_sensitive`
    pub(crate) fn check_unique_under(&self, case_sensitive: bool) -> Result<()> {
        if !self.enforce_constraints {
            return Ok(());
        }
        for unique in self.constraints.unique_constraints() {
            if let Some(key) = self.find_duplicate(&unique.columns, case_sensitive) {
                return Err(Error::constraint(format!(
                    "column '{}' is constrained to be unique. Value '{}' is already present",
                    self.columns.names_of(&unique.columns).join(", "),
                    display_key(&key)
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn apply_case_sensitive(&mut self, case_sensitive: bool) {
        if self.case_sensitive != case_sensitive {
            self.case_sensitive = case_sensitive;
            self.rebuild_indexes();
        }
    }

    // ===== Indexes =====

    /// Take a reference on the index over `columns`, building it if needed
    pub(crate) fn ensure_index(&mut self, columns: &[ColumnId]) {
        if let Some(index) = self.indexes.iter_mut().find(|i| i.columns == columns) {
            index.refs += 1;
            return;
        }
        let mut index = RowIndex::new(columns.to_vec());
        let ordinals = self.columns.ordinals(columns);
        for &row in &self.rows {
            if let Some(values) = self.records[row.0].current() {
                if let Some(key) = IndexKey::from_row(values, &ordinals, self.case_sensitive) {
                    index.insert(key, row);
                }
            }
        }
        self.indexes.push(index);
    }

    /// Drop a reference on the index over `columns`
    pub(crate) fn release_index(&mut self, columns: &[ColumnId]) {
        if let Some(pos) = self.indexes.iter().position(|i| i.columns == columns) {
            self.indexes[pos].refs -= 1;
            if self.indexes[pos].refs == 0 {
                self.indexes.remove(pos);
            }
        }
    }

    pub(crate) fn index_insert(&mut self, row: RowId, values: &[Value]) {
        for index in &mut self.indexes {
            let ordinals = self.columns.ordinals(&index.columns);
            if let Some(key) = IndexKey::from_row(values, &ordinals, self.case_sensitive) {
                index.insert(key, row);
            }
        }
    }

    pub(crate) fn index_remove(&mut self, row: RowId, values: &[Value]) {
        for index in &mut self.indexes {
            let ordinals = self.columns.ordinals(&index.columns);
            if let Some(key) = IndexKey::from_row(values, &ordinals, self.case_sensitive) {
                index.remove(&key, row);
            }
        }
    }

    pub(crate) fn rebuild_indexes(&mut self) {
        for index in &mut self.indexes {
            index.clear();
        }
        for pos in 0..self.rows.len() {
            let row = self.rows[pos];
            if let Some(values) = self.records[row.0].current().cloned() {
                self.index_insert(row, &values);
            }
        }
    }

    /// Visible rows whose `columns` hold `key`, in insertion order
    ///
    /// `key` is given in the order of `columns`. Null keys match nothing.
    pub(crate) fn rows_with_key(&self, columns: &[ColumnId], key: &[Value]) -> Vec<RowId> {
        let Some(key) = IndexKey::new(key.to_vec(), self.case_sensitive) else {
            return Vec::new();
        };
        let mut hits = match self.indexes.iter().find(|i| i.columns == columns) {
            Some(index) => index.lookup(&key).to_vec(),
            None => {
                let ordinals = self.columns.ordinals(columns);
                self.rows
                    .iter()
                    .copied()
                    .filter(|row| {
                        self.records[row.0]
                            .current()
                            .and_then(|v| IndexKey::from_row(v, &ordinals, self.case_sensitive))
                            .is_some_and(|k| k == key)
                    })
                    .collect()
            }
        };
        hits.sort_by_key(|row| self.position_of(*row));
        hits
    }

    /// First key over `columns` held by two visible rows, comparing with `case_sensitive`
    pub(crate) fn find_duplicate(
        &self,
        columns: &[ColumnId],
        case_sensitive: bool,
    ) -> Option<IndexKey> {
        let ordinals = self.columns.ordinals(columns);
        let mut seen = BTreeSet::new();
        self.visible_values()
            .filter_map(|values| IndexKey::from_row(values, &ordinals, case_sensitive))
            .find(|key| !seen.insert(key.clone()))
    }

    /// Distinct non-null keys over `columns`, comparing with `case_sensitive`
    pub(crate) fn key_set(&self, columns: &[ColumnId], case_sensitive: bool) -> BTreeSet<IndexKey> {
        let ordinals = self.columns.ordinals(columns);
        self.visible_values()
            .filter_map(|values| IndexKey::from_row(values, &ordinals, case_sensitive))
            .collect()
    }

    /// Current values of every visible row, in table order
    pub(crate) fn visible_values(&self) -> impl Iterator<Item = &Vec<Value>> {
        self.rows
            .iter()
            .filter_map(|row| self.records[row.0].current())
    }

    pub(crate) fn position_of(&self, row: RowId) -> usize {
        self.rows.iter().position(|r| *r == row).unwrap_or(usize::MAX)
    }

    // ===== Validation =====

    /// Fail with `NoNullAllowed` for the first non-nullable column holding null
    pub(crate) fn check_not_null(&self, values: &[Value]) -> Result<()> {
        for column in self.columns.iter() {
            if !column.allow_null
                && column.expression.is_none()
                && values.get(column.ordinal).map_or(true, Value::is_null)
            {
                return Err(Error::NoNullAllowed(column.name.clone()));
            }
        }
        Ok(())
    }

    /// Fail with `Constraint` when `values` would duplicate another row's unique key
    pub(crate) fn check_unique(&self, row: RowId, values: &[Value]) -> Result<()> {
        if !self.enforce_constraints {
            return Ok(());
        }
        for unique in self.constraints.unique_constraints() {
            let ordinals = self.columns.ordinals(&unique.columns);
            if any_null(values, &ordinals) {
                continue;
            }
            let key = super::tuple::project(values, &ordinals);
            if self.rows_with_key(&unique.columns, &key).iter().any(|r| *r != row) {
                return Err(Error::constraint(format!(
                    "column '{}' is constrained to be unique. Value '{}' is already present",
                    self.columns.names_of(&unique.columns).join(", "),
                    key.iter().map(Value::to_string).collect::<Vec<_>>().join(", ")
                )));
            }
        }
        Ok(())
    }

    // ===== Notifications =====

    /// Run the changing (or deleting) hooks for `row`; an error vetoes the change
    pub(crate) fn fire_changing(&mut self, row: RowId, action: RowAction) -> Result<()> {
        if self.listeners.is_empty() {
            return Ok(());
        }
        let event = RowChangeEvent { row, action };
        let mut listeners = std::mem::take(&mut self.listeners);
        self.records[row.0].in_changing = true;
        let mut outcome = Ok(());
        for listener in listeners.iter_mut() {
            outcome = match action {
                RowAction::Delete => listener.row_deleting(self, &event),
                _ => listener.row_changing(self, &event),
            };
            if outcome.is_err() {
                break;
            }
        }
        self.records[row.0].in_changing = false;
        listeners.append(&mut self.listeners);
        self.listeners = listeners;
        outcome
    }

    pub(crate) fn fire_changed(&mut self, row: RowId, action: RowAction) {
        if self.listeners.is_empty() {
            return;
        }
        let event = RowChangeEvent { row, action };
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in listeners.iter_mut() {
            match action {
                RowAction::Delete => listener.row_deleted(self, &event),
                _ => listener.row_changed(self, &event),
            }
        }
        listeners.append(&mut self.listeners);
        self.listeners = listeners;
    }

    pub(crate) fn fire_column_changed(&mut self, row: RowId, column: ColumnId, value: Value) {
        if self.listeners.is_empty() {
            return;
        }
        let event = ColumnChangeEvent { row, column, value };
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in listeners.iter_mut() {
            listener.column_changed(self, &event);
        }
        listeners.append(&mut self.listeners);
        self.listeners = listeners;
    }

    pub(crate) fn fire_cleared(&mut self) {
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in listeners.iter_mut() {
            listener.table_cleared(self);
        }
        listeners.append(&mut self.listeners);
        self.listeners = listeners;
    }

    // ===== Copies =====

    /// A new standalone table with the same columns and unique constraints
    pub fn clone_schema(&self) -> DataTable {
        let mut table = DataTable::new(self.name.clone()).with_namespace(self.namespace.clone());
        table.case_sensitive = self.case_sensitive;
        table.case_sensitive_explicit = self.case_sensitive_explicit;
        table.minimum_capacity = self.minimum_capacity;
        table.columns = self.columns.clone();
        for unique in self.constraints.unique_constraints() {
            let mut copy = unique.clone();
            copy.table = table.id;
            if table.constraints.insert(Constraint::Unique(copy)).is_ok() {
                table.ensure_index(&unique.columns);
            }
        }
        table
    }

    /// A new standalone table with the same schema and every row, states included
    pub fn copy(&self) -> DataTable {
        let mut table = self.clone_schema();
        table.records = self.records.clone();
        for record in &mut table.records {
            record.in_changing = false;
            if record.editing {
                record.cancel_edit();
            }
        }
        table.rows = self.rows.clone();
        table.rebuild_indexes();
        table
    }
}

impl Named for DataTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn key(&self) -> String {
        if self.namespace.is_empty() {
            fold(&self.name)
        } else {
            format!("{}\u{1f}{}", fold(&self.namespace), fold(&self.name))
        }
    }
}

impl fmt::Debug for DataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataTable")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("columns", &self.columns.names())
            .field("constraints", &self.constraints.len())
            .field("rows", &self.rows.len())
            .field("case_sensitive", &self.case_sensitive)
            .finish()
    }
}

pub(crate) fn display_key(key: &IndexKey) -> String {
    key.parts()
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataType;

    fn people() -> DataTable {
        let mut table = DataTable::new("people");
        table.add_column(DataColumn::new("id", DataType::Int32)).unwrap();
        table.add_column(DataColumn::new("name", DataType::String)).unwrap();
        table
    }

    #[test]
    fn test_add_column_assigns_ordinals() {
        let mut table = people();
        let id = table.add_column(DataColumn::new("", DataType::Int32)).unwrap();

        let col = table.columns().by_id(id).unwrap();
        assert_eq!(col.name(), "Column1");
        assert_eq!(col.ordinal(), 2);
        assert!(matches!(
            table.add_column(DataColumn::new("ID", DataType::Int64)),
            Err(Error::DuplicateName(_))
        ));
    }

    #[test]
    fn test_unique_column_installs_constraint() {
        let mut table = people();
        table
            .add_column(DataColumn::new("email", DataType::String).unique(true))
            .unwrap();
        assert_eq!(table.constraints().len(), 1);
        assert!(table.columns().get("email").unwrap().is_unique());

        table.set_column_unique("email", false).unwrap();
        assert!(table.constraints().is_empty());
        assert!(!table.columns().get("email").unwrap().is_unique());
    }

    #[test]
    fn test_remove_constrained_column() {
        let mut table = people();
        table.set_primary_key(&["id"]).unwrap();
        assert!(matches!(table.remove_column("id"), Err(Error::Argument(_))));
        assert!(matches!(table.set_column_unique("id", false), Err(Error::Argument(_))));
        table.remove_column("name").unwrap();
        assert_eq!(table.columns().len(), 1);
    }

    #[test]
    fn test_primary_key_promotes_existing_unique() {
        let mut table = people();
        let uc = UniqueConstraint::new(&table, "uq_id", &["id"]).unwrap();
        table.add_constraint(uc).unwrap();
        table.set_primary_key(&["id"]).unwrap();

        assert_eq!(table.constraints().len(), 1);
        assert!(table.constraints().get("uq_id").unwrap().as_unique().unwrap().is_primary_key());
        assert!(!table.columns().get("id").unwrap().allows_null());

        table.set_primary_key(&[]).unwrap();
        assert!(table.primary_key().is_empty());
        assert!(table.constraints().is_empty());
    }

    #[test]
    fn test_equivalent_and_renamed_constraints() {
        let mut table = people();
        table
            .add_constraint(UniqueConstraint::new(&table, "a", &["id"]).unwrap())
            .unwrap();
        let again = UniqueConstraint::new(&table, "b", &["id"]).unwrap();
        assert!(matches!(table.add_constraint(again), Err(Error::Argument(_))));

        let other = UniqueConstraint::new(&table, "A", &["name"]).unwrap();
        assert!(matches!(table.add_constraint(other), Err(Error::DuplicateName(_))));

        table.rename_constraint("a", "pk").unwrap();
        assert!(table.constraints().contains("PK"));
        assert!(table.constraints().at(1).is_err());
        assert!(table.constraints().at(-1).is_err());
    }

    #[test]
    fn test_auto_increment_properties() {
        let mut table = people();
        assert!(matches!(
            table.set_column_auto_increment("name", true),
            Err(Error::Argument(_))
        ));
        assert!(matches!(
            table.set_column_auto_increment_step("id", 0),
            Err(Error::Argument(_))
        ));
        table.set_column_auto_increment("id", true).unwrap();
        assert!(matches!(
            table.set_column_default("id", 5),
            Err(Error::Argument(_))
        ));
    }
}
