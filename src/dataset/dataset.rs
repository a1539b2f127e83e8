//! The data set: table registry, constraints spanning tables, relations and
//! the data-set-wide toggles

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use super::relation::{DataRelation, RelationCollection};
use crate::catalog::collection::{fold, Named, NamedCollection};
use crate::catalog::{ColumnId, Constraint, ForeignKeyConstraint, UniqueConstraint};
use crate::config::DataSetConfig;
use crate::error::{Error, Result};
use crate::storage::table::display_key;
use crate::storage::{DataTable, IndexKey, RowId, RowState, RowVersion, TableId, Value};

static NEXT_DATA_SET_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique data set identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataSetId(u64);

impl DataSetId {
    fn next() -> Self {
        DataSetId(NEXT_DATA_SET_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Ways to name a table of a data set
pub trait TableKey {
    /// Position of the table in the data set's table collection
    fn resolve(&self, data_set: &DataSet) -> Result<usize>;
}

impl TableKey for &str {
    fn resolve(&self, data_set: &DataSet) -> Result<usize> {
        data_set
            .tables
            .index_of(self)
            .ok_or_else(|| Error::TableNotFound(self.to_string()))
    }
}

impl TableKey for String {
    fn resolve(&self, data_set: &DataSet) -> Result<usize> {
        self.as_str().resolve(data_set)
    }
}

impl TableKey for &String {
    fn resolve(&self, data_set: &DataSet) -> Result<usize> {
        self.as_str().resolve(data_set)
    }
}

impl TableKey for TableId {
    fn resolve(&self, data_set: &DataSet) -> Result<usize> {
        data_set
            .index_of_id(*self)
            .ok_or_else(|| Error::TableNotFound(format!("{:?}", self)))
    }
}

/// `(namespace, name)`
impl TableKey for (&str, &str) {
    fn resolve(&self, data_set: &DataSet) -> Result<usize> {
        let (namespace, name) = (fold(self.0), fold(self.1));
        data_set
            .tables
            .iter()
            .position(|t| fold(t.namespace()) == namespace && fold(t.table_name()) == name)
            .ok_or_else(|| Error::TableNotFound(format!("{}:{}", self.0, self.1)))
    }
}

/// A set of related tables
#[derive(Debug)]
pub struct DataSet {
    id: DataSetId,
    name: String,
    namespace: String,
    pub(crate) case_sensitive: bool,
    pub(crate) enforce_constraints: bool,
    pub(crate) tables: NamedCollection<DataTable>,
    pub(crate) relations: RelationCollection,
}

impl DataSet {
    /// Create an empty data set with default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(DataSetConfig::new().name(name))
    }

    /// Create an empty data set from a config
    pub fn with_config(config: DataSetConfig) -> Self {
        Self {
            id: DataSetId::next(),
            name: config.name,
            namespace: config.namespace,
            case_sensitive: config.case_sensitive,
            enforce_constraints: config.enforce_constraints,
            tables: NamedCollection::new("table"),
            relations: RelationCollection::new(),
        }
    }

    pub fn id(&self) -> DataSetId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.namespace = namespace.into();
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn enforce_constraints(&self) -> bool {
        self.enforce_constraints
    }

    // ===== Tables =====

    /// Take ownership of a table
    ///
    /// An unnamed table is called `TableN`. The table inherits the data
    /// set's enforcement flag and, unless set on the table itself, its case
    /// sensitivity.
    pub fn add_table(&mut self, mut table: DataTable) -> Result<TableId> {
        if table.data_set.is_some() {
            return Err(Error::argument(
                "DataTable already belongs to another DataSet.",
            ));
        }
        if table.table_name().is_empty() {
            let name = self.tables.next_default_name("Table");
            table.rename_unchecked(name);
        }
        self.tables.ensure_free(table.table_name(), &table.key())?;

        table.data_set = Some(self.id);
        table.enforce_constraints = self.enforce_constraints;
        if !table.case_sensitive_explicit {
            table.apply_case_sensitive(self.case_sensitive);
        }
        let id = table.id();
        let name = table.table_name().to_string();
        self.tables.insert(table)?;
        debug!(data_set = %self.name, table = %name, "Added table");
        Ok(id)
    }

    /// Release a table that no relation or foreign key refers to
    pub fn remove_table(&mut self, table: impl TableKey) -> Result<DataTable> {
        let index = table.resolve(self)?;
        let target = self.table_at_index(index)?;
        let id = target.id();
        if let Some(rel) = self.relations.iter().find(|r| r.involves(id)) {
            return Err(Error::argument(format!(
                "cannot remove table '{}' because relation '{}' refers to it; remove the relation first",
                target.table_name(),
                rel.name()
            )));
        }
        if let Some(fk) = self.foreign_keys_involving(id).next() {
            return Err(Error::argument(format!(
                "cannot remove table '{}' because it is referenced in ForeignKeyConstraint '{}'; remove the constraint first",
                target.table_name(),
                fk.name()
            )));
        }
        let mut removed = self
            .tables
            .remove_at(index)
            .ok_or(Error::IndexOutOfRange(index as isize))?;
        removed.data_set = None;
        removed.enforce_constraints = true;
        debug!(data_set = %self.name, table = %removed.table_name(), "Removed table");
        Ok(removed)
    }

    /// Rename a table of this data set
    pub fn rename_table(&mut self, table: impl TableKey, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::argument(
                "TableName is required when it is part of a DataSet",
            ));
        }
        let index = table.resolve(self)?;
        self.tables.rename_at(index, name)
    }

    pub fn table(&self, table: impl TableKey) -> Result<&DataTable> {
        let index = table.resolve(self)?;
        self.table_at_index(index)
    }

    /// Mutable access to a table for schema changes
    ///
    /// Row changes of tables taking part in a foreign key must still go
    /// through the data set.
    pub fn table_mut(&mut self, table: impl TableKey) -> Result<&mut DataTable> {
        let index = table.resolve(self)?;
        self.table_at_index_mut(index)
    }

    pub fn tables(&self) -> impl Iterator<Item = &DataTable> {
        self.tables.iter()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Table at a position of the table collection
    pub fn table_at(&self, index: isize) -> Result<&DataTable> {
        self.tables.at(index)
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.contains(name)
    }

    pub(crate) fn index_of_id(&self, id: TableId) -> Option<usize> {
        self.tables.iter().position(|t| t.id() == id)
    }

    pub(crate) fn table_at_index(&self, index: usize) -> Result<&DataTable> {
        self.tables.at(index as isize)
    }

    pub(crate) fn table_at_index_mut(&mut self, index: usize) -> Result<&mut DataTable> {
        self.tables
            .at_mut(index)
            .ok_or(Error::IndexOutOfRange(index as isize))
    }

    pub(crate) fn table_by_id(&self, id: TableId) -> Result<&DataTable> {
        let index = self
            .index_of_id(id)
            .ok_or_else(|| Error::TableNotFound(format!("{:?}", id)))?;
        self.table_at_index(index)
    }

    /// Foreign keys with `table` on either side
    fn foreign_keys_involving(
        &self,
        table: TableId,
    ) -> impl Iterator<Item = &ForeignKeyConstraint> {
        self.tables
            .iter()
            .flat_map(|t| t.constraints().foreign_keys())
            .filter(move |fk| fk.table == table || fk.related_table == table)
    }

    // ===== Toggles =====

    /// Turn constraint checking on or off for every table
    ///
    /// Turning it on validates every unique and foreign-key constraint first;
    /// on any violation nothing changes.
    pub fn set_enforce_constraints(&mut self, enforce: bool) -> Result<()> {
        if enforce == self.enforce_constraints {
            return Ok(());
        }
        if enforce {
            if let Err(e) = self.validate_constraints(|t| t.case_sensitive()) {
                warn!(data_set = %self.name, error = %e, "EnforceConstraints left off");
                return Err(Error::constraint(
                    "Failed to enable constraints. One or more rows contain values violating non-null, unique, or foreign-key constraints.",
                ));
            }
        }
        self.enforce_constraints = enforce;
        for table in self.tables.iter_mut() {
            table.enforce_constraints = enforce;
        }
        debug!(data_set = %self.name, enforce, "Set EnforceConstraints");
        Ok(())
    }

    /// Change string comparison for every table that did not set its own
    ///
    /// While constraints are enforced, unique and foreign-key constraints are
    /// re-checked under the new comparison first; on any violation nothing
    /// changes.
    pub fn set_case_sensitive(&mut self, case_sensitive: bool) -> Result<()> {
        if case_sensitive == self.case_sensitive {
            return Ok(());
        }
        let effective = |t: &DataTable| {
            if t.case_sensitive_explicit {
                t.case_sensitive()
            } else {
                case_sensitive
            }
        };
        if self.enforce_constraints {
            if let Err(e) = self.validate_constraints(effective) {
                warn!(data_set = %self.name, error = %e, "CaseSensitive change rolled back");
                return Err(e);
            }
        }
        self.case_sensitive = case_sensitive;
        for table in self.tables.iter_mut() {
            if !table.case_sensitive_explicit {
                table.apply_case_sensitive(case_sensitive);
            }
        }
        debug!(data_set = %self.name, case_sensitive, "Set CaseSensitive");
        Ok(())
    }

    /// Set the case sensitivity of one table of this data set
    ///
    /// Related tables must compare the same way, so the change fails with an
    /// argument error when a relation or foreign key links this table to one
    /// that compares differently.
    pub fn set_table_case_sensitive(
        &mut self,
        table: impl TableKey,
        case_sensitive: bool,
    ) -> Result<()> {
        let index = table.resolve(self)?;
        let target = self.table_at_index(index)?;
        let id = target.id();
        let mut partners: Vec<TableId> = self
            .relations
            .iter()
            .filter(|r| r.involves(id))
            .flat_map(|r| [r.parent_table(), r.child_table()])
            .collect();
        partners.extend(
            self.foreign_keys_involving(id)
                .flat_map(|fk| [fk.table, fk.related_table]),
        );
        for partner in partners.into_iter().filter(|p| *p != id) {
            if self.table_by_id(partner)?.case_sensitive() != case_sensitive {
                return Err(Error::argument(
                    "cannot change CaseSensitive: a DataRelation or Constraint would relate tables with different CaseSensitive settings",
                ));
            }
        }
        target.check_unique_under(case_sensitive)?;
        let target = self.table_at_index_mut(index)?;
        target.case_sensitive_explicit = true;
        target.apply_case_sensitive(case_sensitive);
        Ok(())
    }

    /// Check every unique and foreign-key constraint, comparing each table's
    /// strings the way `case_sensitive_of` says
    fn validate_constraints<F>(&self, case_sensitive_of: F) -> Result<()>
    where
        F: Fn(&DataTable) -> bool,
    {
        for table in self.tables.iter() {
            let cs = case_sensitive_of(table);
            for unique in table.constraints().unique_constraints() {
                if let Some(key) = table.find_duplicate(&unique.columns, cs) {
                    return Err(Error::constraint(format!(
                        "column '{}' is constrained to be unique. Value '{}' is already present",
                        table.columns().names_of(&unique.columns).join(", "),
                        display_key(&key)
                    )));
                }
            }
            for fk in table.constraints().foreign_keys() {
                let parent = self.table_by_id(fk.related_table)?;
                if let Some(key) = self.orphan_key(fk, case_sensitive_of(parent))? {
                    return Err(Error::constraint(format!(
                        "ForeignKeyConstraint {} requires the child key values ({}) to exist in the parent table.",
                        fk.name,
                        display_key(&key)
                    )));
                }
            }
        }
        Ok(())
    }

    /// First child key of `fk` without a parent row
    fn orphan_key(
        &self,
        fk: &ForeignKeyConstraint,
        case_sensitive: bool,
    ) -> Result<Option<IndexKey>> {
        let child = self.table_by_id(fk.table)?;
        let parent = self.table_by_id(fk.related_table)?;
        let parent_keys = parent.key_set(&fk.related_columns, case_sensitive);
        Ok(child
            .key_set(&fk.columns, case_sensitive)
            .into_iter()
            .find(|key| !parent_keys.contains(key)))
    }

    // ===== Constraints =====

    /// Add a unique or foreign-key constraint to a table of this data set
    pub fn add_constraint(
        &mut self,
        table: impl TableKey,
        constraint: impl Into<Constraint>,
    ) -> Result<String> {
        let index = table.resolve(self)?;
        match constraint.into() {
            Constraint::Unique(unique) => self.table_at_index_mut(index)?.add_unique(unique),
            Constraint::ForeignKey(fk) => {
                if self.table_at_index(index)?.id() != fk.table {
                    return Err(Error::argument(
                        "the foreign key's child columns do not belong to this table",
                    ));
                }
                self.add_foreign_key(fk)
            }
        }
    }

    /// Install a foreign key on its child table
    ///
    /// The parent key gets a unique constraint if it has none. With
    /// constraints enforced, existing child rows must all have a parent.
    pub fn add_foreign_key(&mut self, mut fk: ForeignKeyConstraint) -> Result<String> {
        let outside = || {
            Error::invalid_constraint(
                "cannot create a constraint between tables that do not belong to this DataSet",
            )
        };
        let child_index = self.index_of_id(fk.table).ok_or_else(outside)?;
        let parent_index = self.index_of_id(fk.related_table).ok_or_else(outside)?;
        if fk.columns.is_empty() {
            return Err(Error::ArgumentNull("columns".to_string()));
        }

        let child = self.table_at_index(child_index)?;
        let parent = self.table_at_index(parent_index)?;
        if fk.columns.iter().any(|id| child.columns().by_id(*id).is_none())
            || fk.related_columns.iter().any(|id| parent.columns().by_id(*id).is_none())
        {
            return Err(Error::argument(
                "the constraint references a column that is not in its table",
            ));
        }
        if let Some(existing) = child
            .constraints()
            .find_equivalent(&Constraint::ForeignKey(fk.clone()))
        {
            return Err(Error::argument(format!(
                "constraint matches constraint named '{}' already in collection",
                existing.name()
            )));
        }
        if parent.case_sensitive() != child.case_sensitive() {
            return Err(Error::argument(
                "cannot create a constraint between tables with different CaseSensitive settings",
            ));
        }
        if fk.name.is_empty() {
            fk.name = child.constraints().next_default_name();
        }
        child.constraints().ensure_name_free(&fk.name)?;
        if self.enforce_constraints {
            if self.orphan_key(&fk, parent.case_sensitive())?.is_some() {
                return Err(Error::argument(
                    "This constraint cannot be enabled as not all values have corresponding parent values.",
                ));
            }
        }

        let created = if parent.constraints().find_unique(&fk.related_columns).is_none() {
            let unique = UniqueConstraint {
                name: String::new(),
                table: fk.related_table,
                columns: fk.related_columns.clone(),
                is_primary_key: false,
            };
            Some(self.table_at_index_mut(parent_index)?.add_unique(unique)?)
        } else {
            None
        };

        let name = fk.name.clone();
        let columns = fk.columns.clone();
        let related_columns = fk.related_columns.clone();
        let child = self.table_at_index_mut(child_index)?;
        if let Err(e) = child.constraints.insert(Constraint::ForeignKey(fk)) {
            if let Some(unique) = created {
                self.table_at_index_mut(parent_index)?
                    .remove_constraint_unchecked(&unique)?;
            }
            return Err(e);
        }
        child.ensure_index(&columns);
        self.table_at_index_mut(parent_index)?
            .add_key_reference(&related_columns);
        debug!(data_set = %self.name, constraint = %name, "Added foreign key");
        Ok(name)
    }

    /// Remove a constraint from a table of this data set
    ///
    /// A unique constraint a foreign key depends on, and the foreign key of
    /// a constrained relation, cannot be removed.
    pub fn remove_constraint(&mut self, table: impl TableKey, name: &str) -> Result<Constraint> {
        let index = table.resolve(self)?;
        let target = self.table_at_index(index)?;
        let fk = match target.constraints().get(name) {
            None => return Err(Error::ConstraintNotFound(name.to_string())),
            Some(Constraint::Unique(_)) => {
                return self.table_at_index_mut(index)?.remove_constraint(name);
            }
            Some(Constraint::ForeignKey(fk)) => fk.clone(),
        };
        if let Some(rel) = self
            .relations
            .iter()
            .find(|r| r.is_constrained() && relation_matches(r, &fk))
        {
            return Err(Error::argument(format!(
                "cannot remove constraint '{}' because it is the ChildKeyConstraint of relation '{}'",
                fk.name,
                rel.name()
            )));
        }
        self.remove_foreign_key(index, &fk)
    }

    fn remove_foreign_key(
        &mut self,
        child_index: usize,
        fk: &ForeignKeyConstraint,
    ) -> Result<Constraint> {
        let removed = self
            .table_at_index_mut(child_index)?
            .remove_constraint_unchecked(&fk.name)?;
        if let Some(parent_index) = self.index_of_id(fk.related_table) {
            self.table_at_index_mut(parent_index)?
                .release_key_reference(&fk.related_columns);
        }
        Ok(removed)
    }

    /// True when [`remove_constraint`](Self::remove_constraint) would succeed
    pub fn can_remove_constraint(&self, table: impl TableKey, name: &str) -> Result<bool> {
        let target = self.table(table)?;
        Ok(match target.constraints().get(name) {
            None => false,
            Some(Constraint::Unique(_)) => target.can_remove(name),
            Some(Constraint::ForeignKey(fk)) => !self
                .relations
                .iter()
                .any(|r| r.is_constrained() && relation_matches(r, fk)),
        })
    }

    // ===== Relations =====

    /// Add a relation between two tables of this data set
    ///
    /// With `create_constraints`, the parent key gets a unique constraint
    /// and the child columns a foreign key named after the relation, unless
    /// equivalent ones already exist.
    pub fn add_relation(
        &mut self,
        mut relation: DataRelation,
        create_constraints: bool,
    ) -> Result<String> {
        let outside = || {
            Error::invalid_constraint(
                "cannot create a relation between tables that do not belong to this DataSet",
            )
        };
        let parent_index = self.index_of_id(relation.parent_table).ok_or_else(outside)?;
        let child_index = self.index_of_id(relation.child_table).ok_or_else(outside)?;
        if relation.name.is_empty() {
            relation.name = self.relations.next_default_name();
        }
        if self.relations.contains(&relation.name) {
            return Err(Error::DuplicateName(format!(
                "a relation named '{}' already belongs to this DataSet",
                relation.name
            )));
        }
        if self.relations.iter().any(|r| r.same_mapping(&relation)) {
            return Err(Error::invalid_constraint(
                "a relation already exists for these child columns",
            ));
        }

        let parent = self.table_at_index(parent_index)?;
        let child = self.table_at_index(child_index)?;
        if relation.parent_columns.iter().any(|id| parent.columns().by_id(*id).is_none())
            || relation.child_columns.iter().any(|id| child.columns().by_id(*id).is_none())
        {
            return Err(Error::argument(
                "the relation references a column that is no longer in its table",
            ));
        }
        if parent.case_sensitive() != child.case_sensitive() {
            return Err(Error::argument(
                "cannot create a DataRelation between tables with different CaseSensitive settings",
            ));
        }

        if create_constraints {
            let existing = child.constraints().foreign_keys().any(|fk| {
                fk.related_table == relation.parent_table
                    && fk.columns == relation.child_columns
                    && fk.related_columns == relation.parent_columns
            });
            if !existing {
                let name = if child.constraints().contains(&relation.name) {
                    String::new()
                } else {
                    relation.name.clone()
                };
                let fk = ForeignKeyConstraint {
                    name,
                    table: relation.child_table,
                    columns: relation.child_columns.clone(),
                    related_table: relation.parent_table,
                    related_columns: relation.parent_columns.clone(),
                    delete_rule: Default::default(),
                    update_rule: Default::default(),
                    accept_reject_rule: Default::default(),
                };
                self.add_foreign_key(fk)?;
            }
            relation.constrained = true;
        }

        let parent_columns = relation.parent_columns.clone();
        let child_columns = relation.child_columns.clone();
        let name = relation.name.clone();
        self.relations.insert(relation)?;
        self.table_at_index_mut(parent_index)?.pin_columns(&parent_columns);
        self.table_at_index_mut(child_index)?.pin_columns(&child_columns);
        debug!(data_set = %self.name, relation = %name, create_constraints, "Added relation");
        Ok(name)
    }

    /// Relate `parent_columns` of one table to `child_columns` of another,
    /// installing key constraints
    pub fn relate(
        &mut self,
        name: &str,
        parent: impl TableKey,
        parent_columns: &[&str],
        child: impl TableKey,
        child_columns: &[&str],
    ) -> Result<String> {
        let parent = self.table(parent)?;
        let child = self.table(child)?;
        let relation = DataRelation::new(name, parent, parent_columns, child, child_columns)?;
        self.add_relation(relation, true)
    }

    pub fn relation(&self, name: &str) -> Result<&DataRelation> {
        self.relations
            .get(name)
            .ok_or_else(|| Error::RelationNotFound(name.to_string()))
    }

    pub fn relations(&self) -> &RelationCollection {
        &self.relations
    }

    /// Set whether a relation is nested
    pub fn set_relation_nested(&mut self, name: &str, nested: bool) -> Result<()> {
        let relation = self
            .relations
            .get_mut(name)
            .ok_or_else(|| Error::RelationNotFound(name.to_string()))?;
        relation.nested = nested;
        Ok(())
    }

    /// Remove a relation and the foreign key it installed
    ///
    /// The parent key's unique constraint stays.
    pub fn remove_relation(&mut self, name: &str) -> Result<DataRelation> {
        let relation = self.relation(name)?.clone();
        let parent_index = self.index_of_id(relation.parent_table);
        let child_index = self.index_of_id(relation.child_table);

        if relation.is_constrained() {
            if let Some(child_index) = child_index {
                let fk = self
                    .table_at_index(child_index)?
                    .constraints()
                    .foreign_keys()
                    .find(|fk| relation_matches(&relation, fk))
                    .cloned();
                if let Some(fk) = fk {
                    self.remove_foreign_key(child_index, &fk)?;
                }
            }
        }
        if let Some(index) = parent_index {
            self.table_at_index_mut(index)?.unpin_columns(&relation.parent_columns);
        }
        if let Some(index) = child_index {
            self.table_at_index_mut(index)?.unpin_columns(&relation.child_columns);
        }
        let removed = self
            .relations
            .remove(name)
            .ok_or_else(|| Error::RelationNotFound(name.to_string()))?;
        debug!(data_set = %self.name, relation = %removed.name(), "Removed relation");
        Ok(removed)
    }

    /// Relations in which `table` is the child
    pub fn relations_of_child(&self, table: impl TableKey) -> Result<Vec<&DataRelation>> {
        let id = self.table(table)?.id();
        Ok(self.relations.iter().filter(|r| r.child_table == id).collect())
    }

    /// Relations in which `table` is the parent
    pub fn relations_of_parent(&self, table: impl TableKey) -> Result<Vec<&DataRelation>> {
        let id = self.table(table)?.id();
        Ok(self.relations.iter().filter(|r| r.parent_table == id).collect())
    }

    /// The unique constraint backing a relation's parent key
    pub fn parent_key_constraint(&self, relation: &str) -> Result<Option<&UniqueConstraint>> {
        let relation = self.relation(relation)?;
        if !relation.is_constrained() {
            return Ok(None);
        }
        let parent = self.table_by_id(relation.parent_table)?;
        Ok(parent.constraints().find_unique(&relation.parent_columns))
    }

    /// The foreign key a relation installed on its child table
    pub fn child_key_constraint(&self, relation: &str) -> Result<Option<&ForeignKeyConstraint>> {
        let relation = self.relation(relation)?;
        if !relation.is_constrained() {
            return Ok(None);
        }
        let child = self.table_by_id(relation.child_table)?;
        Ok(child
            .constraints()
            .foreign_keys()
            .find(|fk| relation_matches(relation, fk)))
    }

    /// Visible child rows of a parent row
    pub fn child_rows(&self, relation: &str, row: RowId) -> Result<Vec<RowId>> {
        let relation = self.relation(relation)?;
        let parent = self.table_by_id(relation.parent_table)?;
        ensure_navigable(parent, row)?;
        let key = parent.key_of(row, &relation.parent_columns, RowVersion::Default)?;
        let child = self.table_by_id(relation.child_table)?;
        Ok(child.rows_with_key(&relation.child_columns, &key))
    }

    /// Child rows matched on a chosen version of both rows
    ///
    /// With `RowVersion::Original` this reaches the children of a deleted
    /// parent row.
    pub fn child_rows_with_version(
        &self,
        relation: &str,
        row: RowId,
        version: RowVersion,
    ) -> Result<Vec<RowId>> {
        let relation = self.relation(relation)?;
        let parent = self.table_by_id(relation.parent_table)?;
        if parent.row_state(row)? == RowState::Detached {
            return Err(Error::RowNotInTable);
        }
        let key = parent.key_of(row, &relation.parent_columns, version)?;
        let child = self.table_by_id(relation.child_table)?;
        Ok(rows_matching(child, &relation.child_columns, &key, version))
    }

    /// The parent row of a child row, if any
    pub fn parent_row(&self, relation: &str, row: RowId) -> Result<Option<RowId>> {
        Ok(self.parent_rows(relation, row)?.first().copied())
    }

    /// Every parent row of a child row
    pub fn parent_rows(&self, relation: &str, row: RowId) -> Result<Vec<RowId>> {
        let relation = self.relation(relation)?;
        let child = self.table_by_id(relation.child_table)?;
        ensure_navigable(child, row)?;
        let key = child.key_of(row, &relation.child_columns, RowVersion::Default)?;
        let parent = self.table_by_id(relation.parent_table)?;
        Ok(parent.rows_with_key(&relation.parent_columns, &key))
    }

    // ===== Whole data set =====

    /// A new data set with the same tables, constraints and relations, and no rows
    pub fn clone_schema(&self) -> Result<DataSet> {
        self.duplicate(false)
    }

    /// A new data set with the same schema and every row
    pub fn copy(&self) -> Result<DataSet> {
        self.duplicate(true)
    }

    fn duplicate(&self, with_rows: bool) -> Result<DataSet> {
        let mut copy = DataSet::with_config(
            DataSetConfig::new()
                .name(self.name.clone())
                .namespace(self.namespace.clone())
                .case_sensitive(self.case_sensitive)
                .enforce_constraints(false),
        );
        let mut ids = HashMap::new();
        for table in self.tables.iter() {
            let duplicate = if with_rows { table.copy() } else { table.clone_schema() };
            ids.insert(table.id(), copy.add_table(duplicate)?);
        }
        let id_of = |old: TableId| -> Result<TableId> {
            ids.get(&old)
                .copied()
                .ok_or_else(|| Error::TableNotFound(format!("{:?}", old)))
        };
        for table in self.tables.iter() {
            for fk in table.constraints().foreign_keys() {
                let mut fk = fk.clone();
                fk.table = id_of(fk.table)?;
                fk.related_table = id_of(fk.related_table)?;
                copy.add_foreign_key(fk)?;
            }
        }
        for relation in self.relations.iter() {
            let mut relation = relation.clone();
            relation.parent_table = id_of(relation.parent_table)?;
            relation.child_table = id_of(relation.child_table)?;
            let constrained = relation.constrained;
            relation.constrained = false;
            copy.add_relation(relation, constrained)?;
        }
        copy.set_enforce_constraints(self.enforce_constraints)?;
        Ok(copy)
    }
}

/// A relation and a foreign key over the same key pairing
fn relation_matches(relation: &DataRelation, fk: &ForeignKeyConstraint) -> bool {
    fk.table == relation.child_table
        && fk.related_table == relation.parent_table
        && fk.columns == relation.child_columns
        && fk.related_columns == relation.parent_columns
}

/// Navigation starts from a row that is in its table and not deleted
fn ensure_navigable(table: &DataTable, row: RowId) -> Result<()> {
    match table.row_state(row)? {
        RowState::Detached => Err(Error::RowNotInTable),
        RowState::Deleted => Err(Error::DeletedRowInaccessible),
        _ => Ok(()),
    }
}

/// Rows of `table` whose `version` values over `columns` equal `key`,
/// deleted rows included
pub(crate) fn rows_matching(
    table: &DataTable,
    columns: &[ColumnId],
    key: &[Value],
    version: RowVersion,
) -> Vec<RowId> {
    let cs = table.case_sensitive();
    let Some(key) = IndexKey::new(key.to_vec(), cs) else {
        return Vec::new();
    };
    let ordinals = table.columns().ordinals(columns);
    table
        .rows()
        .filter(|row| {
            table
                .raw_values(*row, version)
                .ok()
                .and_then(|values| IndexKey::from_row(values, &ordinals, cs))
                .is_some_and(|k| k == key)
        })
        .collect()
}
