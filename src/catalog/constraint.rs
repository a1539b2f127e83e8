//! Constraint definitions for arcset
//!
//! A table carries unique constraints over its own columns and foreign-key
//! constraints whose parent columns live in a related table of the same
//! data set. Constraints reference columns by [`ColumnId`] so they survive
//! column renames and removals of unrelated columns.

use serde::{Deserialize, Serialize};

use super::collection::{fold, Named, NamedCollection};
use super::schema::ColumnId;
use crate::error::{Error, Result};
use crate::storage::{DataTable, TableId};

/// Action taken on child rows when a parent row is deleted or its key changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rule {
    /// Leave children alone; the parent change fails if it would strand them
    None,
    /// Delete or re-key the children along with the parent
    #[default]
    Cascade,
    /// Write nulls into the child key columns
    SetNull,
    /// Write the child key columns' default values
    SetDefault,
}

/// Whether accepting or rejecting a parent row carries over to its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AcceptRejectRule {
    #[default]
    None,
    Cascade,
}

/// Uniqueness over one or more columns of a table
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueConstraint {
    pub(crate) name: String,
    pub(crate) table: TableId,
    pub(crate) columns: Vec<ColumnId>,
    pub(crate) is_primary_key: bool,
}

impl UniqueConstraint {
    /// Create a unique constraint over `columns` of `table`
    ///
    /// An empty `name` lets the table pick `ConstraintN` when the constraint
    /// is added.
    pub fn new(table: &DataTable, name: impl Into<String>, columns: &[&str]) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            table: table.id(),
            columns: resolve_columns(table, columns)?,
            is_primary_key: false,
        })
    }

    /// Mark the constraint as the table's primary key
    pub fn primary_key(mut self, is_primary_key: bool) -> Self {
        self.is_primary_key = is_primary_key;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn columns(&self) -> &[ColumnId] {
        &self.columns
    }

    pub fn is_primary_key(&self) -> bool {
        self.is_primary_key
    }

    /// True when both constraints cover the same set of columns
    pub fn covers_same_columns(&self, columns: &[ColumnId]) -> bool {
        same_column_set(&self.columns, columns)
    }
}

/// Referential constraint from child columns to a parent key
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyConstraint {
    pub(crate) name: String,
    pub(crate) table: TableId,
    pub(crate) columns: Vec<ColumnId>,
    pub(crate) related_table: TableId,
    pub(crate) related_columns: Vec<ColumnId>,
    pub(crate) delete_rule: Rule,
    pub(crate) update_rule: Rule,
    pub(crate) accept_reject_rule: AcceptRejectRule,
}

impl ForeignKeyConstraint {
    /// Create a foreign key from `child_columns` of `child` to
    /// `parent_columns` of `parent`
    pub fn new(
        name: impl Into<String>,
        parent: &DataTable,
        parent_columns: &[&str],
        child: &DataTable,
        child_columns: &[&str],
    ) -> Result<Self> {
        if parent_columns.len() != child_columns.len() {
            return Err(Error::argument(
                "ParentColumns and ChildColumns should be the same length",
            ));
        }
        let related_columns = resolve_columns(parent, parent_columns)?;
        let columns = resolve_columns(child, child_columns)?;
        check_key_pairing(parent, &related_columns, child, &columns)?;

        Ok(Self {
            name: name.into(),
            table: child.id(),
            columns,
            related_table: parent.id(),
            related_columns,
            delete_rule: Rule::default(),
            update_rule: Rule::default(),
            accept_reject_rule: AcceptRejectRule::default(),
        })
    }

    /// Set the rule applied when a parent row is deleted
    pub fn with_delete_rule(mut self, rule: Rule) -> Self {
        self.delete_rule = rule;
        self
    }

    /// Set the rule applied when a parent key changes
    pub fn with_update_rule(mut self, rule: Rule) -> Self {
        self.update_rule = rule;
        self
    }

    /// Set the rule applied when a parent row is accepted or rejected
    pub fn with_accept_reject_rule(mut self, rule: AcceptRejectRule) -> Self {
        self.accept_reject_rule = rule;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The child table
    pub fn table(&self) -> TableId {
        self.table
    }

    /// The child columns
    pub fn columns(&self) -> &[ColumnId] {
        &self.columns
    }

    /// The parent table
    pub fn related_table(&self) -> TableId {
        self.related_table
    }

    /// The parent columns
    pub fn related_columns(&self) -> &[ColumnId] {
        &self.related_columns
    }

    pub fn delete_rule(&self) -> Rule {
        self.delete_rule
    }

    pub fn update_rule(&self) -> Rule {
        self.update_rule
    }

    pub fn accept_reject_rule(&self) -> AcceptRejectRule {
        self.accept_reject_rule
    }
}

/// Check that parent and child key columns can be related
pub(crate) fn check_key_pairing(
    parent: &DataTable,
    parent_columns: &[ColumnId],
    child: &DataTable,
    child_columns: &[ColumnId],
) -> Result<()> {
    if parent_columns.is_empty() {
        return Err(Error::ArgumentNull("parentColumns".to_string()));
    }
    if parent_columns.len() != child_columns.len() {
        return Err(Error::argument(
            "ParentColumns and ChildColumns should be the same length",
        ));
    }
    if parent.data_set() != child.data_set() {
        return Err(Error::invalid_constraint(
            "cannot create a constraint between tables in different DataSets",
        ));
    }
    if parent.id() == child.id() && parent_columns == child_columns {
        return Err(Error::invalid_constraint(
            "cannot create a key from the same columns",
        ));
    }
    for (p, c) in parent_columns.iter().zip(child_columns) {
        let (Some(pc), Some(cc)) = (parent.columns().by_id(*p), child.columns().by_id(*c)) else {
            return Err(Error::argument("key column does not belong to its table"));
        };
        if !pc.data_type().is_comparable_with(&cc.data_type()) {
            return Err(Error::invalid_constraint(format!(
                "parent column '{}' and child column '{}' don't have type-matching columns",
                pc.name(),
                cc.name()
            )));
        }
    }
    Ok(())
}

/// Resolve column names of `table` to ids; an empty list is a missing argument
pub(crate) fn resolve_columns(table: &DataTable, names: &[&str]) -> Result<Vec<ColumnId>> {
    if names.is_empty() {
        return Err(Error::ArgumentNull("columns".to_string()));
    }
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let column = table
            .columns()
            .get(name)
            .ok_or_else(|| {
                Error::ColumnNotFound(name.to_string(), table.table_name().to_string())
            })?;
        if ids.contains(&column.id()) {
            return Err(Error::argument(format!(
                "column '{}' appears more than once in the key",
                column.name()
            )));
        }
        ids.push(column.id());
    }
    Ok(ids)
}

/// Order-insensitive column set comparison
pub(crate) fn same_column_set(a: &[ColumnId], b: &[ColumnId]) -> bool {
    a.len() == b.len() && a.iter().all(|c| b.contains(c))
}

/// A constraint installed in a table
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Unique(UniqueConstraint),
    ForeignKey(ForeignKeyConstraint),
}

impl Constraint {
    pub fn name(&self) -> &str {
        match self {
            Constraint::Unique(c) => &c.name,
            Constraint::ForeignKey(c) => &c.name,
        }
    }

    /// Columns of the owning table the constraint covers
    pub fn columns(&self) -> &[ColumnId] {
        match self {
            Constraint::Unique(c) => &c.columns,
            Constraint::ForeignKey(c) => &c.columns,
        }
    }

    pub fn as_unique(&self) -> Option<&UniqueConstraint> {
        match self {
            Constraint::Unique(c) => Some(c),
            Constraint::ForeignKey(_) => None,
        }
    }

    pub fn as_foreign_key(&self) -> Option<&ForeignKeyConstraint> {
        match self {
            Constraint::ForeignKey(c) => Some(c),
            Constraint::Unique(_) => None,
        }
    }

    /// Structural equality: same kind over the same columns
    pub fn is_equivalent(&self, other: &Constraint) -> bool {
        match (self, other) {
            (Constraint::Unique(a), Constraint::Unique(b)) => a.covers_same_columns(&b.columns),
            (Constraint::ForeignKey(a), Constraint::ForeignKey(b)) => {
                a.related_table == b.related_table
                    && a.columns == b.columns
                    && a.related_columns == b.related_columns
            }
            _ => false,
        }
    }

    pub(crate) fn set_constraint_name(&mut self, name: String) {
        match self {
            Constraint::Unique(c) => c.name = name,
            Constraint::ForeignKey(c) => c.name = name,
        }
    }
}

impl From<UniqueConstraint> for Constraint {
    fn from(c: UniqueConstraint) -> Self {
        Constraint::Unique(c)
    }
}

impl From<ForeignKeyConstraint> for Constraint {
    fn from(c: ForeignKeyConstraint) -> Self {
        Constraint::ForeignKey(c)
    }
}

impl Named for Constraint {
    fn name(&self) -> &str {
        Constraint::name(self)
    }

    fn set_name(&mut self, name: String) {
        self.set_constraint_name(name);
    }
}

/// Ordered collection of a table's constraints
#[derive(Debug, Clone)]
pub struct ConstraintCollection {
    constraints: NamedCollection<Constraint>,
}

impl ConstraintCollection {
    pub fn new() -> Self {
        Self {
            constraints: NamedCollection::new("constraint"),
        }
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    /// Get a constraint by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&Constraint> {
        self.constraints.get(name)
    }

    /// Positional access
    pub fn at(&self, index: isize) -> Result<&Constraint> {
        self.constraints.at(index)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constraints.contains(name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.constraints.index_of(name)
    }

    /// All unique constraints
    pub fn unique_constraints(&self) -> impl Iterator<Item = &UniqueConstraint> {
        self.constraints.iter().filter_map(Constraint::as_unique)
    }

    /// All foreign-key constraints
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKeyConstraint> {
        self.constraints.iter().filter_map(Constraint::as_foreign_key)
    }

    /// The primary-key constraint, if any
    pub fn primary_key(&self) -> Option<&UniqueConstraint> {
        self.unique_constraints().find(|c| c.is_primary_key)
    }

    /// The unique constraint covering exactly `columns`, if any
    pub fn find_unique(&self, columns: &[ColumnId]) -> Option<&UniqueConstraint> {
        self.unique_constraints()
            .find(|c| c.covers_same_columns(columns))
    }

    /// The first installed constraint equivalent to `constraint`
    pub fn find_equivalent(&self, constraint: &Constraint) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.is_equivalent(constraint))
    }

    pub(crate) fn next_default_name(&self) -> String {
        self.constraints.next_default_name("Constraint")
    }

    pub(crate) fn ensure_name_free(&self, name: &str) -> Result<()> {
        self.constraints.ensure_free(name, &fold(name))
    }

    pub(crate) fn insert(&mut self, constraint: Constraint) -> Result<usize> {
        self.constraints.insert(constraint)
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Constraint> {
        self.constraints.remove(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Constraint> {
        self.constraints.get_mut(name)
    }

    pub(crate) fn rename(&mut self, name: &str, new_name: &str) -> Result<()> {
        let index = self
            .constraints
            .index_of(name)
            .ok_or_else(|| Error::ConstraintNotFound(name.to_string()))?;
        self.constraints.rename_at(index, new_name)
    }
}

impl Default for ConstraintCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataColumn, DataType};

    fn table() -> DataTable {
        let mut table = DataTable::new("t");
        table.add_column(DataColumn::new("a", DataType::Int32)).unwrap();
        table.add_column(DataColumn::new("b", DataType::String)).unwrap();
        table
    }

    #[test]
    fn test_unique_constraint_columns() {
        let table = table();
        let c = UniqueConstraint::new(&table, "uq", &["b", "a"]).unwrap();
        let ids: Vec<ColumnId> = table.columns().iter().map(|c| c.id()).collect();
        assert!(c.covers_same_columns(&ids));
        assert!(matches!(
            UniqueConstraint::new(&table, "uq", &[]),
            Err(Error::ArgumentNull(_))
        ));
        assert!(matches!(
            UniqueConstraint::new(&table, "uq", &["zz"]),
            Err(Error::ColumnNotFound(_, _))
        ));
    }

    #[test]
    fn test_foreign_key_type_check() {
        let parent = table();
        let mut child = DataTable::new("c");
        child.add_column(DataColumn::new("a", DataType::String)).unwrap();

        let err = ForeignKeyConstraint::new("fk", &parent, &["a"], &child, &["a"]).unwrap_err();
        assert!(matches!(err, Error::InvalidConstraint(_)));

        let err =
            ForeignKeyConstraint::new("fk", &parent, &["a", "b"], &child, &["a"]).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn test_rule_defaults() {
        assert_eq!(Rule::default(), Rule::Cascade);
        assert_eq!(AcceptRejectRule::default(), AcceptRejectRule::None);
    }
}
