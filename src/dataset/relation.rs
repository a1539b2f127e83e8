//! Relations
//!
//! A [`DataRelation`] pairs parent columns of one table with child columns of
//! another (or the same) table of a data set. It drives parent/child
//! navigation and, when created with constraints, is backed by a unique
//! constraint on the parent key and a foreign key on the child columns.

use crate::catalog::collection::{Named, NamedCollection};
use crate::catalog::constraint::{check_key_pairing, resolve_columns};
use crate::catalog::ColumnId;
use crate::error::{Error, Result};
use crate::storage::{DataTable, TableId};

/// Named parent/child column pairing
#[derive(Debug, Clone, PartialEq)]
pub struct DataRelation {
    pub(crate) name: String,
    pub(crate) parent_table: TableId,
    pub(crate) parent_columns: Vec<ColumnId>,
    pub(crate) child_table: TableId,
    pub(crate) child_columns: Vec<ColumnId>,
    pub(crate) nested: bool,
    /// Installed with a parent unique constraint and a child foreign key
    pub(crate) constrained: bool,
}

impl DataRelation {
    /// Pair `parent_columns` of `parent` with `child_columns` of `child`
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
        let parent_ids = resolve_columns(parent, parent_columns)?;
        let child_ids = resolve_columns(child, child_columns)?;
        check_key_pairing(parent, &parent_ids, child, &child_ids)?;
        Ok(Self {
            name: name.into(),
            parent_table: parent.id(),
            parent_columns: parent_ids,
            child_table: child.id(),
            child_columns: child_ids,
            nested: false,
            constrained: false,
        })
    }

    /// Mark the relation as nested
    pub fn with_nested(mut self, nested: bool) -> Self {
        self.nested = nested;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_table(&self) -> TableId {
        self.parent_table
    }

    pub fn parent_columns(&self) -> &[ColumnId] {
        &self.parent_columns
    }

    pub fn child_table(&self) -> TableId {
        self.child_table
    }

    pub fn child_columns(&self) -> &[ColumnId] {
        &self.child_columns
    }

    pub fn nested(&self) -> bool {
        self.nested
    }

    /// True when the relation installed key constraints
    pub fn is_constrained(&self) -> bool {
        self.constrained
    }

    /// Same child columns keyed to the same parent columns
    pub(crate) fn same_mapping(&self, other: &DataRelation) -> bool {
        self.parent_table == other.parent_table
            && self.child_table == other.child_table
            && self.parent_columns == other.parent_columns
            && self.child_columns == other.child_columns
    }

    /// True when the relation touches `table` on either side
    pub(crate) fn involves(&self, table: TableId) -> bool {
        self.parent_table == table || self.child_table == table
    }
}

impl Named for DataRelation {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

/// Ordered collection of a data set's relations
#[derive(Debug, Clone)]
pub struct RelationCollection {
    relations: NamedCollection<DataRelation>,
}

impl RelationCollection {
    pub fn new() -> Self {
        Self {
            relations: NamedCollection::new("relation"),
        }
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataRelation> {
        self.relations.iter()
    }

    /// Get a relation by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&DataRelation> {
        self.relations.get(name)
    }

    pub fn at(&self, index: isize) -> Result<&DataRelation> {
        self.relations.at(index)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.relations.contains(name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.relations.index_of(name)
    }

    pub(crate) fn next_default_name(&self) -> String {
        self.relations.next_default_name("Relation")
    }

    pub(crate) fn insert(&mut self, relation: DataRelation) -> Result<usize> {
        self.relations.insert(relation)
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<DataRelation> {
        self.relations.remove(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut DataRelation> {
        self.relations.get_mut(name)
    }
}

impl Default for RelationCollection {
    fn default() -> Self {
        Self::new()
    }
}
