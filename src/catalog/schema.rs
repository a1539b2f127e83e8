//! Column definitions for arcset
//!
//! This module defines column metadata and the per-table column collection.

use serde::{Deserialize, Serialize};

use super::collection::{Named, NamedCollection};
use super::types::DataType;
use crate::error::{Error, Result};
use crate::storage::Value;

/// Stable identifier of a column within its table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId(pub(crate) u32);

/// Column definition in a table
#[derive(Debug, Clone)]
pub struct DataColumn {
    pub(crate) id: ColumnId,
    pub(crate) name: String,
    pub(crate) caption: Option<String>,
    pub(crate) data_type: DataType,
    pub(crate) ordinal: usize,
    pub(crate) allow_null: bool,
    pub(crate) unique: bool,
    pub(crate) read_only: bool,
    pub(crate) auto_increment: bool,
    pub(crate) auto_increment_seed: i64,
    pub(crate) auto_increment_step: i64,
    /// Next value the sequence hands out
    pub(crate) auto_increment_current: i64,
    pub(crate) default_value: Value,
    pub(crate) expression: Option<String>,
    pub(crate) max_length: i32,
}

impl DataColumn {
    /// Create a new, nullable column
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: ColumnId(0),
            name: name.into(),
            caption: None,
            data_type,
            ordinal: 0,
            allow_null: true,
            unique: false,
            read_only: false,
            auto_increment: false,
            auto_increment_seed: 0,
            auto_increment_step: 1,
            auto_increment_current: 0,
            default_value: Value::Null,
            expression: None,
            max_length: -1,
        }
    }

    /// Set the nullable flag
    pub fn allow_null(mut self, allow: bool) -> Self {
        self.allow_null = allow;
        self
    }

    /// Request a single-column unique constraint when the column is added
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Set the read-only flag
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Turn on auto-increment with the given seed and step
    pub fn auto_increment(mut self, seed: i64, step: i64) -> Self {
        self.auto_increment = true;
        self.auto_increment_seed = seed;
        self.auto_increment_step = step;
        self.auto_increment_current = seed;
        self
    }

    /// Set the value used when a null is supplied
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = value.into();
        self
    }

    /// Make this a computed column
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// Limit the length of string values (-1 means unlimited)
    pub fn max_length(mut self, max_length: i32) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set the caption
    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Column id, meaningful once the column belongs to a table
    pub fn id(&self) -> ColumnId {
        self.id
    }

    /// Column name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Caption, defaulting to the name
    pub fn caption_text(&self) -> &str {
        self.caption.as_deref().unwrap_or(&self.name)
    }

    /// Data type
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Position inside the table
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn allows_null(&self) -> bool {
        self.allow_null
    }

    /// True when a single-column unique constraint covers this column
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only || self.expression.is_some()
    }

    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    pub fn auto_increment_seed(&self) -> i64 {
        self.auto_increment_seed
    }

    pub fn auto_increment_step(&self) -> i64 {
        self.auto_increment_step
    }

    pub fn default(&self) -> &Value {
        &self.default_value
    }

    pub fn expression_text(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    pub fn max_len(&self) -> i32 {
        self.max_length
    }

    /// Check the column's own properties for consistency
    pub(crate) fn validate(&mut self) -> Result<()> {
        if self.auto_increment && self.expression.is_some() {
            return Err(Error::argument(format!(
                "cannot create an expression on column '{}' that has AutoIncrement set",
                self.name
            )));
        }
        if self.auto_increment {
            self.check_auto_increment()?;
        }
        if !self.default_value.is_null() {
            self.default_value = self.data_type.coerce(self.default_value.clone())?;
        }
        Ok(())
    }

    pub(crate) fn check_auto_increment(&self) -> Result<()> {
        if !self.data_type.supports_auto_increment() {
            return Err(Error::argument(format!(
                "AutoIncrement is not supported on column '{}' of type {}",
                self.name, self.data_type
            )));
        }
        if self.auto_increment_step == 0 {
            return Err(Error::argument("AutoIncrementStep must be a non-zero value"));
        }
        Ok(())
    }

    /// Hand out the next sequence value and advance the counter
    ///
    /// Fails with `Argument` once the counter leaves the column type's range;
    /// the counter then stays where it is.
    pub(crate) fn next_auto_value(&mut self) -> Result<Value> {
        let exhausted = || {
            Error::argument(format!(
                "AutoIncrement column '{}' has run out of {} values",
                self.name, self.data_type
            ))
        };
        let value = self
            .data_type
            .sequence_value(self.auto_increment_current)
            .ok_or_else(exhausted)?;
        self.auto_increment_current = self
            .auto_increment_current
            .checked_add(self.auto_increment_step)
            .ok_or_else(exhausted)?;
        Ok(value)
    }

    /// Coerce and length-check a value bound for this column
    pub(crate) fn convert(&self, value: Value) -> Result<Value> {
        let value = self.data_type.coerce(value)?;
        if let (Value::String(s), true) = (&value, self.max_length >= 0) {
            if s.chars().count() > self.max_length as usize {
                return Err(Error::argument(format!(
                    "cannot set column '{}'. The value violates the MaxLength limit of this column",
                    self.name
                )));
            }
        }
        Ok(value)
    }
}

impl Named for DataColumn {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

/// Ordered collection of a table's columns
#[derive(Debug, Clone)]
pub struct ColumnCollection {
    columns: NamedCollection<DataColumn>,
    next_id: u32,
}

impl ColumnCollection {
    /// Create an empty column collection
    pub fn new() -> Self {
        Self {
            columns: NamedCollection::new("column"),
            next_id: 1,
        }
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate columns in ordinal order
    pub fn iter(&self) -> impl Iterator<Item = &DataColumn> {
        self.columns.iter()
    }

    /// Get a column by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&DataColumn> {
        self.columns.get(name)
    }

    /// Get a column by ordinal
    pub fn at(&self, ordinal: isize) -> Result<&DataColumn> {
        self.columns.at(ordinal)
    }

    /// Check if a column with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    /// Ordinal of the column called `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.index_of(name)
    }

    /// Get a column by id
    pub fn by_id(&self, id: ColumnId) -> Option<&DataColumn> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Ordinal of the column with this id
    pub fn ordinal_of(&self, id: ColumnId) -> Option<usize> {
        self.by_id(id).map(|c| c.ordinal)
    }

    /// Column names in ordinal order
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub(crate) fn next_default_name(&self) -> String {
        self.columns.next_default_name("Column")
    }

    pub(crate) fn at_mut(&mut self, ordinal: usize) -> Option<&mut DataColumn> {
        self.columns.at_mut(ordinal)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut DataColumn> {
        self.columns.iter_mut()
    }

    /// Append a column, assigning its id and ordinal
    pub(crate) fn push(&mut self, mut column: DataColumn) -> Result<usize> {
        column.id = ColumnId(self.next_id);
        column.ordinal = self.columns.len();
        let ordinal = self.columns.insert(column)?;
        self.next_id += 1;
        Ok(ordinal)
    }

    /// Remove a column by ordinal and renumber the rest
    pub(crate) fn remove_at(&mut self, ordinal: usize) -> Option<DataColumn> {
        let name = self.columns.at(ordinal as isize).ok()?.name.clone();
        let removed = self.columns.remove(&name);
        for (i, column) in self.columns.iter_mut().enumerate() {
            column.ordinal = i;
        }
        removed
    }

    pub(crate) fn rename_at(&mut self, ordinal: usize, name: &str) -> Result<()> {
        self.columns.rename_at(ordinal, name)
    }

    /// Resolve a list of column ids to ordinals
    pub(crate) fn ordinals(&self, ids: &[ColumnId]) -> Vec<usize> {
        ids.iter()
            .filter_map(|id| self.ordinal_of(*id))
            .collect()
    }

    /// Resolve a list of column ids to names
    pub fn names_of(&self, ids: &[ColumnId]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.by_id(*id).map(|c| c.name.clone()))
            .collect()
    }
}

impl Default for ColumnCollection {
    fn default() -> Self {
        Self::new()
    }
}

/// Anything that can address a column of a table: a name, an ordinal or an id
pub trait ColumnKey {
    /// Resolve to the column's ordinal within `columns`
    fn resolve(&self, columns: &ColumnCollection, table: &str) -> Result<usize>;
}

impl ColumnKey for &str {
    fn resolve(&self, columns: &ColumnCollection, table: &str) -> Result<usize> {
        if self.is_empty() {
            return Err(Error::ArgumentNull("columnName".to_string()));
        }
        columns
            .index_of(self)
            .ok_or_else(|| Error::ColumnNotFound(self.to_string(), table.to_string()))
    }
}

impl ColumnKey for String {
    fn resolve(&self, columns: &ColumnCollection, table: &str) -> Result<usize> {
        self.as_str().resolve(columns, table)
    }
}

impl ColumnKey for &String {
    fn resolve(&self, columns: &ColumnCollection, table: &str) -> Result<usize> {
        self.as_str().resolve(columns, table)
    }
}

impl ColumnKey for usize {
    fn resolve(&self, columns: &ColumnCollection, _table: &str) -> Result<usize> {
        if *self < columns.len() {
            Ok(*self)
        } else {
            Err(Error::IndexOutOfRange(*self as isize))
        }
    }
}

impl ColumnKey for ColumnId {
    fn resolve(&self, columns: &ColumnCollection, table: &str) -> Result<usize> {
        columns
            .ordinal_of(*self)
            .ok_or_else(|| Error::ColumnNotFound(format!("#{}", self.0), table.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_collection() {
        let mut columns = ColumnCollection::new();
        columns.push(DataColumn::new("id", DataType::Int32)).unwrap();
        columns.push(DataColumn::new("name", DataType::String)).unwrap();

        assert_eq!(columns.len(), 2);
        assert_eq!(columns.index_of("NAME"), Some(1));
        assert!(columns.push(DataColumn::new("Id", DataType::Int64)).is_err());

        let id = columns.get("id").unwrap().id();
        columns.remove_at(0);
        assert_eq!(columns.get("name").unwrap().ordinal(), 0);
        assert!(columns.by_id(id).is_none());
    }

    #[test]
    fn test_column_key_resolution() {
        let mut columns = ColumnCollection::new();
        columns.push(DataColumn::new("a", DataType::Int32)).unwrap();

        assert_eq!("A".resolve(&columns, "t").unwrap(), 0);
        assert_eq!(0usize.resolve(&columns, "t").unwrap(), 0);
        assert!(matches!(
            "b".resolve(&columns, "t"),
            Err(Error::ColumnNotFound(_, _))
        ));
        assert_eq!(3usize.resolve(&columns, "t"), Err(Error::IndexOutOfRange(3)));
    }

    #[test]
    fn test_column_validation() {
        let mut col = DataColumn::new("c", DataType::Int32)
            .auto_increment(1, 1)
            .expression("a + b");
        assert!(col.validate().is_err());

        let mut col = DataColumn::new("c", DataType::String).auto_increment(0, 1);
        assert!(col.validate().is_err());

        let mut col = DataColumn::new("c", DataType::Int32).auto_increment(1, 0);
        assert!(col.validate().is_err());

        let mut col = DataColumn::new("c", DataType::Int32).default_value("7");
        col.validate().unwrap();
        assert_eq!(col.default(), &Value::Int32(7));
    }

    #[test]
    fn test_auto_increment_sequence() {
        let mut col = DataColumn::new("c", DataType::Int32).auto_increment(10, 5);
        assert_eq!(col.next_auto_value().unwrap(), Value::Int32(10));
        assert_eq!(col.next_auto_value().unwrap(), Value::Int32(15));
        assert_eq!(col.next_auto_value().unwrap(), Value::Int32(20));
    }

    #[test]
    fn test_auto_increment_stops_at_type_range() {
        let mut col = DataColumn::new("c", DataType::Int32).auto_increment(i64::from(i32::MAX), 1);
        assert_eq!(col.next_auto_value().unwrap(), Value::Int32(i32::MAX));
        let err = col.next_auto_value().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Argument);
        assert!(col.next_auto_value().is_err());

        let mut col = DataColumn::new("c", DataType::Int64).auto_increment(i64::MAX, 1);
        assert!(col.next_auto_value().is_err());
    }
}
