//! Row indexes
//!
//! Each table keeps one ordered multi-map per distinct column list it needs
//! to search: unique-constraint columns, foreign-key child columns and the
//! primary key. Keys hold the current values of visible rows. String parts are
//! folded to lowercase when the table compares case-insensitively. Rows with
//! a null in any key column are not indexed; null keys never match.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::row::RowId;
use super::tuple::Value;
use crate::catalog::ColumnId;

/// Composite key over one or more column values
#[derive(Debug, Clone)]
pub struct IndexKey(Vec<Value>);

impl IndexKey {
    /// Build a key from values already in key-column order
    ///
    /// Returns `None` when any part is null.
    pub fn new(parts: Vec<Value>, case_sensitive: bool) -> Option<Self> {
        if parts.iter().any(Value::is_null) {
            return None;
        }
        let parts = if case_sensitive {
            parts
        } else {
            parts
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                })
                .collect()
        };
        Some(Self(parts))
    }

    /// Build a key from the values of a row at the given ordinals
    pub fn from_row(values: &[Value], ordinals: &[usize], case_sensitive: bool) -> Option<Self> {
        Self::new(super::tuple::project(values, ordinals), case_sensitive)
    }

    pub fn parts(&self) -> &[Value] {
        &self.0
    }

    /// Compare two index keys part by part
    pub fn compare(&self, other: &IndexKey) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.compare(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

/// Ordered multi-map from key to the rows holding it
#[derive(Debug, Clone)]
pub(crate) struct RowIndex {
    pub(crate) columns: Vec<ColumnId>,
    entries: BTreeMap<IndexKey, Vec<RowId>>,
    /// Number of constraints and relations relying on this index
    pub(crate) refs: usize,
}

impl RowIndex {
    pub(crate) fn new(columns: Vec<ColumnId>) -> Self {
        Self {
            columns,
            entries: BTreeMap::new(),
            refs: 1,
        }
    }

    pub(crate) fn insert(&mut self, key: IndexKey, row: RowId) {
        let rows = self.entries.entry(key).or_default();
        if !rows.contains(&row) {
            rows.push(row);
        }
    }

    pub(crate) fn remove(&mut self, key: &IndexKey, row: RowId) {
        if let Some(rows) = self.entries.get_mut(key) {
            rows.retain(|r| *r != row);
            if rows.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// Rows holding `key`, in insertion order
    pub(crate) fn lookup(&self, key: &IndexKey) -> &[RowId] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of distinct keys
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_folding() {
        let a = IndexKey::new(vec![Value::from("Abc")], false).unwrap();
        let b = IndexKey::new(vec![Value::from("aBC")], false).unwrap();
        assert_eq!(a, b);

        let a = IndexKey::new(vec![Value::from("Abc")], true).unwrap();
        let b = IndexKey::new(vec![Value::from("aBC")], true).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_null_keys_are_not_built() {
        assert!(IndexKey::new(vec![Value::Int32(1), Value::Null], true).is_none());
        let values = vec![Value::Int32(1), Value::Null, Value::from("x")];
        assert!(IndexKey::from_row(&values, &[0, 2], true).is_some());
        assert!(IndexKey::from_row(&values, &[1], true).is_none());
    }

    #[test]
    fn test_multi_map() {
        let mut index = RowIndex::new(vec![ColumnId(1)]);
        let key = IndexKey::new(vec![Value::Int32(7)], true).unwrap();
        index.insert(key.clone(), RowId(0));
        index.insert(key.clone(), RowId(3));
        index.insert(key.clone(), RowId(3));
        assert_eq!(index.lookup(&key), &[RowId(0), RowId(3)]);

        index.remove(&key, RowId(0));
        assert_eq!(index.lookup(&key), &[RowId(3)]);
        index.remove(&key, RowId(3));
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_signed_zero_is_one_key() {
        let zero = IndexKey::new(vec![Value::Double(0.0)], true).unwrap();
        let negative = IndexKey::new(vec![Value::Double(-0.0)], true).unwrap();
        assert_eq!(zero, negative);

        let mut index = RowIndex::new(vec![ColumnId(1)]);
        index.insert(zero, RowId(0));
        assert_eq!(index.lookup(&negative), &[RowId(0)]);
        assert_eq!(Value::Double(-0.0), Value::Double(0.0));
    }
}
