//! Named collections
//!
//! Columns, constraints, tables and relations all live in ordered collections
//! with case-insensitive name lookup. [`NamedCollection`] keeps the items in an
//! `IndexMap` keyed by the folded name so that insertion order, positional
//! access and lookup by name come from one structure.

use indexmap::IndexMap;

use crate::error::{Error, Result};

/// An item addressable by name inside a [`NamedCollection`]
pub trait Named {
    /// The item's display name
    fn name(&self) -> &str;

    /// Replace the item's name
    fn set_name(&mut self, name: String);

    /// The uniqueness key, folded for case-insensitive comparison
    fn key(&self) -> String {
        fold(self.name())
    }
}

/// Fold a name for case-insensitive comparison
pub fn fold(name: &str) -> String {
    name.to_lowercase()
}

/// Ordered, case-insensitively named collection
#[derive(Debug, Clone)]
pub struct NamedCollection<T> {
    items: IndexMap<String, T>,
    kind: &'static str,
}

impl<T: Named> NamedCollection<T> {
    /// Create an empty collection; `kind` names the item type in errors
    pub fn new(kind: &'static str) -> Self {
        Self {
            items: IndexMap::new(),
            kind,
        }
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the collection is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate items in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.values_mut()
    }

    /// Position of the item called `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        if let Some(index) = self.items.get_index_of(&fold(name)) {
            return Some(index);
        }
        let folded = fold(name);
        self.items.values().position(|item| fold(item.name()) == folded)
    }

    /// Look up an item by name
    pub fn get(&self, name: &str) -> Option<&T> {
        self.index_of(name).and_then(|i| self.items.get_index(i).map(|(_, v)| v))
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        let index = self.index_of(name)?;
        self.items.get_index_mut(index).map(|(_, v)| v)
    }

    /// Check if an item called `name` exists
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Positional access; negative or past-the-end positions are out of range
    pub fn at(&self, index: isize) -> Result<&T> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.items.get_index(i))
            .map(|(_, v)| v)
            .ok_or(Error::IndexOutOfRange(index))
    }

    pub(crate) fn at_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_index_mut(index).map(|(_, v)| v)
    }

    /// First `{prefix}N` name not yet taken, counting from 1
    pub fn next_default_name(&self, prefix: &str) -> String {
        (1..)
            .map(|n| format!("{}{}", prefix, n))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| prefix.to_string())
    }

    /// Fail with `DuplicateName` if `key` is taken
    pub(crate) fn ensure_free(&self, name: &str, key: &str) -> Result<()> {
        if self.items.contains_key(key) {
            return Err(Error::DuplicateName(format!(
                "a {} named '{}' already belongs to this collection",
                self.kind, name
            )));
        }
        Ok(())
    }

    /// Append an item, returning its position
    pub(crate) fn insert(&mut self, item: T) -> Result<usize> {
        let key = item.key();
        self.ensure_free(item.name(), &key)?;
        let (index, _) = self.items.insert_full(key, item);
        Ok(index)
    }

    /// Remove an item by name, keeping the order of the rest
    pub(crate) fn remove(&mut self, name: &str) -> Option<T> {
        let index = self.index_of(name)?;
        self.items.shift_remove_index(index).map(|(_, v)| v)
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> Option<T> {
        self.items.shift_remove_index(index).map(|(_, v)| v)
    }

    /// Rename the item at `index`, rebuilding the key map
    pub(crate) fn rename_at(&mut self, index: usize, new_name: &str) -> Result<()> {
        let Some((_, item)) = self.items.get_index(index) else {
            return Err(Error::IndexOutOfRange(index as isize));
        };
        let old_name = item.name().to_string();

        let mut entries: Vec<(String, T)> = self.items.drain(..).collect();
        entries[index].1.set_name(new_name.to_string());
        let new_key = entries[index].1.key();
        let clash = entries
            .iter()
            .enumerate()
            .any(|(i, (key, _))| i != index && *key == new_key);
        if clash {
            entries[index].1.set_name(old_name);
        } else {
            entries[index].0 = new_key;
        }
        self.items = entries.into_iter().collect();

        if clash {
            return Err(Error::DuplicateName(format!(
                "a {} named '{}' already belongs to this collection",
                self.kind, new_name
            )));
        }
        Ok(())
    }
}
