//! Row records
//!
//! A row keeps up to three versions of its values (original, current and
//! proposed) in a fixed slot array, plus its [`RowState`]. The state machine
//! here is pure bookkeeping: index upkeep, constraint checks and
//! notifications happen in the owning table.

use serde::{Deserialize, Serialize};

use super::tuple::Value;
use crate::error::{Error, Result};

/// Handle of a row inside its table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub(crate) usize);

impl RowId {
    /// Position of the row in its table's row arena
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Lifecycle state of a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowState {
    /// Not part of a table: freshly created, or removed
    Detached,
    /// Unchanged since the last accept
    Unchanged,
    /// Added since the last accept
    Added,
    /// Deleted since the last accept
    Deleted,
    /// Modified since the last accept
    Modified,
}

impl RowState {
    /// True for rows whose current values take part in indexes and lookups
    pub fn is_visible(&self) -> bool {
        matches!(self, RowState::Added | RowState::Unchanged | RowState::Modified)
    }
}

/// Which version of a row's values to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowVersion {
    Original,
    Current,
    Proposed,
    /// Proposed while editing or detached, otherwise current
    Default,
}

impl RowVersion {
    fn slot(self) -> usize {
        match self {
            RowVersion::Original => 0,
            RowVersion::Current => 1,
            RowVersion::Proposed | RowVersion::Default => 2,
        }
    }

    fn label(self) -> &'static str {
        match self {
            RowVersion::Original => "Original",
            RowVersion::Current => "Current",
            RowVersion::Proposed => "Proposed",
            RowVersion::Default => "Default",
        }
    }
}

/// Storage for one row
#[derive(Debug, Clone)]
pub(crate) struct RowRecord {
    pub(crate) state: RowState,
    /// Original, current and proposed values; `None` means the version is unset
    versions: [Option<Vec<Value>>; 3],
    /// An edit was opened with `begin_edit` (explicitly or implicitly)
    pub(crate) editing: bool,
    /// A value was written during the open edit
    pub(crate) touched: bool,
    /// A row-changing notification for this row is in flight
    pub(crate) in_changing: bool,
    pub(crate) error: Option<String>,
}

impl RowRecord {
    /// A detached row holding `values` as its proposed version
    pub(crate) fn detached(values: Vec<Value>) -> Self {
        Self {
            state: RowState::Detached,
            versions: [None, None, Some(values)],
            editing: false,
            touched: false,
            in_changing: false,
            error: None,
        }
    }

    pub(crate) fn original(&self) -> Option<&Vec<Value>> {
        self.versions[0].as_ref()
    }

    pub(crate) fn current(&self) -> Option<&Vec<Value>> {
        self.versions[1].as_ref()
    }

    pub(crate) fn proposed(&self) -> Option<&Vec<Value>> {
        self.versions[2].as_ref()
    }

    pub(crate) fn proposed_mut(&mut self) -> Option<&mut Vec<Value>> {
        self.versions[2].as_mut()
    }

    pub(crate) fn set_current(&mut self, values: Option<Vec<Value>>) {
        self.versions[1] = values;
    }

    /// True once the row was removed from its table and lost all its data
    pub(crate) fn is_removed(&self) -> bool {
        self.versions.iter().all(Option::is_none)
    }

    pub(crate) fn has_version(&self, version: RowVersion) -> bool {
        match version {
            RowVersion::Default => self.versions[2].is_some() || self.versions[1].is_some(),
            v => self.versions[v.slot()].is_some(),
        }
    }

    /// Fail unless the row's data may be read or written through the edit API
    pub(crate) fn ensure_editable(&self) -> Result<()> {
        if self.in_changing {
            return Err(Error::InRowChangingEvent);
        }
        match self.state {
            RowState::Deleted => Err(Error::DeletedRowInaccessible),
            RowState::Detached if self.is_removed() => Err(Error::RowNotInTable),
            _ => Ok(()),
        }
    }

    /// Resolve `version` to a slice of values
    pub(crate) fn values(&self, version: RowVersion) -> Result<&[Value]> {
        if self.is_removed() {
            return Err(Error::RowNotInTable);
        }
        let missing = || Error::VersionNotFound(version.label().to_string());
        match version {
            RowVersion::Default => {
                if self.state == RowState::Deleted {
                    return Err(Error::DeletedRowInaccessible);
                }
                self.proposed()
                    .or(self.current())
                    .map(Vec::as_slice)
                    .ok_or_else(missing)
            }
            RowVersion::Current if self.state == RowState::Deleted => {
                Err(Error::DeletedRowInaccessible)
            }
            v => self.versions[v.slot()]
                .as_deref()
                .ok_or_else(missing),
        }
    }

    /// Values visible for in-flight writes: proposed if present, else current
    pub(crate) fn working_values(&self) -> Option<&Vec<Value>> {
        self.proposed().or(self.current())
    }

    /// Open a proposed scratch copy of the current values
    pub(crate) fn begin_edit(&mut self) -> Result<()> {
        self.ensure_editable()?;
        if self.editing || self.state == RowState::Detached {
            return Ok(());
        }
        self.versions[2] = self.versions[1].clone();
        self.editing = true;
        self.touched = false;
        Ok(())
    }

    /// Drop the proposed values of an open edit
    pub(crate) fn cancel_edit(&mut self) {
        if self.editing {
            self.versions[2] = None;
        }
        self.editing = false;
        self.touched = false;
    }

    /// Make the proposed values current, returning the values replaced
    pub(crate) fn commit_proposed(&mut self) -> Option<Vec<Value>> {
        let proposed = self.versions[2].take();
        self.editing = false;
        self.touched = false;
        match proposed {
            Some(values) => {
                let old = self.versions[1].replace(values);
                if self.state == RowState::Unchanged {
                    self.state = RowState::Modified;
                }
                old
            }
            None => None,
        }
    }

    /// Detached → Added
    pub(crate) fn attach(&mut self) {
        self.versions[1] = self.versions[2].take();
        self.editing = false;
        self.touched = false;
        self.state = RowState::Added;
    }

    /// Mark deleted, hiding the current values
    pub(crate) fn mark_deleted(&mut self) {
        self.cancel_edit();
        self.versions[1] = None;
        self.state = RowState::Deleted;
    }

    /// Forget every version; the row becomes detached and removed
    pub(crate) fn remove(&mut self) {
        self.versions = [None, None, None];
        self.editing = false;
        self.touched = false;
        self.state = RowState::Detached;
    }

    /// Accept the row: current becomes original. Deleted rows are removed.
    pub(crate) fn accept(&mut self) {
        match self.state {
            RowState::Added | RowState::Modified => {
                self.versions[0] = self.versions[1].clone();
                self.state = RowState::Unchanged;
            }
            RowState::Deleted => self.remove(),
            RowState::Unchanged | RowState::Detached => {}
        }
    }

    /// Reject the row: restore the original values. Added rows are removed.
    pub(crate) fn reject(&mut self) {
        self.cancel_edit();
        match self.state {
            RowState::Added => self.remove(),
            RowState::Modified | RowState::Deleted => {
                self.versions[1] = self.versions[0].clone();
                self.state = RowState::Unchanged;
            }
            RowState::Unchanged | RowState::Detached => {}
        }
    }

    /// Force the state of an unchanged row
    pub(crate) fn set_state(&mut self, state: RowState) -> Result<()> {
        if self.state != RowState::Unchanged {
            return Err(Error::invalid_operation(
                "SetAdded and SetModified can only be called on rows with Unchanged state",
            ));
        }
        if state == RowState::Added {
            self.versions[0] = None;
        }
        self.state = state;
        Ok(())
    }

    /// Append a value slot to every present version
    pub(crate) fn push_column(&mut self, value: &Value) {
        for values in self.versions.iter_mut().flatten() {
            values.push(value.clone());
        }
    }

    /// Reset the value slot at `ordinal` to null in every present version
    pub(crate) fn clear_column(&mut self, ordinal: usize) {
        for values in self.versions.iter_mut().flatten() {
            if let Some(value) = values.get_mut(ordinal) {
                *value = Value::Null;
            }
        }
    }

    /// Drop the value slot at `ordinal` from every present version
    pub(crate) fn remove_column(&mut self, ordinal: usize) {
        for values in self.versions.iter_mut().flatten() {
            if ordinal < values.len() {
                values.remove(ordinal);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn added(values: Vec<Value>) -> RowRecord {
        let mut record = RowRecord::detached(values);
        record.attach();
        record
    }

    #[test]
    fn test_detached_row_versions() {
        let record = RowRecord::detached(vec![Value::Int32(1)]);
        assert_eq!(record.state, RowState::Detached);
        assert!(!record.has_version(RowVersion::Original));
        assert_eq!(record.values(RowVersion::Default).unwrap(), &[Value::Int32(1)]);
        assert!(matches!(
            record.values(RowVersion::Original),
            Err(Error::VersionNotFound(_))
        ));
    }

    #[test]
    fn test_accept_and_modify() {
        let mut record = added(vec![Value::Int32(1)]);
        assert_eq!(record.state, RowState::Added);

        record.accept();
        assert_eq!(record.state, RowState::Unchanged);
        record.accept();
        assert_eq!(record.state, RowState::Unchanged);

        record.begin_edit().unwrap();
        record.proposed_mut().unwrap()[0] = Value::Int32(2);
        let old = record.commit_proposed();
        assert_eq!(old, Some(vec![Value::Int32(1)]));
        assert_eq!(record.state, RowState::Modified);
        assert_eq!(record.values(RowVersion::Original).unwrap(), &[Value::Int32(1)]);
        assert_eq!(record.values(RowVersion::Current).unwrap(), &[Value::Int32(2)]);
    }

    #[test]
    fn test_delete_and_reject() {
        let mut record = added(vec![Value::from("a")]);
        record.accept();
        record.mark_deleted();

        assert_eq!(record.state, RowState::Deleted);
        assert_eq!(record.values(RowVersion::Default), Err(Error::DeletedRowInaccessible));
        assert_eq!(record.values(RowVersion::Original).unwrap(), &[Value::from("a")]);
        assert_eq!(record.begin_edit(), Err(Error::DeletedRowInaccessible));

        record.reject();
        assert_eq!(record.state, RowState::Unchanged);
        assert_eq!(record.values(RowVersion::Current).unwrap(), &[Value::from("a")]);
    }

    #[test]
    fn test_removed_row() {
        let mut record = added(vec![Value::Int32(1)]);
        record.reject();
        assert_eq!(record.state, RowState::Detached);
        assert!(record.is_removed());
        assert_eq!(record.values(RowVersion::Default), Err(Error::RowNotInTable));
    }

    #[test]
    fn test_in_changing_guard() {
        let mut record = added(vec![Value::Int32(1)]);
        record.in_changing = true;
        assert_eq!(record.begin_edit(), Err(Error::InRowChangingEvent));
    }
}
