mod common;

use std::cell::RefCell;
use std::rc::Rc;

use arcset::{
    DataColumn, DataTable, DataType, Error, ErrorKind, RowAction, RowChangeEvent,
    RowChangeListener, RowState, RowVersion, Value,
};

fn products() -> anyhow::Result<DataTable> {
    let mut table = DataTable::new("products");
    table.add_column(DataColumn::new("id", DataType::Int32).auto_increment(1, 1))?;
    table.add_column(DataColumn::new("name", DataType::String))?;
    table.add_column(DataColumn::new("price", DataType::Double).default_value(0.0))?;
    table.set_primary_key(&["id"])?;
    Ok(table)
}

#[test]
fn test_state_machine() -> anyhow::Result<()> {
    common::init_tracing();
    let mut table = products()?;

    let row = table.new_row()?;
    assert_eq!(table.row_state(row)?, RowState::Detached);
    table.set(row, "name", "lamp")?;
    table.add_row(row)?;
    assert_eq!(table.row_state(row)?, RowState::Added);
    assert!(!table.has_version(row, RowVersion::Original)?);

    table.accept_row(row)?;
    assert_eq!(table.row_state(row)?, RowState::Unchanged);

    table.set(row, "price", 9.5)?;
    assert_eq!(table.row_state(row)?, RowState::Modified);
    assert_eq!(table.get_version(row, "price", RowVersion::Original)?, Value::Double(0.0));
    assert_eq!(table.get(row, "price")?, Value::Double(9.5));

    table.delete_row(row)?;
    assert_eq!(table.row_state(row)?, RowState::Deleted);
    table.accept_changes()?;
    assert_eq!(table.row_state(row)?, RowState::Detached);
    assert_eq!(table.row_count(), 0);
    Ok(())
}

#[test]
fn test_accept_is_idempotent() -> anyhow::Result<()> {
    let mut table = products()?;
    let row = table.add_values(vec![Value::Null, "desk".into()])?;

    table.accept_changes()?;
    let first = (table.row_state(row)?, table.item_array(row)?);
    table.accept_changes()?;
    table.accept_row(row)?;
    let second = (table.row_state(row)?, table.item_array(row)?);
    assert_eq!(first, second);
    assert_eq!(second.0, RowState::Unchanged);
    Ok(())
}

#[test]
fn test_delete_then_reject_restores_row() -> anyhow::Result<()> {
    let mut table = products()?;
    let row = table.add_values(vec![Value::Null, "chair".into(), Value::Double(40.0)])?;
    table.accept_changes()?;
    let before = table.item_array(row)?;

    table.delete_row(row)?;
    assert_eq!(table.get(row, "name").unwrap_err(), Error::DeletedRowInaccessible);
    table.reject_row(row)?;

    assert_eq!(table.row_state(row)?, RowState::Unchanged);
    assert_eq!(table.item_array(row)?, before);
    assert_eq!(table.find(&[Value::Int32(1)])?, Some(row));
    Ok(())
}

#[test]
fn test_reject_added_row_detaches_it() -> anyhow::Result<()> {
    let mut table = products()?;
    let row = table.add_values(vec![Value::Null, "shelf".into()])?;
    table.reject_changes()?;

    assert_eq!(table.row_state(row)?, RowState::Detached);
    assert_eq!(table.row_count(), 0);
    assert!(!table.contains(&[Value::Int32(1)])?);
    Ok(())
}

#[test]
fn test_proposed_version_during_edit() -> anyhow::Result<()> {
    let mut table = products()?;
    let row = table.add_values(vec![Value::Null, "rug".into()])?;
    table.accept_changes()?;

    table.begin_edit(row)?;
    table.set(row, "name", "carpet")?;
    assert!(table.has_version(row, RowVersion::Proposed)?);
    assert_eq!(table.get(row, "name")?, Value::from("carpet"));
    assert_eq!(table.get_version(row, "name", RowVersion::Current)?, Value::from("rug"));
    table.end_edit(row)?;

    assert!(!table.has_version(row, RowVersion::Proposed)?);
    assert_eq!(table.get_version(row, "name", RowVersion::Original)?, Value::from("rug"));
    assert_eq!(table.row_state(row)?, RowState::Modified);
    Ok(())
}

#[test]
fn test_type_coercion_and_mismatch() -> anyhow::Result<()> {
    let mut table = products()?;
    let row = table.add_values(vec![Value::Null, "vase".into(), "12.5".into()])?;
    assert_eq!(table.get(row, "price")?, Value::Double(12.5));

    let err = table.set(row, "price", "cheap").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Argument);
    assert_eq!(table.get(row, "price")?, Value::Double(12.5));
    Ok(())
}

struct Recorder {
    actions: Rc<RefCell<Vec<RowAction>>>,
    veto_deletes: bool,
}

impl RowChangeListener for Recorder {
    fn row_changing(
        &mut self,
        table: &mut DataTable,
        event: &RowChangeEvent,
    ) -> arcset::Result<()> {
        // edits started from inside the notification are refused
        if event.action == RowAction::Change {
            assert_eq!(table.set(event.row, "name", "x").unwrap_err(), Error::InRowChangingEvent);
        }
        Ok(())
    }

    fn row_changed(&mut self, _table: &DataTable, event: &RowChangeEvent) {
        self.actions.borrow_mut().push(event.action);
    }

    fn row_deleting(
        &mut self,
        _table: &mut DataTable,
        _event: &RowChangeEvent,
    ) -> arcset::Result<()> {
        if self.veto_deletes {
            return Err(Error::InvalidOperation("deletes are vetoed".to_string()));
        }
        Ok(())
    }
}

#[test]
fn test_notifications() -> anyhow::Result<()> {
    let mut table = products()?;
    let actions = Rc::new(RefCell::new(Vec::new()));
    table.add_listener(Box::new(Recorder {
        actions: actions.clone(),
        veto_deletes: true,
    }));

    let row = table.add_values(vec![Value::Null, "mug".into()])?;
    table.set(row, "name", "cup")?;
    table.accept_row(row)?;
    assert_eq!(
        actions.borrow().as_slice(),
        &[RowAction::Add, RowAction::Change, RowAction::Commit]
    );
    assert_eq!(table.get(row, "name")?, Value::from("cup"));

    let err = table.delete_row(row).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert_eq!(table.row_state(row)?, RowState::Unchanged);
    Ok(())
}
