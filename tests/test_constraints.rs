mod common;

use arcset::{
    DataColumn, DataSet, DataTable, DataType, Error, ErrorKind, ForeignKeyConstraint, Rule,
    UniqueConstraint, Value,
};

#[test]
fn test_unique_rejects_duplicate_insert() -> anyhow::Result<()> {
    common::init_tracing();
    let mut table = common::int_table("t", "Col1")?;
    let uc = UniqueConstraint::new(&table, "", &["Col1"])?;
    let name = table.add_constraint(uc)?;
    assert_eq!(name, "Constraint1");

    table.add_values(vec![Value::Int32(1)])?;
    let err = table.add_values(vec![Value::Int32(1)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    assert_eq!(table.row_count(), 1);
    Ok(())
}

#[test]
fn test_foreign_key_over_existing_orphans() -> anyhow::Result<()> {
    let mut ds = DataSet::new("ds");
    ds.add_table(common::int_table("ParentTable", "Col1")?)?;
    ds.add_table(common::int_table("ChildTable", "Col1")?)?;
    ds.add_values("ChildTable", vec![Value::Int32(3)])?;

    let fk = ForeignKeyConstraint::new(
        "fk",
        ds.table("ParentTable")?,
        &["Col1"],
        ds.table("ChildTable")?,
        &["Col1"],
    )?;
    let err = ds.add_foreign_key(fk).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Argument);
    assert!(ds.table("ChildTable")?.constraints().is_empty());
    assert!(ds.table("ParentTable")?.constraints().is_empty());
    Ok(())
}

#[test]
fn test_foreign_key_rejects_orphan_insert() -> anyhow::Result<()> {
    let mut ds = DataSet::new("ds");
    let mut parent = common::int_table("ParentTable", "Col1")?;
    let uc = UniqueConstraint::new(&parent, "", &["Col1"])?;
    parent.add_constraint(uc)?;
    ds.add_table(parent)?;
    ds.add_table(common::int_table("ChildTable", "Col1")?)?;

    let fk = ForeignKeyConstraint::new(
        "fk",
        ds.table("ParentTable")?,
        &["Col1"],
        ds.table("ChildTable")?,
        &["Col1"],
    )?;
    ds.add_constraint("ChildTable", fk)?;
    // the existing unique constraint is reused
    assert_eq!(ds.table("ParentTable")?.constraints().len(), 1);

    let err = ds.add_values("ChildTable", vec![Value::Int32(3)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    ds.add_values("ParentTable", vec![Value::Int32(3)])?;
    ds.add_values("ChildTable", vec![Value::Int32(3)])?;
    Ok(())
}

#[test]
fn test_constraint_name_collisions() -> anyhow::Result<()> {
    let mut table = DataTable::new("t");
    table.add_column(DataColumn::new("a", DataType::Int32))?;
    table.add_column(DataColumn::new("b", DataType::Int32))?;

    let first = UniqueConstraint::new(&table, "uq", &["a"])?;
    table.add_constraint(first.clone())?;

    // the same constraint again is an argument error, not a name clash
    assert_eq!(table.add_constraint(first).unwrap_err().kind(), ErrorKind::Argument);

    let second = UniqueConstraint::new(&table, "UQ", &["b"])?;
    assert_eq!(
        table.add_constraint(second).unwrap_err().kind(),
        ErrorKind::DuplicateName
    );

    assert!(matches!(
        UniqueConstraint::new(&table, "empty", &[]),
        Err(Error::ArgumentNull(_))
    ));
    Ok(())
}

#[test]
fn test_foreign_key_only_through_data_set() -> anyhow::Result<()> {
    let parent = common::int_table("p", "id")?;
    let mut child = common::int_table("c", "pid")?;
    let fk = ForeignKeyConstraint::new("fk", &parent, &["id"], &child, &["pid"])?;
    assert_eq!(
        child.add_constraint(fk).unwrap_err().kind(),
        ErrorKind::InvalidOperation
    );
    Ok(())
}

#[test]
fn test_remove_constraint_rules() -> anyhow::Result<()> {
    let mut ds = common::shop()?;

    // the relation's own constraints stay while it exists
    assert!(!ds.can_remove_constraint("orders", "customer_orders")?);
    assert_eq!(
        ds.remove_constraint("orders", "customer_orders").unwrap_err().kind(),
        ErrorKind::Argument
    );
    let pk = ds.table("customers")?.constraints().at(0)?.name().to_string();
    assert!(!ds.can_remove_constraint("customers", &pk)?);

    ds.remove_relation("customer_orders")?;
    assert!(ds.table("orders")?.constraints().get("customer_orders").is_none());
    assert!(ds.can_remove_constraint("customers", &pk)?);
    Ok(())
}

#[test]
fn test_set_null_and_set_default_rules() -> anyhow::Result<()> {
    let mut ds = DataSet::new("ds");
    ds.add_table(common::int_table("parent", "id")?)?;
    let mut child = DataTable::new("child");
    child.add_column(DataColumn::new("a", DataType::Int32))?;
    child.add_column(DataColumn::new("b", DataType::Int32).default_value(0))?;
    ds.add_table(child)?;
    ds.add_values("parent", vec![Value::Int32(0)])?;

    let (parent, child) = (ds.table("parent")?, ds.table("child")?);
    let fk_a = ForeignKeyConstraint::new("fk_a", parent, &["id"], child, &["a"])?
        .with_delete_rule(Rule::SetNull);
    let fk_b = ForeignKeyConstraint::new("fk_b", parent, &["id"], child, &["b"])?
        .with_update_rule(Rule::SetDefault);
    ds.add_foreign_key(fk_a)?;
    ds.add_foreign_key(fk_b)?;

    let p = ds.add_values("parent", vec![Value::Int32(5)])?;
    let c = ds.add_values("child", vec![Value::Int32(5), Value::Int32(5)])?;

    ds.set("parent", p, "id", 6)?;
    assert_eq!(ds.table("child")?.get(c, "b")?, Value::Int32(0));
    assert_eq!(ds.table("child")?.get(c, "a")?, Value::Int32(6));

    ds.delete_row("parent", p)?;
    assert_eq!(ds.table("child")?.get(c, "a")?, Value::Null);
    Ok(())
}

#[test]
fn test_cascade_keeps_unique_keys() -> anyhow::Result<()> {
    let mut ds = common::shop()?;
    let ann = ds.add_values("customers", vec![Value::Int32(1), "ann".into()])?;
    ds.add_values("customers", vec![Value::Int32(2), "bob".into()])?;

    let err = ds.set("customers", ann, "id", 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    assert_eq!(ds.table("customers")?.get(ann, "id")?, Value::Int32(1));
    Ok(())
}
