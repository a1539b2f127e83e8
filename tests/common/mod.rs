//! Shared fixtures for the integration tests

#![allow(dead_code)]

use arcset::{DataColumn, DataSet, DataTable, DataType, Result};

/// Route `tracing` output to the test harness, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A single-column integer table
pub fn int_table(name: &str, column: &str) -> Result<DataTable> {
    let mut table = DataTable::new(name);
    table.add_column(DataColumn::new(column, DataType::Int32))?;
    Ok(table)
}

/// `customers(id pk, name)` and `orders(id auto, customer)` joined by the
/// constrained relation `customer_orders`
pub fn shop() -> Result<DataSet> {
    let mut ds = DataSet::new("shop");

    let mut customers = DataTable::new("customers");
    customers.add_column(DataColumn::new("id", DataType::Int32))?;
    customers.add_column(DataColumn::new("name", DataType::String))?;
    customers.set_primary_key(&["id"])?;

    let mut orders = DataTable::new("orders");
    orders.add_column(DataColumn::new("id", DataType::Int32).auto_increment(1, 1))?;
    orders.add_column(DataColumn::new("customer", DataType::Int32))?;
    orders.set_primary_key(&["id"])?;

    ds.add_table(customers)?;
    ds.add_table(orders)?;
    ds.relate("customer_orders", "customers", &["id"], "orders", &["customer"])?;
    Ok(ds)
}
