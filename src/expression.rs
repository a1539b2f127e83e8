//! Computed columns
//!
//! A column with an expression is read-only and its value is produced on read
//! by the [`ExpressionEvaluator`] installed on the table. Without an evaluator
//! such columns read as null. The expression language itself belongs to the
//! evaluator; the table only stores the text.

use crate::catalog::ColumnKey;
use crate::error::Result;
use crate::storage::{DataTable, RowId, Value};

static NULL: Value = Value::Null;

/// Evaluates column expressions against a row
pub trait ExpressionEvaluator {
    /// Compute the value of `expression` for `row`
    fn evaluate(&self, expression: &str, row: &RowView<'_>) -> Result<Value>;
}

/// Read-only view of one version of a row
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    table: &'a DataTable,
    row: RowId,
    values: &'a [Value],
}

impl<'a> RowView<'a> {
    pub(crate) fn new(table: &'a DataTable, row: RowId, values: &'a [Value]) -> Self {
        Self { table, row, values }
    }

    /// The row being viewed
    pub fn row(&self) -> RowId {
        self.row
    }

    /// The table the row belongs to
    pub fn table(&self) -> &'a DataTable {
        self.table
    }

    /// Stored value of a column
    ///
    /// Computed columns are not evaluated here and read as null.
    pub fn get(&self, column: impl ColumnKey) -> Result<&'a Value> {
        let ordinal = column.resolve(self.table.columns(), self.table.table_name())?;
        Ok(self.values.get(ordinal).unwrap_or(&NULL))
    }

    /// All stored values in ordinal order
    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataColumn, DataType};
    use crate::error::{Error, ErrorKind};
    use crate::storage::RowVersion;

    /// Adds the two columns named in `"a + b"`
    struct Sum;

    impl ExpressionEvaluator for Sum {
        fn evaluate(&self, expression: &str, row: &RowView<'_>) -> Result<Value> {
            let mut total = 0;
            for name in expression.split('+').map(str::trim) {
                total += row
                    .get(name)?
                    .as_i32()
                    .ok_or_else(|| Error::Expression(format!("'{}' is not a number", name)))?;
            }
            Ok(Value::Int32(total))
        }
    }

    fn ledger() -> DataTable {
        let mut table = DataTable::new("ledger");
        table.add_column(DataColumn::new("a", DataType::Int32)).unwrap();
        table.add_column(DataColumn::new("b", DataType::Int32)).unwrap();
        table
            .add_column(DataColumn::new("total", DataType::Int32).expression("a + b"))
            .unwrap();
        table
    }

    #[test]
    fn test_computed_column_follows_version() {
        let mut table = ledger();
        let row = table.add_values(vec![Value::Int32(1), Value::Int32(2)]).unwrap();
        assert_eq!(table.get(row, "total").unwrap(), Value::Null);

        table.set_expression_evaluator(Box::new(Sum));
        assert_eq!(table.get(row, "total").unwrap(), Value::Int32(3));

        table.accept_changes().unwrap();
        table.set(row, "a", 10).unwrap();
        assert_eq!(table.get(row, "total").unwrap(), Value::Int32(12));
        assert_eq!(
            table.get_version(row, "total", RowVersion::Original).unwrap(),
            Value::Int32(3)
        );
    }

    #[test]
    fn test_computed_column_is_read_only() {
        let mut table = ledger();
        let row = table.add_values(vec![Value::Int32(1), Value::Int32(2)]).unwrap();
        let err = table.set(row, "total", 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadOnly);
    }
}
