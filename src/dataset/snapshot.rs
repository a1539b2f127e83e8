//! Schema snapshots
//!
//! A plain, serializable picture of a data set's schema: tables with their
//! columns and constraints, and the relations between them. Column and table
//! references are by name so the snapshot stands on its own.

use serde::{Deserialize, Serialize};

use super::dataset::DataSet;
use crate::catalog::{AcceptRejectRule, Constraint, DataType, Rule};
use crate::error::{Error, Result};
use crate::storage::{DataTable, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub name: String,
    pub namespace: String,
    pub case_sensitive: bool,
    pub enforce_constraints: bool,
    pub tables: Vec<TableSnapshot>,
    pub relations: Vec<RelationSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub name: String,
    pub namespace: String,
    pub case_sensitive: bool,
    pub columns: Vec<ColumnSnapshot>,
    pub primary_key: Vec<String>,
    pub constraints: Vec<ConstraintSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    pub name: String,
    pub caption: String,
    pub data_type: DataType,
    pub allow_null: bool,
    pub unique: bool,
    pub read_only: bool,
    pub auto_increment: bool,
    pub auto_increment_seed: i64,
    pub auto_increment_step: i64,
    pub default_value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    pub max_length: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ConstraintSnapshot {
    Unique {
        name: String,
        columns: Vec<String>,
        primary_key: bool,
    },
    ForeignKey {
        name: String,
        columns: Vec<String>,
        related_table: String,
        related_columns: Vec<String>,
        delete_rule: Rule,
        update_rule: Rule,
        accept_reject_rule: AcceptRejectRule,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationSnapshot {
    pub name: String,
    pub parent_table: String,
    pub parent_columns: Vec<String>,
    pub child_table: String,
    pub child_columns: Vec<String>,
    pub nested: bool,
    pub constrained: bool,
}

impl SchemaSnapshot {
    /// Render the snapshot as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl DataSet {
    /// Capture the current schema
    pub fn schema_snapshot(&self) -> Result<SchemaSnapshot> {
        let mut tables = Vec::with_capacity(self.table_count());
        for table in self.tables() {
            tables.push(self.table_snapshot(table)?);
        }
        let mut relations = Vec::with_capacity(self.relations().len());
        for relation in self.relations().iter() {
            let parent = self.table_by_id(relation.parent_table())?;
            let child = self.table_by_id(relation.child_table())?;
            relations.push(RelationSnapshot {
                name: relation.name().to_string(),
                parent_table: parent.table_name().to_string(),
                parent_columns: parent.columns().names_of(relation.parent_columns()),
                child_table: child.table_name().to_string(),
                child_columns: child.columns().names_of(relation.child_columns()),
                nested: relation.nested(),
                constrained: relation.is_constrained(),
            });
        }
        Ok(SchemaSnapshot {
            name: self.name().to_string(),
            namespace: self.namespace().to_string(),
            case_sensitive: self.case_sensitive(),
            enforce_constraints: self.enforce_constraints(),
            tables,
            relations,
        })
    }

    fn table_snapshot(&self, table: &DataTable) -> Result<TableSnapshot> {
        let columns = table
            .columns()
            .iter()
            .map(|c| ColumnSnapshot {
                name: c.name().to_string(),
                caption: c.caption_text().to_string(),
                data_type: c.data_type(),
                allow_null: c.allows_null(),
                unique: c.is_unique(),
                read_only: c.is_read_only(),
                auto_increment: c.is_auto_increment(),
                auto_increment_seed: c.auto_increment_seed(),
                auto_increment_step: c.auto_increment_step(),
                default_value: c.default().clone(),
                expression: c.expression_text().map(str::to_string),
                max_length: c.max_len(),
            })
            .collect();

        let mut constraints = Vec::with_capacity(table.constraints().len());
        for constraint in table.constraints().iter() {
            constraints.push(match constraint {
                Constraint::Unique(uc) => ConstraintSnapshot::Unique {
                    name: uc.name().to_string(),
                    columns: table.columns().names_of(uc.columns()),
                    primary_key: uc.is_primary_key(),
                },
                Constraint::ForeignKey(fk) => {
                    let parent = self.table_by_id(fk.related_table())?;
                    ConstraintSnapshot::ForeignKey {
                        name: fk.name().to_string(),
                        columns: table.columns().names_of(fk.columns()),
                        related_table: parent.table_name().to_string(),
                        related_columns: parent.columns().names_of(fk.related_columns()),
                        delete_rule: fk.delete_rule(),
                        update_rule: fk.update_rule(),
                        accept_reject_rule: fk.accept_reject_rule(),
                    }
                }
            });
        }

        Ok(TableSnapshot {
            name: table.table_name().to_string(),
            namespace: table.namespace().to_string(),
            case_sensitive: table.case_sensitive(),
            columns,
            primary_key: table.primary_key().iter().map(|c| c.name().to_string()).collect(),
            constraints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataColumn;

    #[test]
    fn test_snapshot_shape() {
        let mut ds = DataSet::new("shop");
        let mut customers = DataTable::new("customers");
        customers.add_column(DataColumn::new("id", DataType::Int32)).unwrap();
        customers.set_primary_key(&["id"]).unwrap();
        let mut orders = DataTable::new("orders");
        orders.add_column(DataColumn::new("customer", DataType::Int32)).unwrap();
        ds.add_table(customers).unwrap();
        ds.add_table(orders).unwrap();
        ds.relate("customer_orders", "customers", &["id"], "orders", &["customer"])
            .unwrap();

        let snapshot = ds.schema_snapshot().unwrap();
        assert_eq!(snapshot.tables.len(), 2);
        assert_eq!(snapshot.tables[0].primary_key, vec!["id".to_string()]);
        assert_eq!(snapshot.relations[0].child_columns, vec!["customer".to_string()]);
        match &snapshot.tables[1].constraints[0] {
            ConstraintSnapshot::ForeignKey { name, related_table, .. } => {
                assert_eq!(name, "customer_orders");
                assert_eq!(related_table, "customers");
            }
            other => panic!("unexpected constraint {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_json() {
        let mut ds = DataSet::new("shop");
        let mut table = DataTable::new("items");
        table
            .add_column(DataColumn::new("id", DataType::Int64).auto_increment(10, 5))
            .unwrap();
        ds.add_table(table).unwrap();

        let json = ds.schema_snapshot().unwrap().to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["name"], "shop");
        assert_eq!(parsed["tables"][0]["columns"][0]["auto_increment_seed"], 10);
        assert!(parsed["tables"][0]["columns"][0].get("expression").is_none());
    }
}
