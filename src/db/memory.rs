//! In-memory [`TableClient`] used by tests. Mirrors the PostgREST behaviour
//! the tools rely on: unknown columns are errors, updates return the touched
//! rows, and `items(*)` embeds child rows by `category_id`.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Query, TableClient};

struct Table {
    columns: Vec<String>,
    rows: Vec<Map<String, Value>>,
}

#[derive(Default)]
pub struct MemoryTables {
    tables: Mutex<HashMap<String, Table>>,
}

fn matches(row: &Map<String, Value>, filters: &[(String, String)]) -> bool {
    filters.iter().all(|(column, expected)| match row.get(column) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == *expected,
    })
}

impl MemoryTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, columns: &[&str], rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.tables.lock().unwrap().insert(
            name.to_string(),
            Table {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        let tables = self.tables.lock().unwrap();
        tables
            .get(table)
            .map(|t| t.rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    fn embed_items(tables: &HashMap<String, Table>, parent: &Map<String, Value>) -> Value {
        let Some(items) = tables.get("items") else {
            return Value::Array(Vec::new());
        };
        let parent_id = parent.get("id").cloned().unwrap_or(Value::Null);
        Value::Array(
            items
                .rows
                .iter()
                .filter(|item| item.get("category_id") == Some(&parent_id))
                .cloned()
                .map(Value::Object)
                .collect(),
        )
    }
}

#[async_trait]
impl TableClient for MemoryTables {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let tables = self.tables.lock().unwrap();
        let data = tables
            .get(table)
            .ok_or_else(|| anyhow!("relation '{}' does not exist", table))?;

        let requested: Vec<String> = query
            .columns
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        for column in &requested {
            if column != "*" && column != "items(*)" && !data.columns.contains(column) {
                return Err(anyhow!("column {}.{} does not exist", table, column));
            }
        }

        let mut rows: Vec<&Map<String, Value>> =
            data.rows.iter().filter(|row| matches(row, &query.filters)).collect();
        if let Some((column, ascending)) = &query.order {
            rows.sort_by_key(|row| row.get(column).and_then(Value::as_i64).unwrap_or(i64::MAX));
            if !ascending {
                rows.reverse();
            }
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let mut out = if requested.iter().any(|c| c == "*") {
                    row.clone()
                } else {
                    requested
                        .iter()
                        .filter(|c| c.as_str() != "items(*)")
                        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                        .collect()
                };
                if requested.iter().any(|c| c == "items(*)") {
                    out.insert("items".to_string(), Self::embed_items(&tables, row));
                }
                Value::Object(out)
            })
            .collect())
    }

    async fn update(&self, table: &str, patch: Value, filters: &[(String, String)]) -> Result<Vec<Value>> {
        let mut tables = self.tables.lock().unwrap();
        let data = tables
            .get_mut(table)
            .ok_or_else(|| anyhow!("relation '{}' does not exist", table))?;
        let Value::Object(patch) = patch else {
            return Err(anyhow!("patch must be an object"));
        };
        if let Some(unknown) = patch.keys().find(|k| !data.columns.contains(k)) {
            return Err(anyhow!(
                "Could not find the '{}' column of '{}' in the schema cache",
                unknown,
                table
            ));
        }

        let mut updated = Vec::new();
        for row in data.rows.iter_mut().filter(|row| matches(row, filters)) {
            for (key, value) in &patch {
                row.insert(key.clone(), value.clone());
            }
            updated.push(Value::Object(row.clone()));
        }
        Ok(updated)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>> {
        let mut tables = self.tables.lock().unwrap();
        let data = tables
            .get_mut(table)
            .ok_or_else(|| anyhow!("relation '{}' does not exist", table))?;
        let Value::Object(row) = row else {
            return Err(anyhow!("row must be an object"));
        };
        data.rows.push(row.clone());
        Ok(vec![Value::Object(row)])
    }
}
