//! In-memory implementation of DataStore for testing and development

use crate::core::error::StoreError;
use crate::core::model::identity_key;
use crate::core::store::{DataStore, Scope, Table};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// In-memory data store
///
/// Tables are insertion-ordered vectors of JSON objects behind a `RwLock`.
/// Identities are assigned on create:
///
/// - missing, `null` or `0`: next integer after the largest numeric id
/// - empty string: a fresh UUID v4
/// - anything else is kept, and rejected with [`StoreError::Conflict`] if taken
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, Vec<Value>>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert records as-is, bypassing identity assignment
    pub fn seed(&self, table: &str, records: impl IntoIterator<Item = Value>) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        tables
            .entry(table.to_string())
            .or_default()
            .extend(records);
        Ok(())
    }

    /// Number of records in a table
    pub fn len(&self, table: &str) -> usize {
        self.read()
            .map(|tables| tables.get(table).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Remove every record of a table
    pub fn clear(&self, table: &str) -> Result<(), StoreError> {
        self.write()?.remove(table);
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Vec<Value>>>, StoreError> {
        self.tables
            .read()
            .map_err(|e| StoreError::Backend(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<Value>>>, StoreError> {
        self.tables
            .write()
            .map_err(|e| StoreError::Backend(format!("Failed to acquire write lock: {}", e)))
    }
}

fn key_of(record: &Value, key: &str) -> Option<String> {
    record.get(key).map(identity_key)
}

fn next_sequence(rows: &[Value], key: &str) -> u64 {
    rows.iter()
        .filter_map(|row| row.get(key).and_then(Value::as_u64))
        .max()
        .unwrap_or(0)
        + 1
}

impl DataStore for MemoryStore {
    fn find(&self, table: &Table, id: &str, scope: &Scope) -> Result<Option<Value>, StoreError> {
        let tables = self.read()?;
        Ok(tables.get(&table.name).and_then(|rows| {
            rows.iter()
                .find(|row| key_of(row, table.key).as_deref() == Some(id) && scope.matches(row))
                .cloned()
        }))
    }

    fn find_all(&self, table: &Table, scope: &Scope) -> Result<Vec<Value>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .get(&table.name)
            .map(|rows| rows.iter().filter(|row| scope.matches(row)).cloned().collect())
            .unwrap_or_default())
    }

    fn create(&self, table: &Table, mut record: Value) -> Result<Value, StoreError> {
        let mut tables = self.write()?;
        let rows = tables.entry(table.name.clone()).or_default();

        let assigned = match record.get(table.key) {
            None | Some(Value::Null) => Some(Value::from(next_sequence(rows, table.key))),
            Some(Value::Number(n)) if n.as_u64() == Some(0) => {
                Some(Value::from(next_sequence(rows, table.key)))
            }
            Some(Value::String(s)) if s.is_empty() => Some(Value::from(Uuid::new_v4().to_string())),
            Some(_) => None,
        };

        let Some(fields) = record.as_object_mut() else {
            return Err(StoreError::InvalidRecord {
                table: table.name.clone(),
                message: "record is not a JSON object".to_string(),
            });
        };
        if let Some(id) = assigned {
            fields.insert(table.key.to_string(), id);
        }

        let id = key_of(&record, table.key).unwrap_or_default();
        if rows.iter().any(|row| key_of(row, table.key).as_deref() == Some(id.as_str())) {
            return Err(StoreError::Conflict {
                table: table.name.clone(),
                id,
            });
        }

        rows.push(record.clone());
        Ok(record)
    }

    fn save(&self, table: &Table, record: Value) -> Result<Value, StoreError> {
        let id = key_of(&record, table.key).ok_or_else(|| StoreError::InvalidRecord {
            table: table.name.clone(),
            message: format!("record has no '{}' field", table.key),
        })?;

        let mut tables = self.write()?;
        let slot = tables
            .get_mut(&table.name)
            .and_then(|rows| rows.iter_mut().find(|row| key_of(row, table.key).as_deref() == Some(id.as_str())))
            .ok_or_else(|| StoreError::NotFound {
                table: table.name.clone(),
                id: id.clone(),
            })?;

        *slot = record.clone();
        Ok(record)
    }

    fn delete(&self, table: &Table, id: &str) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let rows = tables.get_mut(&table.name).ok_or_else(|| StoreError::NotFound {
            table: table.name.clone(),
            id: id.to_string(),
        })?;

        let before = rows.len();
        rows.retain(|row| key_of(row, table.key).as_deref() != Some(id));
        if rows.len() == before {
            return Err(StoreError::NotFound {
                table: table.name.clone(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
