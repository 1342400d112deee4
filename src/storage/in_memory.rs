//! In-memory implementation of the storage seams for testing and development

use crate::core::error::{PlatformResult, StorageError};
use crate::core::metadata::{ClassMetadata, ClassMetadataFactory, FieldType};
use crate::core::service::{Change, PageRequest, PageSlice, Persister, QueryExecutor, UnitOfWork};
use crate::query::QueryBuilder;
use crate::storage::eval::{self, Row, Tables};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

const BACKEND: &str = "memory";

/// In-memory store
///
/// Rows are flat JSON objects keyed by entity class. Queries are evaluated
/// against them by [`eval`], so joins, filters, ordering and every
/// pagination strategy behave as they would on a relational backend.
/// Uses RwLock for thread-safe access.
#[derive(Clone)]
pub struct InMemoryStore {
    classes: Arc<dyn ClassMetadataFactory>,
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new(classes: Arc<dyn ClassMetadataFactory>) -> Self {
        Self {
            classes,
            tables: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn read(&self) -> PlatformResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|e| {
            StorageError::Unavailable {
                backend: BACKEND.to_string(),
                message: format!("Failed to acquire read lock: {e}"),
            }
            .into()
        })
    }

    fn write(&self) -> PlatformResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|e| {
            StorageError::Unavailable {
                backend: BACKEND.to_string(),
                message: format!("Failed to acquire write lock: {e}"),
            }
            .into()
        })
    }

    /// Insert rows as they are, identifiers included
    pub fn seed(&self, class: &str, rows: impl IntoIterator<Item = Value>) -> PlatformResult<()> {
        let metadata = self.classes.get(class)?;
        let mut tables = self.write()?;
        let table = tables.entry(class.to_string()).or_default();
        for row in rows {
            table.push(to_row(&metadata, row)?);
        }
        Ok(())
    }

    /// Stored rows of a class, in insertion order
    pub fn rows(&self, class: &str) -> PlatformResult<Vec<Value>> {
        let tables = self.read()?;
        Ok(tables
            .get(class)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default())
    }
}

/// Strip nested association payloads, keeping plain fields and join columns
fn to_row(metadata: &ClassMetadata, object: Value) -> PlatformResult<Row> {
    let Value::Object(mut row) = object else {
        return Err(StorageError::IntegrityError {
            message: format!("{} rows must be JSON objects", metadata.name),
        }
        .into());
    };
    for association in &metadata.associations {
        row.remove(&association.name);
    }
    Ok(row)
}

fn has_identity(metadata: &ClassMetadata, row: &Row) -> bool {
    metadata
        .identifier
        .iter()
        .all(|field| row.get(field).is_some_and(|v| !v.is_null()))
}

fn same_identity(metadata: &ClassMetadata, a: &Row, b: &Row) -> bool {
    metadata.identifier.iter().all(|field| a.get(field) == b.get(field))
}

/// Fill in a generated identifier
///
/// Integer identifiers continue from the highest stored value; any other
/// type gets a random UUID.
fn generate_identifier(metadata: &ClassMetadata, table: &[Row], row: &mut Row) -> PlatformResult<()> {
    let [field] = metadata.identifier.as_slice() else {
        return Err(StorageError::IntegrityError {
            message: format!(
                "{} has a composite identifier and cannot be generated",
                metadata.name
            ),
        }
        .into());
    };

    let value = match metadata.field_type(field) {
        FieldType::Integer => {
            let max = table
                .iter()
                .filter_map(|r| r.get(field).and_then(Value::as_i64))
                .max()
                .unwrap_or(0);
            let next = max.checked_add(1).ok_or_else(|| StorageError::IntegrityError {
                message: format!("{}.{} has no identifier left after {}", metadata.name, field, max),
            })?;
            Value::from(next)
        }
        _ => Value::String(Uuid::new_v4().to_string()),
    };
    row.insert(field.clone(), value);
    Ok(())
}

#[async_trait]
impl QueryExecutor for InMemoryStore {
    async fn fetch_all(&self, query: &QueryBuilder) -> PlatformResult<Vec<Value>> {
        let tables = self.read()?;
        Ok(eval::execute(&tables, self.classes.as_ref(), query, None)?.items)
    }

    async fn fetch_one(&self, query: &QueryBuilder) -> PlatformResult<Option<Value>> {
        let tables = self.read()?;
        let slice = eval::execute(&tables, self.classes.as_ref(), query, None)?;
        Ok(slice.items.into_iter().next())
    }

    async fn paginate(&self, query: &QueryBuilder, request: PageRequest) -> PlatformResult<PageSlice> {
        let tables = self.read()?;
        eval::execute(&tables, self.classes.as_ref(), query, Some(request))
    }
}

#[async_trait]
impl Persister for InMemoryStore {
    async fn flush(&self, unit: UnitOfWork) -> PlatformResult<Vec<Value>> {
        let mut tables = self.write()?;
        // changes land on copies, committed only once all of them applied
        let mut staged: HashMap<String, Vec<Row>> = HashMap::new();
        let mut persisted = Vec::new();

        for change in unit.into_changes() {
            let (class, object, remove, insert) = match change {
                Change::Insert { class, object } => (class, object, false, true),
                Change::Persist { class, object } => (class, object, false, false),
                Change::Remove { class, object } => (class, object, true, false),
            };
            let metadata = self.classes.get(&class)?;
            let mut row = to_row(&metadata, object)?;
            let table = staged
                .entry(class.clone())
                .or_insert_with(|| tables.get(&class).cloned().unwrap_or_default());

            if remove {
                if !has_identity(&metadata, &row) {
                    return Err(StorageError::IntegrityError {
                        message: format!("cannot remove a {class} without its identifier"),
                    }
                    .into());
                }
                table.retain(|existing| !same_identity(&metadata, existing, &row));
                tracing::debug!(class = %class, "removed row");
                continue;
            }

            if !has_identity(&metadata, &row) {
                generate_identifier(&metadata, table, &mut row)?;
            }
            match table
                .iter_mut()
                .find(|existing| same_identity(&metadata, existing, &row))
            {
                Some(_) if insert => {
                    let identifiers: Map<String, Value> = metadata
                        .identifier
                        .iter()
                        .map(|field| (field.clone(), row.get(field).cloned().unwrap_or(Value::Null)))
                        .collect();
                    return Err(StorageError::Conflict {
                        class,
                        identifiers: Value::Object(identifiers),
                    }
                    .into());
                }
                Some(existing) => *existing = row.clone(),
                None => table.push(row.clone()),
            }
            tracing::debug!(class = %class, "persisted row");
            persisted.push(Value::Object(row));
        }

        tables.extend(staged);
        Ok(persisted)
    }
}
