//! In-process stores with the same observable behavior as the remote ones.
//!
//! Used by the test suites and by `--dry-run` style callers that must not touch
//! real infrastructure. Both keep insertion order, which stands in for the
//! remote enumeration order.
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::sql::key_text;
use super::{
    BlobStore, ColumnDef, ColumnDefault, ColumnInfo, DdlStatement, KeyFilter, ObjectInfo,
    RelationalStore, Row,
};
use crate::error::{OpsError, OpsResult};

#[derive(Debug, Clone, Default)]
struct MemTable {
    columns: Vec<ColumnDef>,
    rows: Vec<Row>,
    next_identity: i64,
}

impl MemTable {
    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    fn fill_defaults(&mut self, row: &mut Row) {
        for col in &self.columns {
            if !row.contains_key(&col.name) {
                let value = default_value(&col.default, &mut self.next_identity);
                row.insert(col.name.clone(), value);
            }
        }
    }
}

fn default_value(default: &ColumnDefault, next_identity: &mut i64) -> Value {
    match default {
        ColumnDefault::Literal(v) => v.clone(),
        ColumnDefault::Now => Value::String(Utc::now().to_rfc3339()),
        ColumnDefault::Identity => {
            *next_identity += 1;
            Value::from(*next_identity)
        }
    }
}

fn row_matches(row: &Row, key: &KeyFilter) -> bool {
    row.get(&key.column)
        .and_then(key_text)
        .is_some_and(|v| v == key.value)
}

/// Relational store kept in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, MemTable>>,
    /// (table, key value) pairs whose updates are rejected.
    reject_updates: Mutex<HashSet<(String, String)>>,
    /// Columns whose ADD COLUMN is rejected.
    reject_columns: Mutex<HashSet<String>>,
    writes: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table whose columns carry no defaults (plain data tables).
    pub fn with_table(self, table: &str, columns: &[&str], rows: Vec<Row>) -> Self {
        {
            let mut tables = self.lock_tables();
            let cols = columns
                .iter()
                .map(|c| ColumnDef::literal(c, "TEXT", Value::Null))
                .collect();
            tables.insert(
                table.to_string(),
                MemTable {
                    columns: cols,
                    rows,
                    next_identity: 0,
                },
            );
        }
        self
    }

    /// Register a table with explicit column definitions.
    pub fn with_defined_table(self, table: &str, columns: Vec<ColumnDef>, rows: Vec<Row>) -> Self {
        {
            let mut tables = self.lock_tables();
            let next_identity = rows
                .iter()
                .filter_map(|r| r.get("id").and_then(Value::as_i64))
                .max()
                .unwrap_or(0);
            tables.insert(
                table.to_string(),
                MemTable {
                    columns,
                    rows,
                    next_identity,
                },
            );
        }
        self
    }

    pub fn reject_update(&self, table: &str, key_value: &str) {
        self.reject_updates
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert((table.to_string(), key_value.to_string()));
    }

    pub fn reject_add_column(&self, column: &str) {
        self.reject_columns
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(column.to_string());
    }

    /// Number of successful mutations (insert/update/delete/DDL) so far.
    pub fn write_count(&self) -> u64 {
        *self.writes.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Full copy of a table's rows.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock_tables()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn column_names(&self, table: &str) -> Vec<String> {
        self.lock_tables()
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    fn lock_tables(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, MemTable>> {
        self.tables.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn bump_writes(&self) {
        *self.writes.lock().unwrap_or_else(|p| p.into_inner()) += 1;
    }
}

#[async_trait]
impl RelationalStore for MemoryStore {
    async fn select(
        &self,
        table: &str,
        columns: &[&str],
        filter: Option<&KeyFilter>,
    ) -> OpsResult<Vec<Row>> {
        let tables = self.lock_tables();
        let t = tables
            .get(table)
            .ok_or_else(|| OpsError::not_found("table", table))?;
        if let Some(missing) = columns.iter().find(|c| !t.has_column(c)) {
            return Err(OpsError::not_found("column", format!("{table}.{missing}")));
        }
        Ok(t.rows
            .iter()
            .filter(|r| filter.map_or(true, |f| row_matches(r, f)))
            .map(|r| {
                columns
                    .iter()
                    .map(|c| (c.to_string(), r.get(*c).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect())
    }

    async fn insert(&self, table: &str, row: &Row) -> OpsResult<()> {
        {
            let mut tables = self.lock_tables();
            let t = tables
                .get_mut(table)
                .ok_or_else(|| OpsError::not_found("table", table))?;
            if let Some(unknown) = row.keys().find(|k| !t.has_column(k)) {
                return Err(OpsError::not_found("column", format!("{table}.{unknown}")));
            }
            let mut full = row.clone();
            t.fill_defaults(&mut full);
            t.rows.push(full);
        }
        self.bump_writes();
        Ok(())
    }

    async fn update(&self, table: &str, row: &Row, key: &KeyFilter) -> OpsResult<u64> {
        if self
            .reject_updates
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&(table.to_string(), key.value.clone()))
        {
            return Err(OpsError::transport(
                format!("update {table}"),
                "write rejected by store policy",
            ));
        }
        let affected = {
            let mut tables = self.lock_tables();
            let t = tables
                .get_mut(table)
                .ok_or_else(|| OpsError::not_found("table", table))?;
            if let Some(unknown) = row.keys().find(|k| !t.has_column(k)) {
                return Err(OpsError::not_found("column", format!("{table}.{unknown}")));
            }
            let mut affected = 0u64;
            for existing in t.rows.iter_mut().filter(|r| row_matches(r, key)) {
                for (k, v) in row {
                    existing.insert(k.clone(), v.clone());
                }
                affected += 1;
            }
            affected
        };
        if affected > 0 {
            self.bump_writes();
        }
        Ok(affected)
    }

    async fn delete(&self, table: &str, key: &KeyFilter) -> OpsResult<u64> {
        let removed = {
            let mut tables = self.lock_tables();
            let t = tables
                .get_mut(table)
                .ok_or_else(|| OpsError::not_found("table", table))?;
            let before = t.rows.len();
            t.rows.retain(|r| !row_matches(r, key));
            (before - t.rows.len()) as u64
        };
        if removed > 0 {
            self.bump_writes();
        }
        Ok(removed)
    }

    async fn introspect_columns(&self, table: &str) -> OpsResult<Vec<ColumnInfo>> {
        let tables = self.lock_tables();
        Ok(tables
            .get(table)
            .map(|t| {
                t.columns
                    .iter()
                    .map(|c| ColumnInfo {
                        name: c.name.clone(),
                        data_type: c.sql_type.to_ascii_lowercase(),
                        nullable: matches!(c.default, ColumnDefault::Literal(Value::Null)),
                        default: match &c.default {
                            ColumnDefault::Literal(Value::Null) => None,
                            ColumnDefault::Literal(v) => Some(super::sql::sql_literal(v)),
                            ColumnDefault::Now => Some("now()".to_string()),
                            ColumnDefault::Identity => None,
                        },
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn table_exists(&self, table: &str) -> OpsResult<bool> {
        Ok(self.lock_tables().contains_key(table))
    }

    async fn execute_ddl(&self, statement: &DdlStatement) -> OpsResult<()> {
        {
            let mut tables = self.lock_tables();
            match statement {
                DdlStatement::CreateTable { table, columns } => {
                    tables.entry(table.clone()).or_insert_with(|| MemTable {
                        columns: columns.clone(),
                        rows: Vec::new(),
                        next_identity: 0,
                    });
                }
                DdlStatement::AddColumn { table, column } => {
                    if self
                        .reject_columns
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .contains(&column.name)
                    {
                        return Err(OpsError::transport(
                            format!("ddl on {table}"),
                            format!("permission denied adding {}", column.name),
                        ));
                    }
                    let t = tables
                        .get_mut(table)
                        .ok_or_else(|| OpsError::not_found("table", table.as_str()))?;
                    if !t.has_column(&column.name) {
                        t.columns.push(column.clone());
                        // existing rows pick up the new column's default
                        for r in t.rows.iter_mut() {
                            let value = default_value(&column.default, &mut t.next_identity);
                            r.insert(column.name.clone(), value);
                        }
                    }
                }
            }
        }
        self.bump_writes();
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MemObject {
    name: String,
    bytes: Vec<u8>,
    content_type: String,
}

#[derive(Debug, Clone, Default)]
struct MemBucket {
    public: bool,
    objects: Vec<MemObject>,
}

/// Blob store kept in memory. Public locators use `base_url` with the same
/// path layout as Supabase Storage.
pub struct MemoryBlobStore {
    base_url: String,
    buckets: Mutex<BTreeMap<String, MemBucket>>,
    failing: Mutex<HashSet<String>>,
    /// (bucket, object) pairs whose public locator cannot be resolved.
    failing_locators: Mutex<HashSet<(String, String)>>,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("https://storage.test")
    }
}

impl MemoryBlobStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            buckets: Mutex::new(BTreeMap::new()),
            failing: Mutex::new(HashSet::new()),
            failing_locators: Mutex::new(HashSet::new()),
        }
    }

    /// Seed a bucket with empty objects named `names`, in order.
    pub fn with_bucket(self, bucket: &str, names: &[&str]) -> Self {
        {
            let mut buckets = self.lock_buckets();
            let b = buckets.entry(bucket.to_string()).or_insert_with(|| MemBucket {
                public: true,
                objects: Vec::new(),
            });
            for n in names {
                b.objects.push(MemObject {
                    name: n.to_string(),
                    bytes: Vec::new(),
                    content_type: "application/octet-stream".into(),
                });
            }
        }
        self
    }

    /// Make every call touching `bucket` fail with a transport error.
    pub fn fail_bucket(&self, bucket: &str) {
        self.failing
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(bucket.to_string());
    }

    /// Make `resolve_public_locator` fail for one object.
    pub fn fail_locator(&self, bucket: &str, name: &str) {
        self.failing_locators
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert((bucket.to_string(), name.to_string()));
    }

    pub fn object(&self, bucket: &str, name: &str) -> Option<(Vec<u8>, String)> {
        self.lock_buckets().get(bucket).and_then(|b| {
            b.objects
                .iter()
                .find(|o| o.name == name)
                .map(|o| (o.bytes.clone(), o.content_type.clone()))
        })
    }

    pub fn is_public(&self, bucket: &str) -> Option<bool> {
        self.lock_buckets().get(bucket).map(|b| b.public)
    }

    fn lock_buckets(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, MemBucket>> {
        self.buckets.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn check_reachable(&self, op: &str, bucket: &str) -> OpsResult<()> {
        if self
            .failing
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(bucket)
        {
            return Err(OpsError::transport(format!("{op} {bucket}"), "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list_objects(&self, bucket: &str, limit: usize) -> OpsResult<Vec<ObjectInfo>> {
        self.check_reachable("list bucket", bucket)?;
        let buckets = self.lock_buckets();
        let b = buckets
            .get(bucket)
            .ok_or_else(|| OpsError::not_found("bucket", bucket))?;
        Ok(b.objects
            .iter()
            .take(limit)
            .enumerate()
            .map(|(idx, o)| ObjectInfo {
                name: o.name.clone(),
                id: Some(format!("{bucket}-{idx}")),
                size: Some(o.bytes.len() as u64),
                content_type: Some(o.content_type.clone()),
                updated_at: None,
            })
            .collect())
    }

    async fn upload_object(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
        overwrite: bool,
    ) -> OpsResult<()> {
        self.check_reachable("upload", bucket)?;
        let mut buckets = self.lock_buckets();
        let b = buckets
            .get_mut(bucket)
            .ok_or_else(|| OpsError::not_found("bucket", bucket))?;
        let object = MemObject {
            name: name.to_string(),
            bytes,
            content_type: content_type.to_string(),
        };
        match b.objects.iter_mut().find(|o| o.name == name) {
            Some(_) if !overwrite => Err(OpsError::transport(
                format!("upload {bucket}/{name}"),
                "object already exists",
            )),
            Some(existing) => {
                *existing = object;
                Ok(())
            }
            None => {
                b.objects.push(object);
                Ok(())
            }
        }
    }

    async fn resolve_public_locator(&self, bucket: &str, name: &str) -> OpsResult<String> {
        if self
            .failing_locators
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&(bucket.to_string(), name.to_string()))
        {
            return Err(OpsError::transport(
                format!("resolve locator {bucket}/{name}"),
                "signing service unavailable",
            ));
        }
        Ok(format!(
            "{}/storage/v1/object/public/{bucket}/{name}",
            self.base_url
        ))
    }

    async fn bucket_exists(&self, name: &str) -> OpsResult<bool> {
        self.check_reachable("bucket_exists", name)?;
        Ok(self.lock_buckets().contains_key(name))
    }

    async fn create_bucket(&self, name: &str, public: bool) -> OpsResult<()> {
        self.check_reachable("create bucket", name)?;
        self.lock_buckets()
            .entry(name.to_string())
            .or_insert_with(|| MemBucket {
                public,
                objects: Vec::new(),
            });
        Ok(())
    }
}
