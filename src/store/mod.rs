//! Capability seams over the relational store and the blob store.
//!
//! The engine only ever talks to these traits. `util::db::Db` implements
//! [`RelationalStore`] over Postgres, [`supabase_storage::SupabaseStorage`]
//! implements [`BlobStore`] over the Storage REST API, and [`memory`] holds
//! in-process versions of both.
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::OpsResult;

pub mod memory;
pub mod postgres;
pub mod sql;
pub mod supabase_storage;

/// A row as column name → JSON value.
pub type Row = serde_json::Map<String, Value>;

/// Equality filter on a single key column, compared textually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFilter {
    pub column: String,
    pub value: String,
}

impl KeyFilter {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// One column as reported by the store's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// Default clause of a column definition.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    Literal(Value),
    /// `now()` at insert time.
    Now,
    /// Identity column, allocated by the store.
    Identity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
    pub default: ColumnDefault,
}

impl ColumnDef {
    pub fn literal(name: &str, sql_type: &str, value: Value) -> Self {
        Self {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            default: ColumnDefault::Literal(value),
        }
    }

    pub fn now(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: "TIMESTAMPTZ".to_string(),
            default: ColumnDefault::Now,
        }
    }

    pub fn identity(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: "BIGINT".to_string(),
            default: ColumnDefault::Identity,
        }
    }

    /// Column clause as used by both `CREATE TABLE` and `ADD COLUMN`.
    pub fn to_sql(&self) -> OpsResult<String> {
        let name = sql::quote_ident(&self.name)?;
        Ok(match &self.default {
            ColumnDefault::Identity => {
                format!("{name} {} GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY", self.sql_type)
            }
            ColumnDefault::Now => format!("{name} {} NOT NULL DEFAULT now()", self.sql_type),
            ColumnDefault::Literal(v) => format!(
                "{name} {} NOT NULL DEFAULT {}",
                self.sql_type,
                sql::sql_literal(v)
            ),
        })
    }
}

/// Schema change statements the migrator may issue. Kept structured so every
/// store renders or applies them the same way.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlStatement {
    CreateTable { table: String, columns: Vec<ColumnDef> },
    AddColumn { table: String, column: ColumnDef },
}

impl DdlStatement {
    pub fn table(&self) -> &str {
        match self {
            DdlStatement::CreateTable { table, .. } | DdlStatement::AddColumn { table, .. } => table,
        }
    }

    pub fn to_sql(&self, schema: &str) -> OpsResult<String> {
        match self {
            DdlStatement::CreateTable { table, columns } => {
                let cols = columns
                    .iter()
                    .map(ColumnDef::to_sql)
                    .collect::<OpsResult<Vec<_>>>()?;
                Ok(format!(
                    "CREATE TABLE IF NOT EXISTS {} ({})",
                    sql::qualified(schema, table)?,
                    cols.join(", ")
                ))
            }
            DdlStatement::AddColumn { table, column } => Ok(format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
                sql::qualified(schema, table)?,
                column.to_sql()?
            )),
        }
    }
}

#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Rows of `table` restricted to `columns`, in the store's enumeration order.
    async fn select(
        &self,
        table: &str,
        columns: &[&str],
        filter: Option<&KeyFilter>,
    ) -> OpsResult<Vec<Row>>;

    async fn insert(&self, table: &str, row: &Row) -> OpsResult<()>;

    /// Returns the number of rows affected.
    async fn update(&self, table: &str, row: &Row, key: &KeyFilter) -> OpsResult<u64>;

    /// Returns the number of rows removed.
    async fn delete(&self, table: &str, key: &KeyFilter) -> OpsResult<u64>;

    async fn introspect_columns(&self, table: &str) -> OpsResult<Vec<ColumnInfo>>;

    async fn table_exists(&self, table: &str) -> OpsResult<bool>;

    async fn execute_ddl(&self, statement: &DdlStatement) -> OpsResult<()>;
}

/// One entry from a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub name: String,
    /// Absent for folder placeholders.
    pub id: Option<String>,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub updated_at: Option<String>,
}

impl ObjectInfo {
    /// Folder prefixes and `.emptyFolderPlaceholder` markers are not files.
    pub fn is_file(&self) -> bool {
        self.id.is_some() && !self.name.ends_with(".emptyFolderPlaceholder")
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// At most `limit` entries of `bucket`, in listing order.
    async fn list_objects(&self, bucket: &str, limit: usize) -> OpsResult<Vec<ObjectInfo>>;

    async fn upload_object(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
        overwrite: bool,
    ) -> OpsResult<()>;

    async fn resolve_public_locator(&self, bucket: &str, name: &str) -> OpsResult<String>;

    async fn bucket_exists(&self, name: &str) -> OpsResult<bool>;

    async fn create_bucket(&self, name: &str, public: bool) -> OpsResult<()>;
}
