//! `RelationalStore` over the sqlx Postgres pool.
//!
//! Rows travel as JSONB: reads go through `to_jsonb(..)`, writes through
//! `jsonb_populate_record(NULL::table, $1)` so every value is cast to the
//! column's real type by Postgres rather than by us.
use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row as _;
use tracing::debug;

use super::sql::{qualified, quote_ident};
use super::{ColumnInfo, DdlStatement, KeyFilter, RelationalStore, Row};
use crate::error::{OpsError, OpsResult};
use crate::util::db::Db;

impl Db {
    fn table_ref(&self, table: &str) -> OpsResult<String> {
        qualified(&self.schema, table)
    }
}

fn column_list(columns: &[&str], prefix: Option<&str>) -> OpsResult<String> {
    let quoted = columns
        .iter()
        .map(|c| {
            let q = quote_ident(c)?;
            Ok(match prefix {
                Some(p) => format!("{p}.{q}"),
                None => q,
            })
        })
        .collect::<OpsResult<Vec<_>>>()?;
    Ok(quoted.join(", "))
}

/// `$1` binds the key value as text when `filter` is set.
fn select_sql(target: &str, columns: &[&str], filter: Option<&KeyFilter>) -> OpsResult<String> {
    let mut sql = format!(
        "SELECT to_jsonb(t) AS data FROM (SELECT {} FROM {target}",
        column_list(columns, None)?
    );
    if let Some(f) = filter {
        sql.push_str(&format!(" WHERE {}::text = $1", quote_ident(&f.column)?));
    }
    sql.push_str(") t");
    Ok(sql)
}

/// `$1` binds the row as JSONB; an empty row inserts defaults only.
fn insert_sql(target: &str, row: &Row) -> OpsResult<String> {
    if row.is_empty() {
        return Ok(format!("INSERT INTO {target} DEFAULT VALUES"));
    }
    let cols: Vec<&str> = row.keys().map(String::as_str).collect();
    Ok(format!(
        "INSERT INTO {target} ({}) SELECT {} FROM jsonb_populate_record(NULL::{target}, $1::jsonb) AS src",
        column_list(&cols, None)?,
        column_list(&cols, Some("src"))?
    ))
}

/// `$1` binds the row as JSONB, `$2` the key value as text.
fn update_sql(target: &str, row: &Row, key: &KeyFilter) -> OpsResult<String> {
    let assignments = row
        .keys()
        .map(|c| {
            let q = quote_ident(c)?;
            Ok(format!("{q} = src.{q}"))
        })
        .collect::<OpsResult<Vec<_>>>()?;
    Ok(format!(
        "UPDATE {target} AS tgt SET {} FROM jsonb_populate_record(NULL::{target}, $1::jsonb) AS src WHERE tgt.{}::text = $2",
        assignments.join(", "),
        quote_ident(&key.column)?
    ))
}

fn delete_sql(target: &str, key: &KeyFilter) -> OpsResult<String> {
    Ok(format!("DELETE FROM {target} WHERE {}::text = $1", quote_ident(&key.column)?))
}

#[async_trait]
impl RelationalStore for Db {
    async fn select(
        &self,
        table: &str,
        columns: &[&str],
        filter: Option<&KeyFilter>,
    ) -> OpsResult<Vec<Row>> {
        if columns.is_empty() {
            return Err(OpsError::Validation(format!("select on {table} without columns")));
        }
        let sql = select_sql(&self.table_ref(table)?, columns, filter)?;

        let mut query = sqlx::query(&sql).persistent(false);
        if let Some(f) = filter {
            query = query.bind(f.value.as_str());
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OpsError::transport(format!("select {table}"), e))?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let v: Value = r.try_get("data")?;
            match v {
                Value::Object(map) => out.push(map),
                other => {
                    return Err(OpsError::transport(
                        format!("select {table}"),
                        format!("unexpected row shape {other}"),
                    ))
                }
            }
        }
        debug!(table, rows = out.len(), "select");
        Ok(out)
    }

    async fn insert(&self, table: &str, row: &Row) -> OpsResult<()> {
        let sql = insert_sql(&self.table_ref(table)?, row)?;
        let mut query = sqlx::query(&sql).persistent(false);
        if !row.is_empty() {
            query = query.bind(Value::Object(row.clone()));
        }
        query
            .execute(&self.pool)
            .await
            .map_err(|e| OpsError::transport(format!("insert {table}"), e))?;
        Ok(())
    }

    async fn update(&self, table: &str, row: &Row, key: &KeyFilter) -> OpsResult<u64> {
        if row.is_empty() {
            return Ok(0);
        }
        let sql = update_sql(&self.table_ref(table)?, row, key)?;
        let done = sqlx::query(&sql)
            .persistent(false)
            .bind(Value::Object(row.clone()))
            .bind(key.value.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| OpsError::transport(format!("update {table}"), e))?;
        Ok(done.rows_affected())
    }

    async fn delete(&self, table: &str, key: &KeyFilter) -> OpsResult<u64> {
        let sql = delete_sql(&self.table_ref(table)?, key)?;
        let done = sqlx::query(&sql)
            .persistent(false)
            .bind(key.value.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| OpsError::transport(format!("delete {table}"), e))?;
        Ok(done.rows_affected())
    }

    async fn introspect_columns(&self, table: &str) -> OpsResult<Vec<ColumnInfo>> {
        let rows = sqlx::query(
            "SELECT column_name, data_type, is_nullable, column_default \
             FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 \
             ORDER BY ordinal_position",
        )
        .bind(&self.schema)
        .bind(table)
        .persistent(false)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OpsError::transport(format!("introspect {table}"), e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let nullable: String = row.try_get("is_nullable")?;
            out.push(ColumnInfo {
                name: row.try_get("column_name")?,
                data_type: row.try_get("data_type")?,
                nullable: nullable == "YES",
                default: row.try_get("column_default")?,
            });
        }
        Ok(out)
    }

    async fn table_exists(&self, table: &str) -> OpsResult<bool> {
        let exists: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
            .bind(self.table_ref(table)?)
            .persistent(false)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| OpsError::transport(format!("table_exists {table}"), e))?;
        Ok(exists.is_some())
    }

    async fn execute_ddl(&self, statement: &DdlStatement) -> OpsResult<()> {
        let sql = statement.to_sql(&self.schema)?;
        debug!(%sql, "ddl");
        sqlx::raw_sql(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| OpsError::transport(format!("ddl on {}", statement.table()), e))?;
        Ok(())
    }
}
