//! SQLite-backed store implementation.
//!
//! Backs the [`Store`]/[`UnitOfWork`] traits with a `sqlx` SQLite pool. Each
//! unit of work is one transaction; dropping it without commit rolls back,
//! which is what guarantees release on every exit path.
//!
//! Identifiers (table and column names) are validated and quoted before they
//! are spliced into SQL; all values go through bound parameters.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Column, Row, Sqlite, Transaction, TypeInfo};
use std::time::Duration;
use tracing::debug;

use crate::config::{DEFAULT_BUSY_TIMEOUT_SECS, StoreConfig};
use crate::entity::{FieldMap, FieldValue, Record};
use crate::error::{DaoError, DaoResult};
use crate::store::{SelectQuery, Store, UnitOfWork};

/// Connection pool over a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database named by `config` and build
    /// the pool with the configured bounds.
    pub async fn connect(config: &StoreConfig) -> DaoResult<Self> {
        config.validate().map_err(DaoError::invalid_input)?;

        let options = SqliteConnectOptions::new()
            .filename(&config.store_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(DEFAULT_BUSY_TIMEOUT_SECS));

        let pool = SqlitePoolOptions::new()
            .min_connections(config.pool.min_connections_or_default())
            .max_connections(config.pool.max_connections_or_default())
            .acquire_timeout(config.pool.acquire_timeout_or_default())
            .connect_with(options)
            .await
            .map_err(DaoError::from)?;

        debug!(
            store = %config.store_path.display(),
            min = config.pool.min_connections_or_default(),
            max = config.pool.max_connections_or_default(),
            "Opened SQLite connection pool"
        );

        Ok(Self { pool })
    }

    /// Direct pool access for schema setup and out-of-band statements.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn begin(&self) -> DaoResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await.map_err(DaoError::from)?;
        Ok(Box::new(SqliteUnitOfWork { tx }))
    }

    async fn dispose(&self) -> DaoResult<()> {
        self.pool.close().await;
        Ok(())
    }

    fn is_disposed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// One transaction-scoped unit of work.
pub struct SqliteUnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn fetch_by_key(
        &mut self,
        table: &str,
        key_field: &str,
        key: &FieldValue,
    ) -> DaoResult<Option<Record>> {
        check_identifier(table)?;
        check_identifier(key_field)?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ? LIMIT 1",
            quote_ident(table),
            quote_ident(key_field)
        );
        let row = bind_value(sqlx::query(&sql), key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(DaoError::from)?;
        Ok(row.map(|r| row_to_record(&r)))
    }

    async fn select(&mut self, table: &str, query: &SelectQuery) -> DaoResult<Vec<Record>> {
        let (sql, params) = build_select(table, query)?;
        debug!(sql = %sql, params = params.len(), "Executing select");

        let mut q = sqlx::query(&sql);
        for param in &params {
            q = bind_value(q, param);
        }
        let rows = q
            .fetch_all(&mut *self.tx)
            .await
            .map_err(DaoError::from)?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn insert(&mut self, table: &str, fields: &FieldMap) -> DaoResult<Record> {
        let sql = build_insert(table, fields)?;
        debug!(sql = %sql, "Executing insert");

        let mut q = sqlx::query(&sql);
        for value in fields.values() {
            q = bind_value(q, value);
        }
        // RETURNING * flushes the write and refreshes generated fields
        // (e.g. an autoincrement key) into the record before detachment.
        let row = q.fetch_one(&mut *self.tx).await.map_err(DaoError::from)?;
        Ok(row_to_record(&row))
    }

    async fn update_fields(
        &mut self,
        table: &str,
        key_field: &str,
        key: &FieldValue,
        fields: &FieldMap,
    ) -> DaoResult<Option<Record>> {
        if fields.is_empty() {
            // Nothing to modify; the contract is still "current row or None".
            return self.fetch_by_key(table, key_field, key).await;
        }

        let sql = build_update(table, key_field, fields)?;
        debug!(sql = %sql, "Executing update");

        let mut q = sqlx::query(&sql);
        for value in fields.values() {
            q = bind_value(q, value);
        }
        q = bind_value(q, key);
        let row = q
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(DaoError::from)?;
        Ok(row.map(|r| row_to_record(&r)))
    }

    async fn delete_by_key(
        &mut self,
        table: &str,
        key_field: &str,
        key: &FieldValue,
    ) -> DaoResult<bool> {
        check_identifier(table)?;
        check_identifier(key_field)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_ident(table),
            quote_ident(key_field)
        );
        let result = bind_value(sqlx::query(&sql), key)
            .execute(&mut *self.tx)
            .await
            .map_err(DaoError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn execute(&mut self, sql: &str, params: &[FieldValue]) -> DaoResult<u64> {
        let mut q = sqlx::query(sql);
        for param in params {
            q = bind_value(q, param);
        }
        let result = q.execute(&mut *self.tx).await.map_err(DaoError::from)?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[FieldValue]) -> DaoResult<Vec<Record>> {
        let mut q = sqlx::query(sql);
        for param in params {
            q = bind_value(q, param);
        }
        let rows = q.fetch_all(&mut *self.tx).await.map_err(DaoError::from)?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn commit(self: Box<Self>) -> DaoResult<()> {
        self.tx.commit().await.map_err(DaoError::from)
    }

    async fn rollback(self: Box<Self>) -> DaoResult<()> {
        self.tx.rollback().await.map_err(DaoError::from)
    }
}

// =============================================================================
// SQL Generation
// =============================================================================

/// Validate a table or column name before splicing it into SQL.
fn check_identifier(name: &str) -> DaoResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DaoError::invalid_input(format!(
            "invalid identifier: {:?}",
            name
        )))
    }
}

/// Quote a previously validated identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

fn build_select(table: &str, query: &SelectQuery) -> DaoResult<(String, Vec<FieldValue>)> {
    check_identifier(table)?;
    let mut sql = format!("SELECT * FROM {}", quote_ident(table));
    let mut params: Vec<FieldValue> = Vec::new();

    if !query.filters.is_empty() {
        let mut clauses = Vec::with_capacity(query.filters.len());
        for (field, value) in &query.filters {
            check_identifier(field)?;
            if matches!(value, FieldValue::Null) {
                // Equality against NULL never matches; callers mean IS NULL.
                clauses.push(format!("{} IS NULL", quote_ident(field)));
            } else {
                clauses.push(format!("{} = ?", quote_ident(field)));
                params.push(value.clone());
            }
        }
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    if !query.order.is_empty() {
        let mut keys = Vec::with_capacity(query.order.len());
        for key in &query.order {
            check_identifier(&key.field)?;
            keys.push(format!(
                "{} {}",
                quote_ident(&key.field),
                if key.descending { "DESC" } else { "ASC" }
            ));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }

    if query.limit > 0 {
        sql.push_str(" LIMIT ?");
        params.push(FieldValue::Int(query.limit));
    }
    if query.offset > 0 {
        if query.limit <= 0 {
            // SQLite requires LIMIT before OFFSET; -1 means unlimited.
            sql.push_str(" LIMIT -1");
        }
        sql.push_str(" OFFSET ?");
        params.push(FieldValue::Int(query.offset));
    }

    Ok((sql, params))
}

fn build_insert(table: &str, fields: &FieldMap) -> DaoResult<String> {
    check_identifier(table)?;
    if fields.is_empty() {
        return Ok(format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING *",
            quote_ident(table)
        ));
    }

    let mut columns = Vec::with_capacity(fields.len());
    for field in fields.keys() {
        check_identifier(field)?;
        columns.push(quote_ident(field));
    }
    let placeholders = vec!["?"; fields.len()].join(", ");
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        quote_ident(table),
        columns.join(", "),
        placeholders
    ))
}

fn build_update(table: &str, key_field: &str, fields: &FieldMap) -> DaoResult<String> {
    check_identifier(table)?;
    check_identifier(key_field)?;

    let mut assignments = Vec::with_capacity(fields.len());
    for field in fields.keys() {
        check_identifier(field)?;
        assignments.push(format!("{} = ?", quote_ident(field)));
    }
    Ok(format!(
        "UPDATE {} SET {} WHERE {} = ? RETURNING *",
        quote_ident(table),
        assignments.join(", "),
        quote_ident(key_field)
    ))
}

// =============================================================================
// Parameter Binding
// =============================================================================

/// Bind a field value to a SQLite query.
fn bind_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q FieldValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        FieldValue::Null => query.bind(None::<String>),
        FieldValue::Bool(v) => query.bind(*v),
        FieldValue::Int(v) => query.bind(*v),
        FieldValue::Float(v) => query.bind(*v),
        FieldValue::Text(v) => query.bind(v.as_str()),
        // SQLite has no native JSON type; store as text.
        FieldValue::Json(v) => query.bind(v.to_string()),
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Logical category for SQLite column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCategory {
    Integer,
    Float,
    Boolean,
    Binary,
    Text,
}

fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower.contains("int") {
        return TypeCategory::Integer;
    }
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }
    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "numeric"
    {
        return TypeCategory::Float;
    }
    if lower.contains("blob") || lower.contains("binary") {
        return TypeCategory::Binary;
    }
    // varchar, text, char, date, time, json-as-text, and everything else.
    TypeCategory::Text
}

/// Decode a full row into an owned record, keyed by column name.
///
/// The record is the detachment carrier: after this call nothing references
/// driver-owned memory.
fn row_to_record(row: &SqliteRow) -> Record {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let category = categorize_type(col.type_info().name());
            (col.name().to_string(), decode_column(row, idx, category))
        })
        .collect()
}

fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
    match category {
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Boolean => decode_boolean(row, idx),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Binary => decode_binary(row, idx),
        TypeCategory::Text => decode_text(row, idx),
    }
}

fn decode_integer(row: &SqliteRow, idx: usize) -> JsonValue {
    row.try_get::<Option<i64>, _>(idx)
        .ok()
        .flatten()
        .map(|v| JsonValue::Number(v.into()))
        .unwrap_or(JsonValue::Null)
}

fn decode_boolean(row: &SqliteRow, idx: usize) -> JsonValue {
    row.try_get::<Option<bool>, _>(idx)
        .ok()
        .flatten()
        .map(JsonValue::Bool)
        .unwrap_or(JsonValue::Null)
}

fn decode_float(row: &SqliteRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    JsonValue::Null
}

fn decode_binary(row: &SqliteRow, idx: usize) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    row.try_get::<Option<Vec<u8>>, _>(idx)
        .ok()
        .flatten()
        .map(|bytes| match std::str::from_utf8(&bytes) {
            Ok(s) => JsonValue::String(s.to_string()),
            Err(_) => JsonValue::String(STANDARD.encode(&bytes)),
        })
        .unwrap_or(JsonValue::Null)
}

fn decode_text(row: &SqliteRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
        return JsonValue::String(v);
    }
    // Expression columns (e.g. COUNT(*)) report no declared type; fall back
    // to the numeric decoders before giving up.
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null);
    }
    JsonValue::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SortKey;

    #[test]
    fn test_check_identifier_accepts_plain_names() {
        assert!(check_identifier("users").is_ok());
        assert!(check_identifier("created_at").is_ok());
        assert!(check_identifier("_private").is_ok());
    }

    #[test]
    fn test_check_identifier_rejects_injection() {
        assert!(check_identifier("users; DROP TABLE users").is_err());
        assert!(check_identifier("na\"me").is_err());
        assert!(check_identifier("").is_err());
        assert!(check_identifier("1st").is_err());
    }

    #[test]
    fn test_build_select_plain() {
        let (sql, params) = build_select("users", &SelectQuery::new()).unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_build_select_filters_are_anded() {
        let query = SelectQuery::new().filter("age", 30).filter("name", "Ada");
        let (sql, params) = build_select("users", &query).unwrap();
        // BTreeMap iterates in key order.
        assert_eq!(
            sql,
            "SELECT * FROM \"users\" WHERE \"age\" = ? AND \"name\" = ?"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_build_select_null_filter_becomes_is_null() {
        let query = SelectQuery::new().filter("email", FieldValue::Null);
        let (sql, params) = build_select("users", &query).unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\" WHERE \"email\" IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_build_select_limit_offset() {
        let query = SelectQuery::new().limit(10).offset(20);
        let (sql, params) = build_select("users", &query).unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\" LIMIT ? OFFSET ?");
        assert_eq!(params, vec![FieldValue::Int(10), FieldValue::Int(20)]);
    }

    #[test]
    fn test_build_select_offset_without_limit() {
        let query = SelectQuery::new().offset(5);
        let (sql, params) = build_select("users", &query).unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\" LIMIT -1 OFFSET ?");
        assert_eq!(params, vec![FieldValue::Int(5)]);
    }

    #[test]
    fn test_build_select_nonpositive_bounds_are_ignored() {
        let query = SelectQuery::new().limit(0).offset(-3);
        let (sql, params) = build_select("users", &query).unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_build_select_order_by() {
        let query = SelectQuery::new()
            .sort(SortKey::desc("age"))
            .sort(SortKey::asc("name"));
        let (sql, _) = build_select("users", &query).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"users\" ORDER BY \"age\" DESC, \"name\" ASC"
        );
    }

    #[test]
    fn test_build_insert() {
        let fields = crate::fields! { "age" => 30, "name" => "Ada" };
        let sql = build_insert("users", &fields).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"users\" (\"age\", \"name\") VALUES (?, ?) RETURNING *"
        );
    }

    #[test]
    fn test_build_insert_empty_uses_defaults() {
        let sql = build_insert("users", &FieldMap::new()).unwrap();
        assert_eq!(sql, "INSERT INTO \"users\" DEFAULT VALUES RETURNING *");
    }

    #[test]
    fn test_build_update() {
        let fields = crate::fields! { "name" => "Bob" };
        let sql = build_update("users", "id", &fields).unwrap();
        assert_eq!(
            sql,
            "UPDATE \"users\" SET \"name\" = ? WHERE \"id\" = ? RETURNING *"
        );
    }

    #[test]
    fn test_build_rejects_bad_table() {
        let err = build_select("users--", &SelectQuery::new()).unwrap_err();
        assert!(matches!(err, DaoError::InvalidInput { .. }));
    }

    #[test]
    fn test_categorize_type() {
        assert_eq!(categorize_type("INTEGER"), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT"), TypeCategory::Integer);
        assert_eq!(categorize_type("BOOLEAN"), TypeCategory::Boolean);
        assert_eq!(categorize_type("REAL"), TypeCategory::Float);
        assert_eq!(categorize_type("NUMERIC"), TypeCategory::Float);
        assert_eq!(categorize_type("BLOB"), TypeCategory::Binary);
        assert_eq!(categorize_type("TEXT"), TypeCategory::Text);
        assert_eq!(categorize_type("DATETIME"), TypeCategory::Text);
    }
}
