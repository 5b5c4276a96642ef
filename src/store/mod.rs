//! Store abstraction layer.
//!
//! The DAO depends only on the [`Store`] and [`UnitOfWork`] traits: open a
//! scoped unit of work, run reads/writes over it, commit or roll back,
//! dispose the pool. A `sqlx`-backed SQLite implementation lives in
//! [`sqlite`]; other backends implement the same traits.

pub mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::entity::{FieldMap, FieldValue, Record};
use crate::error::DaoResult;

/// A sort key for caller-specified ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    /// Ascending order on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    /// Descending order on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Description of a filtered, sorted, paginated read.
///
/// Filters are equality predicates combined with AND; a `Null` filter value
/// matches rows where the column is NULL. `limit <= 0` means no limit,
/// `offset <= 0` means no skip. Without sort keys, row order is
/// store-default and unspecified.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub filters: FieldMap,
    pub order: Vec<SortKey>,
    pub limit: i64,
    pub offset: i64,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality filter.
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    /// Append a sort key.
    pub fn sort(mut self, key: SortKey) -> Self {
        self.order.push(key);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Owner of the physical connections behind a DAO.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Acquire a scoped unit of work from the pool.
    ///
    /// Fails with `PoolExhausted` or `Connection` if no connection can be
    /// acquired; no partial state is left behind in that case.
    async fn begin(&self) -> DaoResult<Box<dyn UnitOfWork>>;

    /// Dispose all pooled resources. Idempotent.
    async fn dispose(&self) -> DaoResult<()>;

    /// Whether [`dispose`](Store::dispose) has run.
    fn is_disposed(&self) -> bool;
}

/// A scoped, single-use handle over which one logical operation executes.
///
/// Implementations must guarantee rollback when the handle is dropped
/// without [`commit`](UnitOfWork::commit), so no exit path can leak a
/// connection or half-applied writes. Writes are flushed and generated
/// fields refreshed into the returned [`Record`]s before the handle is
/// released.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Fetch a single row by primary key.
    async fn fetch_by_key(
        &mut self,
        table: &str,
        key_field: &str,
        key: &FieldValue,
    ) -> DaoResult<Option<Record>>;

    /// Run a filtered, sorted, paginated select.
    async fn select(&mut self, table: &str, query: &SelectQuery) -> DaoResult<Vec<Record>>;

    /// Insert a row and return it with generated fields populated.
    async fn insert(&mut self, table: &str, fields: &FieldMap) -> DaoResult<Record>;

    /// Apply a partial update to the row with the given key.
    ///
    /// Returns `None` if the key is absent. An empty field map re-reads the
    /// row without modifying it.
    async fn update_fields(
        &mut self,
        table: &str,
        key_field: &str,
        key: &FieldValue,
        fields: &FieldMap,
    ) -> DaoResult<Option<Record>>;

    /// Delete the row with the given key. Returns whether a row was deleted.
    async fn delete_by_key(
        &mut self,
        table: &str,
        key_field: &str,
        key: &FieldValue,
    ) -> DaoResult<bool>;

    /// Execute an arbitrary statement, returning the affected row count.
    async fn execute(&mut self, sql: &str, params: &[FieldValue]) -> DaoResult<u64>;

    /// Run an arbitrary query, returning raw records.
    async fn fetch_all(&mut self, sql: &str, params: &[FieldValue]) -> DaoResult<Vec<Record>>;

    /// Flush and commit the unit of work.
    async fn commit(self: Box<Self>) -> DaoResult<()>;

    /// Roll the unit of work back explicitly.
    async fn rollback(self: Box<Self>) -> DaoResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_constructors() {
        let key = SortKey::asc("name");
        assert_eq!(key.field, "name");
        assert!(!key.descending);

        let key = SortKey::desc("created_at");
        assert!(key.descending);
    }

    #[test]
    fn test_select_query_builder() {
        let query = SelectQuery::new()
            .filter("status", "active")
            .filter("age", 30)
            .sort(SortKey::desc("age"))
            .limit(10)
            .offset(5);

        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.order.len(), 1);
        assert_eq!(query.limit, 10);
        assert_eq!(query.offset, 5);
    }
}
