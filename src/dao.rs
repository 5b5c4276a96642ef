//! Generic data-access object over a pooled store.
//!
//! A [`Dao`] pairs one entity type with one store and exposes the full
//! operation surface: keyed reads, filtered lists, create/update/upsert/
//! delete, deferred (`_ff`) variants of the writes, a custom escape hatch,
//! and `close`.
//!
//! Every operation runs inside its own unit of work: acquired from the pool,
//! committed on success, rolled back on any error, released on every exit
//! path. Returned entities are detached snapshots; mutating them does not
//! touch the store.

use futures_util::future::BoxFuture;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::entity::{Entity, FieldMap, FieldValue, detach};
use crate::error::{DaoError, DaoResult};
use crate::executor::{BackgroundExecutor, FfHandle};
use crate::store::{SelectQuery, SortKey, SqliteStore, Store, UnitOfWork};

/// Data-access object for entity `E` backed by store `S`.
///
/// Cloning is cheap and shares the underlying pool and closed flag.
pub struct Dao<E: Entity, S: Store = SqliteStore> {
    store: Arc<S>,
    executor: Option<Arc<BackgroundExecutor>>,
    closed: Arc<AtomicBool>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Dao<E, SqliteStore> {
    /// Open a DAO over a SQLite store, creating the database file if needed.
    pub async fn connect(config: &StoreConfig) -> DaoResult<Self> {
        let store = SqliteStore::connect(config).await?;
        info!(
            entity = std::any::type_name::<E>(),
            table = E::TABLE,
            "DAO connected"
        );
        Ok(Self::with_store(store))
    }
}

impl<E: Entity, S: Store> Dao<E, S> {
    /// Wrap an already-connected store.
    pub fn with_store(store: S) -> Self {
        Self {
            store: Arc::new(store),
            executor: None,
            closed: Arc::new(AtomicBool::new(false)),
            _entity: PhantomData,
        }
    }

    /// Use a specific executor for deferred writes instead of the shared one.
    pub fn with_background_executor(mut self, executor: Arc<BackgroundExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// The underlying store, e.g. for schema setup.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether [`close`](Dao::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn assert_open(&self) {
        assert!(
            !self.is_closed(),
            "DAO for {} used after close()",
            std::any::type_name::<E>()
        );
    }

    fn executor(&self) -> Arc<BackgroundExecutor> {
        self.executor
            .clone()
            .unwrap_or_else(BackgroundExecutor::global)
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    /// Fetch the entity with the given key, or `None` if absent.
    pub async fn get(&self, key: E::Key) -> DaoResult<Option<E>> {
        self.assert_open();
        Self::get_op(&self.store, key.into()).await
    }

    /// Existence-check entry point: the snapshot if the key is present,
    /// `None` otherwise. Same read contract as [`get`](Dao::get), but runs
    /// as a filtered select rather than a keyed fetch.
    pub async fn exists(&self, key: E::Key) -> DaoResult<Option<E>> {
        self.assert_open();
        let query = SelectQuery::new()
            .filter(E::key_field(), key.into())
            .limit(1);
        let mut found = Self::select_op(&self.store, query).await?;
        Ok(found.pop())
    }

    /// List entities in store-default order.
    ///
    /// `limit <= 0` means no limit; `offset <= 0` means no skip.
    pub async fn list(&self, limit: i64, offset: i64) -> DaoResult<Vec<E>> {
        self.list_by(FieldMap::new(), limit, offset).await
    }

    /// List entities matching all equality filters, paginated.
    pub async fn list_by(
        &self,
        filters: FieldMap,
        limit: i64,
        offset: i64,
    ) -> DaoResult<Vec<E>> {
        self.assert_open();
        let query = SelectQuery {
            filters,
            order: Vec::new(),
            limit,
            offset,
        };
        Self::select_op(&self.store, query).await
    }

    /// List entities matching all filters, sorted and paginated.
    ///
    /// `limit <= 0` means no limit; `offset <= 0` means no skip.
    pub async fn list_by_order_by(
        &self,
        filters: FieldMap,
        order: Vec<SortKey>,
        limit: i64,
        offset: i64,
    ) -> DaoResult<Vec<E>> {
        self.assert_open();
        let query = SelectQuery {
            filters,
            order,
            limit,
            offset,
        };
        Self::select_op(&self.store, query).await
    }

    // -------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------

    /// Insert a new entity from the given fields and return it with
    /// store-generated fields populated.
    pub async fn create(&self, fields: FieldMap) -> DaoResult<E> {
        self.assert_open();
        Self::create_op(&self.store, fields).await
    }

    /// Apply a partial update to the entity with the given key.
    ///
    /// Returns the updated snapshot, or `None` if the key is absent. An
    /// empty field map returns the current snapshot unchanged.
    pub async fn update(&self, key: E::Key, fields: FieldMap) -> DaoResult<Option<E>> {
        self.assert_open();
        Self::update_op(&self.store, key.into(), fields).await
    }

    /// Update the entity with the given key, inserting it if absent.
    ///
    /// Unlike [`create`](Dao::create), the insert path stores the
    /// caller-supplied key rather than generating one; if `fields` also
    /// names the key column, the `key` argument takes precedence. The
    /// check-and-write runs inside one unit of work.
    pub async fn upsert(&self, key: E::Key, fields: FieldMap) -> DaoResult<E> {
        self.assert_open();
        Self::upsert_op(&self.store, key.into(), fields).await
    }

    /// Delete the entity with the given key. Returns whether a row was
    /// deleted; deleting an absent key is not an error.
    pub async fn delete(&self, key: E::Key) -> DaoResult<bool> {
        self.assert_open();
        Self::delete_op(&self.store, key.into()).await
    }

    // -------------------------------------------------------------------
    // Fire-and-forget writes
    // -------------------------------------------------------------------

    /// Deferred [`create`](Dao::create). Returns immediately; the handle
    /// delivers the same result the synchronous call would.
    pub fn create_ff(&self, fields: FieldMap) -> FfHandle<E> {
        self.assert_open();
        let store = Arc::clone(&self.store);
        self.executor().submit(async move {
            let result = Self::create_op(&store, fields).await;
            Self::report_background("create", &result);
            result
        })
    }

    /// Deferred [`update`](Dao::update).
    pub fn update_ff(&self, key: E::Key, fields: FieldMap) -> FfHandle<Option<E>> {
        self.assert_open();
        let store = Arc::clone(&self.store);
        let key = key.into();
        self.executor().submit(async move {
            let result = Self::update_op(&store, key, fields).await;
            Self::report_background("update", &result);
            result
        })
    }

    /// Deferred [`upsert`](Dao::upsert).
    pub fn upsert_ff(&self, key: E::Key, fields: FieldMap) -> FfHandle<E> {
        self.assert_open();
        let store = Arc::clone(&self.store);
        let key = key.into();
        self.executor().submit(async move {
            let result = Self::upsert_op(&store, key, fields).await;
            Self::report_background("upsert", &result);
            result
        })
    }

    /// Deferred [`delete`](Dao::delete).
    pub fn delete_ff(&self, key: E::Key) -> FfHandle<bool> {
        self.assert_open();
        let store = Arc::clone(&self.store);
        let key = key.into();
        self.executor().submit(async move {
            let result = Self::delete_op(&store, key).await;
            Self::report_background("delete", &result);
            result
        })
    }

    // -------------------------------------------------------------------
    // Escape hatch and lifecycle
    // -------------------------------------------------------------------

    /// Run caller-supplied work inside one managed unit of work.
    ///
    /// The closure gets the raw unit of work; commit and rollback stay with
    /// the DAO. Returning `Err` rolls everything back.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let n = dao
    ///     .run_custom(|uow| {
    ///         Box::pin(async move {
    ///             uow.execute("UPDATE users SET age = age + 1", &[]).await
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn run_custom<T, F>(&self, f: F) -> DaoResult<T>
    where
        T: Send,
        F: for<'u> FnOnce(&'u mut (dyn UnitOfWork + 'u)) -> BoxFuture<'u, DaoResult<T>> + Send,
    {
        self.assert_open();
        let mut uow = self.store.begin().await?;
        let result = f(uow.as_mut()).await;
        Self::finish(uow, result).await
    }

    /// Close the DAO and dispose its pool. Idempotent.
    ///
    /// Disposal failures are logged, never returned. Any operation after
    /// `close` panics.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.store.dispose().await {
            error!(
                entity = std::any::type_name::<E>(),
                error = %err,
                "Error disposing store during close"
            );
        }
        info!(entity = std::any::type_name::<E>(), "DAO closed");
    }

    // -------------------------------------------------------------------
    // Shared operation bodies
    // -------------------------------------------------------------------

    async fn get_op(store: &S, key: FieldValue) -> DaoResult<Option<E>> {
        let mut uow = store.begin().await?;
        let result = match uow.fetch_by_key(E::TABLE, E::key_field(), &key).await {
            Ok(Some(record)) => detach::<E>(record).map(Some),
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        };
        Self::finish(uow, result).await
    }

    async fn select_op(store: &S, query: SelectQuery) -> DaoResult<Vec<E>> {
        let mut uow = store.begin().await?;
        let result = match uow.select(E::TABLE, &query).await {
            Ok(records) => records.into_iter().map(detach::<E>).collect(),
            Err(err) => Err(err),
        };
        Self::finish(uow, result).await
    }

    async fn create_op(store: &S, fields: FieldMap) -> DaoResult<E> {
        debug!(table = E::TABLE, fields = fields.len(), "Creating entity");
        let mut uow = store.begin().await?;
        let result = match uow.insert(E::TABLE, &fields).await {
            Ok(record) => detach::<E>(record),
            Err(err) => Err(err),
        };
        Self::finish(uow, result).await
    }

    async fn update_op(store: &S, key: FieldValue, fields: FieldMap) -> DaoResult<Option<E>> {
        debug!(table = E::TABLE, fields = fields.len(), "Updating entity");
        let mut uow = store.begin().await?;
        let result = match uow
            .update_fields(E::TABLE, E::key_field(), &key, &fields)
            .await
        {
            Ok(Some(record)) => detach::<E>(record).map(Some),
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        };
        Self::finish(uow, result).await
    }

    async fn upsert_op(store: &S, key: FieldValue, fields: FieldMap) -> DaoResult<E> {
        debug!(table = E::TABLE, fields = fields.len(), "Upserting entity");
        let mut uow = store.begin().await?;
        let result = async {
            let existing = uow.fetch_by_key(E::TABLE, E::key_field(), &key).await?;
            let record = if existing.is_some() {
                uow.update_fields(E::TABLE, E::key_field(), &key, &fields)
                    .await?
                    .ok_or_else(|| DaoError::internal("row vanished during upsert"))?
            } else {
                let mut insert_fields = fields;
                insert_fields.insert(E::key_field().to_string(), key.clone());
                uow.insert(E::TABLE, &insert_fields).await?
            };
            detach::<E>(record)
        }
        .await;
        Self::finish(uow, result).await
    }

    async fn delete_op(store: &S, key: FieldValue) -> DaoResult<bool> {
        let mut uow = store.begin().await?;
        let result = uow.delete_by_key(E::TABLE, E::key_field(), &key).await;
        Self::finish(uow, result).await
    }

    /// Commit on success, roll back on error. The unit of work is consumed
    /// either way, so no exit path can leak a connection.
    async fn finish<T>(uow: Box<dyn UnitOfWork>, result: DaoResult<T>) -> DaoResult<T> {
        match result {
            Ok(value) => {
                uow.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    fn report_background<T>(op: &'static str, result: &DaoResult<T>) {
        if let Err(err) = result {
            error!(
                entity = std::any::type_name::<E>(),
                op,
                error = %err,
                "Background operation failed"
            );
        }
    }
}

impl<E: Entity, S: Store> Clone for Dao<E, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            executor: self.executor.clone(),
            closed: Arc::clone(&self.closed),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity, S: Store> std::fmt::Debug for Dao<E, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dao")
            .field("entity", &std::any::type_name::<E>())
            .field("table", &E::TABLE)
            .field("closed", &self.is_closed())
            .finish()
    }
}
