use std::{future::Future, marker::PhantomData, sync::Arc};

use serde_json::{Value, json};
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    cache::QueryCache,
    error::{BackendError, HookError},
    models::{Draft, Record},
    repository::{PUBLISHED, Query, QueryOptions, StoreState, decode},
};

/// CrudState
///
/// `{loading, error}` shared by every operation of one handle. `loading` stays
/// set while any operation is in flight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrudState {
    pub loading: bool,
    pub error: Option<HookError>,
    in_flight: usize,
}

/// CrudHandle
///
/// Admin access to one table: unrestricted reads plus create, update, delete
/// and publish toggling. Calls are independent; concurrent writes to the same
/// row resolve last-write-wins at the backend.
///
/// Successful writes drop the table's entries from the shared content cache.
pub struct CrudHandle<T> {
    store: StoreState,
    cache: Option<QueryCache>,
    state: Arc<watch::Sender<CrudState>>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for CrudHandle<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cache: self.cache.clone(),
            state: Arc::clone(&self.state),
            _record: PhantomData,
        }
    }
}

impl<T: Record> CrudHandle<T> {
    pub fn new(store: StoreState, cache: Option<QueryCache>) -> Self {
        let (state, _) = watch::channel(CrudState::default());
        Self {
            store,
            cache,
            state: Arc::new(state),
            _record: PhantomData,
        }
    }

    pub fn state(&self) -> CrudState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CrudState> {
        self.state.subscribe()
    }

    /// Inserts a validated draft and returns the stored row.
    pub async fn create<D: Draft>(&self, mut draft: D) -> Result<T, BackendError> {
        self.track(async {
            draft.validate()?;
            let row = self.store.insert(T::TABLE, serde_json::to_value(&draft)?).await?;
            self.invalidate();
            tracing::info!(table = %T::TABLE, "record created");
            decode(row)
        })
        .await
    }

    /// Inserts a validated draft without reading it back, for tables the
    /// caller may write but not read (the public contact form).
    pub async fn submit<D: Draft>(&self, mut draft: D) -> Result<(), BackendError> {
        self.track(async {
            draft.validate()?;
            self.store.append(T::TABLE, serde_json::to_value(&draft)?).await?;
            self.invalidate();
            Ok::<_, BackendError>(())
        })
        .await
    }

    /// Every row regardless of `published`, filtered/ordered/limited by `options`.
    pub async fn get_all(&self, options: &QueryOptions) -> Result<Vec<T>, BackendError> {
        self.track(async {
            let rows = self.store.select(T::TABLE, &options.to_query()).await?;
            rows.into_iter().map(decode).collect::<Result<Vec<T>, _>>()
        })
        .await
    }

    /// One row by id; `NotFound` when it does not exist.
    pub async fn get_one(&self, id: Uuid) -> Result<T, BackendError> {
        self.track(async {
            let rows = self.store.select(T::TABLE, &Query::by_id(id)).await?;
            let row = rows
                .into_iter()
                .next()
                .ok_or(BackendError::NotFound { table: T::TABLE })?;
            decode(row)
        })
        .await
    }

    /// Partial update with a validated patch; only the fields it carries change.
    pub async fn update<D: Draft>(&self, id: Uuid, mut patch: D) -> Result<T, BackendError> {
        self.track(async {
            patch.validate()?;
            self.write(id, serde_json::to_value(&patch)?).await
        })
        .await
    }

    /// Permanent delete.
    pub async fn remove(&self, id: Uuid) -> Result<(), BackendError> {
        self.track(async {
            self.store.delete(T::TABLE, id).await?;
            self.invalidate();
            tracing::info!(table = %T::TABLE, %id, "record removed");
            Ok::<_, BackendError>(())
        })
        .await
    }

    /// Flips the publish flag from the value the caller last saw.
    pub async fn toggle_published(&self, id: Uuid, current: bool) -> Result<T, BackendError> {
        self.track(async {
            if !T::TABLE.has_published_flag() {
                return Err(BackendError::NotPublic { table: T::TABLE });
            }
            self.write(id, json!({ PUBLISHED: !current })).await
        })
        .await
    }

    async fn write(&self, id: Uuid, fields: Value) -> Result<T, BackendError> {
        let row = self.store.update(T::TABLE, id, fields).await?;
        self.invalidate();
        tracing::info!(table = %T::TABLE, %id, "record updated");
        decode(row)
    }

    fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_table(T::TABLE);
        }
    }

    /// Runs one operation between the loading/error bookkeeping.
    async fn track<R>(&self, op: impl Future<Output = Result<R, BackendError>>) -> Result<R, BackendError> {
        self.state.send_modify(|state| {
            state.in_flight += 1;
            state.loading = true;
            state.error = None;
        });

        let result = op.await;

        self.state.send_modify(|state| {
            state.in_flight = state.in_flight.saturating_sub(1);
            state.loading = state.in_flight > 0;
            if let Err(err) = &result {
                state.error = Some(HookError::from(err));
            }
        });
        result
    }
}
