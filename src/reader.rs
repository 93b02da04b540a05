use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use serde_json::Value;
use tokio::sync::watch;

use crate::{
    cache::QueryCache,
    error::{BackendError, HookError},
    models::{Record, Table},
    repository::{QueryOptions, StoreState, decode},
};

/// Records
///
/// What a read produced: a list, or the single row asked for with `single`.
#[derive(Debug, Clone, PartialEq)]
pub enum Records<T> {
    List(Vec<T>),
    Single(Option<T>),
}

impl<T> Records<T> {
    pub fn into_list(self) -> Vec<T> {
        match self {
            Records::List(rows) => rows,
            Records::Single(row) => row.into_iter().collect(),
        }
    }

    pub fn into_single(self) -> Option<T> {
        match self {
            Records::List(rows) => rows.into_iter().next(),
            Records::Single(row) => row,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Records::List(rows) => rows.len(),
            Records::Single(row) => usize::from(row.is_some()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// ReadState
///
/// The reactive `{data, loading, error}` triple of a public read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadState<T> {
    pub data: Records<T>,
    pub loading: bool,
    pub error: Option<HookError>,
}

impl<T> ReadState<T> {
    fn initial(single: bool) -> Self {
        Self {
            data: if single {
                Records::Single(None)
            } else {
                Records::List(Vec::new())
            },
            loading: true,
            error: None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|err| err.message.as_str())
    }

    /// The data, or the error if the last read failed.
    pub fn into_result(self) -> Result<Records<T>, HookError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.data),
        }
    }
}

struct Inner<T> {
    store: StoreState,
    cache: Option<QueryCache>,
    options: QueryOptions,
    table: Mutex<Table>,
    state: watch::Sender<ReadState<T>>,
    // Id of the most recently issued read; only that read may commit.
    latest: AtomicU64,
    mounted: AtomicBool,
}

/// ContentQuery
///
/// Public read of one table: always restricted to published rows, result kept
/// in a watch channel that subscribers can follow. Clones share state.
///
/// Reads are numbered and only the most recent one commits, so an older
/// response arriving late never overwrites a newer one. After `unmount` no
/// response commits at all.
pub struct ContentQuery<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ContentQuery<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Record + Clone> ContentQuery<T> {
    pub fn new(store: StoreState, cache: Option<QueryCache>, options: QueryOptions) -> Self {
        let (state, _) = watch::channel(ReadState::initial(options.single));
        Self {
            inner: Arc::new(Inner {
                store,
                cache,
                options,
                table: Mutex::new(T::TABLE),
                state,
                latest: AtomicU64::new(0),
                mounted: AtomicBool::new(true),
            }),
        }
    }

    /// Performs the initial read.
    pub async fn mount(&self) {
        self.inner.mounted.store(true, Ordering::SeqCst);
        self.fetch(true).await;
    }

    /// Reads again, always from the backend.
    pub async fn refetch(&self) {
        self.fetch(false).await;
    }

    /// Points the query at another table and reads it. Only `T`'s own table
    /// decodes into `T`; any other table settles with an `InvalidQuery` error
    /// and no backend read.
    pub async fn set_table(&self, table: Table) {
        {
            let mut current = self.inner.table.lock().unwrap_or_else(|e| e.into_inner());
            *current = table;
        }
        self.fetch(true).await;
    }

    /// Stops committing results. Reads still in flight are discarded when they land.
    pub fn unmount(&self) {
        self.inner.mounted.store(false, Ordering::SeqCst);
    }

    pub fn table(&self) -> Table {
        *self.inner.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ReadState<T> {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReadState<T>> {
        self.inner.state.subscribe()
    }

    async fn fetch(&self, use_cache: bool) {
        if !self.inner.mounted.load(Ordering::SeqCst) {
            return;
        }
        let id = self.inner.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let table = self.table();
        self.inner.state.send_modify(|state| state.loading = true);

        let result = self.load(table, use_cache).await;

        if !self.inner.mounted.load(Ordering::SeqCst) {
            tracing::debug!(%table, read = id, "dropping read that landed after unmount");
            return;
        }
        self.inner.state.send_if_modified(|state| {
            if self.inner.latest.load(Ordering::SeqCst) != id {
                tracing::debug!(%table, read = id, "dropping stale read");
                return false;
            }
            state.loading = false;
            match result {
                Ok(data) => {
                    state.data = data;
                    state.error = None;
                }
                Err(err) => {
                    tracing::warn!(%table, error = %err, "content read failed");
                    state.error = Some(HookError::from(err));
                }
            }
            true
        });
    }

    async fn load(&self, table: Table, use_cache: bool) -> Result<Records<T>, BackendError> {
        if table != T::TABLE {
            return Err(BackendError::InvalidQuery(format!(
                "{table} rows cannot be read as {} records",
                T::TABLE
            )));
        }
        if !table.has_published_flag() {
            return Err(BackendError::NotPublic { table });
        }
        let query = self.inner.options.to_query().published_only();

        let cached = match (&self.inner.cache, use_cache) {
            (Some(cache), true) => cache.get(table, &query).await,
            _ => None,
        };
        let rows: Vec<Value> = match cached {
            Some(rows) => {
                tracing::debug!(%table, "content cache hit");
                rows.as_ref().clone()
            }
            None => {
                let generation = self.inner.cache.as_ref().map(|cache| cache.generation(table));
                let rows = self.inner.store.select(table, &query).await?;
                if let (Some(cache), Some(generation)) = (&self.inner.cache, generation) {
                    cache.insert(table, &query, rows.clone(), generation).await;
                }
                rows
            }
        };

        let mut decoded = rows.into_iter().map(decode::<T>).collect::<Result<Vec<_>, _>>()?;
        Ok(if query.single {
            Records::Single(decoded.pop())
        } else {
            Records::List(decoded)
        })
    }
}
