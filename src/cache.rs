use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use moka::future::Cache;
use serde_json::Value;

use crate::{models::Table, repository::Query};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    table: Table,
    query: String,
}

impl CacheKey {
    fn new(table: Table, query: &Query) -> Self {
        Self {
            table,
            query: query.cache_key(),
        }
    }
}

/// QueryCache
///
/// Shared read cache for public content, keyed by table and resolved query.
/// Entries expire after the configured TTL and are dropped per table whenever
/// an admin write touches that table. Clones share the same entries.
///
/// Each table carries a generation that every invalidation bumps. A reader
/// takes the generation before it goes to the backend and hands it back to
/// `insert`; rows read before a write are never cached after it.
#[derive(Clone)]
pub struct QueryCache {
    inner: Cache<CacheKey, Arc<Vec<Value>>>,
    generations: Arc<Mutex<HashMap<Table, u64>>>,
}

impl QueryCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();
        Self {
            inner,
            generations: Arc::default(),
        }
    }

    /// Current generation of `table`. Pass it to `insert` with the rows read after this call.
    pub fn generation(&self, table: Table) -> u64 {
        let generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
        generations.get(&table).copied().unwrap_or(0)
    }

    pub async fn get(&self, table: Table, query: &Query) -> Option<Arc<Vec<Value>>> {
        self.inner.get(&CacheKey::new(table, query)).await
    }

    /// Caches rows read at `generation`. Returns false, caching nothing, when
    /// the table was invalidated since.
    pub async fn insert(&self, table: Table, query: &Query, rows: Vec<Value>, generation: u64) -> bool {
        if self.generation(table) != generation {
            tracing::debug!(%table, "not caching rows read before an invalidation");
            return false;
        }
        let key = CacheKey::new(table, query);
        self.inner.insert(key.clone(), Arc::new(rows)).await;

        // An invalidation that landed between the check and the insert may
        // have swept the table before this entry existed.
        if self.generation(table) != generation {
            self.inner.invalidate(&key).await;
            return false;
        }
        true
    }

    /// Drops every cached read of `table`.
    pub fn invalidate_table(&self, table: Table) {
        {
            let mut generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
            *generations.entry(table).or_default() += 1;
        }
        if let Err(err) = self.inner.invalidate_entries_if(move |key, _| key.table == table) {
            // Only fails when closures are unsupported; fall back to a full flush.
            tracing::warn!(%table, "cache predicate rejected ({err}), flushing everything");
            self.inner.invalidate_all();
        }
    }
}
