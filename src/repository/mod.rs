use std::{collections::BTreeMap, fmt::Write as _, sync::Arc};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::{error::BackendError, models::Table};

pub mod memory;
pub mod postgres;
pub mod rest;

pub use memory::MemoryBackend;
pub use postgres::PostgresRepository;
pub use rest::SupabaseRest;

/// Column every table is ordered by when the caller gives no order.
pub const CREATED_AT: &str = "created_at";
pub const PUBLISHED: &str = "published";

// --- Query Model ---

/// OrderBy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// QueryOptions
///
/// Caller-facing options shared by the public read hook and the admin CRUD hook.
/// Every field is optional: all columns, no extra filter, newest first, no limit,
/// list result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Comma-separated column list. `None` selects every column.
    pub select: Option<String>,
    /// Column → value equality predicates, combined with AND.
    pub filter: BTreeMap<String, Value>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    /// Expect exactly one row.
    pub single: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.select = Some(columns.into());
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(column.into(), value.into());
        self
    }

    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order_by = Some(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    /// Resolves the defaults into the query sent to the backend.
    pub fn to_query(&self) -> Query {
        Query {
            select: self.select.clone(),
            filters: self
                .filter
                .iter()
                .map(|(column, value)| Filter {
                    column: column.clone(),
                    value: value.clone(),
                })
                .collect(),
            order: Some(self.order_by.clone().unwrap_or(OrderBy {
                column: CREATED_AT.to_string(),
                ascending: false,
            })),
            limit: self.limit,
            single: self.single,
        }
    }
}

/// Filter
///
/// A single equality predicate. A `Null` value matches missing/NULL columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

/// Query
///
/// A fully resolved query against one table: what the `TableStore`
/// implementations actually execute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub select: Option<String>,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
    pub single: bool,
}

impl Query {
    /// Appends the `published = true` predicate after any caller filters.
    pub fn published_only(mut self) -> Self {
        self.filters.push(Filter {
            column: PUBLISHED.to_string(),
            value: Value::Bool(true),
        });
        self
    }

    /// Primary key lookup expecting one row.
    pub fn by_id(id: Uuid) -> Self {
        Query {
            filters: vec![Filter {
                column: "id".to_string(),
                value: Value::String(id.to_string()),
            }],
            single: true,
            ..Default::default()
        }
    }

    /// The selected column names, or `None` for every column.
    pub fn columns(&self) -> Option<Vec<&str>> {
        match self.select.as_deref().map(str::trim) {
            None | Some("") | Some("*") => None,
            Some(list) => Some(list.split(',').map(str::trim).collect()),
        }
    }

    /// Rejects column names that are not plain identifiers.
    pub fn validate(&self) -> Result<(), BackendError> {
        if let Some(columns) = self.columns() {
            for column in columns {
                check_identifier(column)?;
            }
        }
        for filter in &self.filters {
            check_identifier(&filter.column)?;
        }
        if let Some(order) = &self.order {
            check_identifier(&order.column)?;
        }
        Ok(())
    }

    /// Stable textual form, used as the cache key.
    pub fn cache_key(&self) -> String {
        let mut key = format!("select={}", self.select.as_deref().unwrap_or("*"));
        for filter in &self.filters {
            let _ = write!(key, "&{}=eq.{}", filter.column, filter.value);
        }
        if let Some(order) = &self.order {
            let dir = if order.ascending { "asc" } else { "desc" };
            let _ = write!(key, "&order={}.{}", order.column, dir);
        }
        if let Some(limit) = self.limit {
            let _ = write!(key, "&limit={limit}");
        }
        if self.single {
            key.push_str("&single");
        }
        key
    }
}

/// is_identifier
///
/// `[a-z_][a-z0-9_]*`, at most 63 bytes (the Postgres identifier limit).
pub fn is_identifier(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_lowercase() || first == b'_' => {}
        _ => return false,
    }
    name.len() <= 63 && bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

fn check_identifier(name: &str) -> Result<(), BackendError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(BackendError::InvalidQuery(format!("'{name}' is not a valid column name")))
    }
}

/// Turns a `single` result set into exactly one row.
pub fn expect_single(table: Table, mut rows: Vec<Value>) -> Result<Value, BackendError> {
    match rows.len() {
        0 => Err(BackendError::NotFound { table }),
        1 => Ok(rows.remove(0)),
        _ => Err(BackendError::MultipleRows { table }),
    }
}

/// Applies `single` semantics to an already filtered result set, the way
/// PostgREST does for an object request.
pub fn collapse_single(table: Table, query: &Query, rows: Vec<Value>) -> Result<Vec<Value>, BackendError> {
    if query.single {
        expect_single(table, rows).map(|row| vec![row])
    } else {
        Ok(rows)
    }
}

/// Decodes one backend row into its record type.
pub fn decode<T: DeserializeOwned>(row: Value) -> Result<T, BackendError> {
    serde_json::from_value(row).map_err(BackendError::from)
}

// --- Store Contract ---

/// TableStore
///
/// The table half of the backend collaborator: select/insert/update/delete
/// against a named table. Implementations: `SupabaseRest` (PostgREST over
/// HTTP), `PostgresRepository` (direct SQL) and `MemoryBackend` (in-process).
///
/// Rows travel as JSON objects so one contract serves every table.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Runs the query. When `query.single` is set the result holds exactly one
    /// row, otherwise `NotFound` / `MultipleRows` is returned.
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, BackendError>;

    /// Inserts one row and returns it with the server-assigned `id` and `created_at`.
    async fn insert(&self, table: Table, row: Value) -> Result<Value, BackendError>;

    /// Inserts one row without reading it back (for callers with insert-only access).
    async fn append(&self, table: Table, row: Value) -> Result<(), BackendError> {
        self.insert(table, row).await.map(|_| ())
    }

    /// Partial update by primary key; returns the updated row or `NotFound`.
    async fn update(&self, table: Table, id: Uuid, patch: Value) -> Result<Value, BackendError>;

    /// Permanent delete by primary key. Deleting a missing row is not an error.
    async fn delete(&self, table: Table, id: Uuid) -> Result<(), BackendError>;

    /// A store whose requests run as the given session, so the backend's access
    /// policy sees the signed-in user instead of the anonymous key.
    fn with_access_token(&self, access_token: &str) -> StoreState;
}

/// StoreState
///
/// The shared, process-wide handle to the table store.
pub type StoreState = Arc<dyn TableStore>;
