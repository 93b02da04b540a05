use std::{
    cmp::Ordering,
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{
    auth::AuthProvider,
    error::BackendError,
    models::{AuthSession, SessionUser, Table},
    repository::{PUBLISHED, Query, StoreState, TableStore, collapse_single},
};

/// Session lifetime reported by `sign_in`.
const SESSION_TTL_SECS: u64 = 3600;

#[derive(Default)]
struct Tables {
    rows: HashMap<Table, Vec<Value>>,
    // Strictly increasing so `created_at` ordering is total.
    last_created: Option<DateTime<Utc>>,
}

struct Account {
    id: Uuid,
    password: String,
}

#[derive(Default)]
struct Inner {
    tables: RwLock<Tables>,
    accounts: RwLock<HashMap<String, Account>>,
    sessions: RwLock<HashMap<String, SessionUser>>,
    read_delays: Mutex<VecDeque<Duration>>,
    failures: Mutex<VecDeque<String>>,
    reads: AtomicUsize,
}

/// MemoryBackend
///
/// An in-process stand-in for the hosted backend, implementing both the table
/// store and the auth collaborator. It mirrors the behaviours the hooks depend
/// on (server-assigned ids and timestamps, `published` defaulting to false,
/// unique slugs, `single` semantics, silent delete of missing rows) and adds
/// test controls for latency and failures.
///
/// Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays the next reads, one entry per `select`. Rows are captured before the
    /// delay, so a delayed read returns the data as it was when the read started.
    pub async fn delay_next_reads(&self, delays: impl IntoIterator<Item = Duration>) {
        self.inner.read_delays.lock().await.extend(delays);
    }

    /// Makes the next store or auth operation fail with the given message.
    pub async fn fail_next(&self, message: impl Into<String>) {
        self.inner.failures.lock().await.push_back(message.into());
    }

    /// Number of `select` calls served so far.
    pub fn read_count(&self) -> usize {
        self.inner.reads.load(AtomicOrdering::SeqCst)
    }

    /// Registers an account directly, bypassing sign-up.
    pub async fn register(&self, email: &str, password: &str) -> SessionUser {
        let id = Uuid::new_v4();
        self.inner.accounts.write().await.insert(
            email.to_string(),
            Account {
                id,
                password: password.to_string(),
            },
        );
        SessionUser {
            id,
            email: Some(email.to_string()),
        }
    }

    /// Raw rows of a table, in insertion order.
    pub async fn rows(&self, table: Table) -> Vec<Value> {
        self.inner
            .tables
            .read()
            .await
            .rows
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    async fn injected_failure(&self) -> Result<(), BackendError> {
        match self.inner.failures.lock().await.pop_front() {
            Some(message) => Err(BackendError::Api {
                status: 500,
                message,
            }),
            None => Ok(()),
        }
    }
}

// --- Row helpers ---

fn as_object(row: Value) -> Result<Map<String, Value>, BackendError> {
    match row {
        Value::Object(map) => Ok(map),
        _ => Err(BackendError::InvalidQuery("row must be a JSON object".into())),
    }
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn matches(row: &Value, query: &Query) -> bool {
    query
        .filters
        .iter()
        .all(|filter| row.get(&filter.column).unwrap_or(&Value::Null) == &filter.value)
}

/// Orders JSON values the way the database orders the underlying column:
/// timestamps chronologically, numbers numerically, text lexically, NULLs last.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(a), Value::String(b)) => {
            match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn project(row: &Value, columns: Option<&[&str]>) -> Value {
    match columns {
        None => row.clone(),
        Some(columns) => Value::Object(
            columns
                .iter()
                .filter_map(|c| row.get(*c).map(|v| (c.to_string(), v.clone())))
                .collect(),
        ),
    }
}

fn slug_conflict(rows: &[Value], table: Table, slug: Option<&Value>, except: Option<&str>) -> Result<(), BackendError> {
    let Some(slug) = slug.filter(|s| !s.is_null()) else {
        return Ok(());
    };
    let taken = rows
        .iter()
        .any(|r| r.get("slug") == Some(slug) && row_id(r) != except);
    if taken {
        Err(BackendError::Api {
            status: 409,
            message: format!("duplicate key value violates unique constraint \"{table}_slug_key\""),
        })
    } else {
        Ok(())
    }
}

#[async_trait]
impl TableStore for MemoryBackend {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.inner.reads.fetch_add(1, AtomicOrdering::SeqCst);
        self.injected_failure().await?;
        query.validate()?;

        let mut rows: Vec<Value> = {
            let tables = self.inner.tables.read().await;
            tables
                .rows
                .get(&table)
                .map(|rows| rows.iter().filter(|r| matches(r, query)).cloned().collect())
                .unwrap_or_default()
        };

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(
                    a.get(&order.column).unwrap_or(&Value::Null),
                    b.get(&order.column).unwrap_or(&Value::Null),
                );
                if order.ascending { ord } else { ord.reverse() }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        let columns = query.columns();
        let rows: Vec<Value> = rows.iter().map(|r| project(r, columns.as_deref())).collect();

        let delay = self.inner.read_delays.lock().await.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        collapse_single(table, query, rows)
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value, BackendError> {
        self.injected_failure().await?;
        let mut fields = as_object(row)?;

        let mut tables = self.inner.tables.write().await;
        let now = Utc::now();
        let created = match tables.last_created {
            Some(last) if last >= now => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        tables.last_created = Some(created);

        fields
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        fields
            .entry("created_at")
            .or_insert_with(|| Value::String(created.to_rfc3339()));
        if table.has_published_flag() {
            fields.entry(PUBLISHED).or_insert(Value::Bool(false));
        }

        let rows = tables.rows.entry(table).or_default();
        slug_conflict(rows, table, fields.get("slug"), None)?;
        let row = Value::Object(fields);
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: Table, id: Uuid, patch: Value) -> Result<Value, BackendError> {
        self.injected_failure().await?;
        let patch = as_object(patch)?;
        let id = id.to_string();

        let mut tables = self.inner.tables.write().await;
        let rows = tables.rows.entry(table).or_default();
        slug_conflict(rows, table, patch.get("slug"), Some(&id))?;

        let row = rows
            .iter_mut()
            .find(|r| row_id(r) == Some(id.as_str()))
            .ok_or(BackendError::NotFound { table })?;
        if let Some(existing) = row.as_object_mut() {
            for (key, value) in patch {
                existing.insert(key, value);
            }
        }
        Ok(row.clone())
    }

    async fn delete(&self, table: Table, id: Uuid) -> Result<(), BackendError> {
        self.injected_failure().await?;
        let id = id.to_string();
        let mut tables = self.inner.tables.write().await;
        if let Some(rows) = tables.rows.get_mut(&table) {
            rows.retain(|r| row_id(r) != Some(id.as_str()));
        }
        Ok(())
    }

    fn with_access_token(&self, _access_token: &str) -> StoreState {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        self.injected_failure().await?;
        let user = {
            let accounts = self.inner.accounts.read().await;
            match accounts.get(email) {
                Some(account) if account.password == password => SessionUser {
                    id: account.id,
                    email: Some(email.to_string()),
                },
                _ => {
                    return Err(BackendError::Api {
                        status: 400,
                        message: "Invalid login credentials".into(),
                    });
                }
            }
        };

        let access_token = Uuid::new_v4().simple().to_string();
        self.inner
            .sessions
            .write()
            .await
            .insert(access_token.clone(), user.clone());
        Ok(AuthSession {
            access_token,
            refresh_token: Some(Uuid::new_v4().simple().to_string()),
            expires_in: SESSION_TTL_SECS,
            user,
        })
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SessionUser, BackendError> {
        self.injected_failure().await?;
        if self.inner.accounts.read().await.contains_key(email) {
            return Err(BackendError::Api {
                status: 422,
                message: "User already registered".into(),
            });
        }
        Ok(self.register(email, password).await)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        self.injected_failure().await?;
        self.inner.sessions.write().await.remove(access_token);
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<SessionUser, BackendError> {
        self.injected_failure().await?;
        self.inner
            .sessions
            .read()
            .await
            .get(access_token)
            .cloned()
            .ok_or(BackendError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamps_compare_chronologically() {
        // Lexically ".1Z" sorts after ".123Z".
        let a = json!("2024-05-01T10:00:05.1Z");
        let b = json!("2024-05-01T10:00:05.123Z");
        assert_eq!(compare_values(&a, &b), Ordering::Less);
    }

    #[test]
    fn nulls_sort_last() {
        assert_eq!(compare_values(&Value::Null, &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(1), &json!(2)), Ordering::Less);
    }

    #[tokio::test]
    async fn duplicate_slug_is_rejected() {
        let backend = MemoryBackend::new();
        backend
            .insert(Table::Services, json!({"title": "SEO", "slug": "seo"}))
            .await
            .unwrap();
        let err = backend
            .insert(Table::Services, json!({"title": "SEO again", "slug": "seo"}))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api { status: 409, .. }));
    }
}
