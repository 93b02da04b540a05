use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json};
use uuid::Uuid;

use crate::{
    error::BackendError,
    models::Table,
    repository::{Query, StoreState, TableStore, collapse_single, is_identifier},
};

/// PostgresRepository
///
/// Table store that talks to the backend's Postgres database directly (the
/// `DATABASE_URL` deployment), bypassing PostgREST. Rows are read back as
/// `to_jsonb(...)` so the same JSON contract serves every table.
///
/// Column names are validated as plain identifiers before they are spliced into
/// SQL; every value is bound.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Builds the `SELECT` for a resolved query.
pub(crate) fn select_sql(table: Table, query: &Query) -> Result<QueryBuilder<'static, Postgres>, BackendError> {
    query.validate()?;

    let projection = match query.columns() {
        None => "to_jsonb(t)".to_string(),
        Some(columns) => {
            let pairs: Vec<String> = columns.iter().map(|c| format!("'{c}', t.{c}")).collect();
            format!("jsonb_build_object({})", pairs.join(", "))
        }
    };

    let mut builder = QueryBuilder::new(format!("SELECT {projection} FROM {} t WHERE true", table.as_str()));
    for filter in &query.filters {
        if filter.value.is_null() {
            builder.push(format!(" AND t.{} IS NULL", filter.column));
        } else {
            // Comparing as jsonb keeps one code path for text, uuid, bool and numeric columns.
            builder.push(format!(" AND to_jsonb(t.{}) = ", filter.column));
            builder.push_bind(Json(filter.value.clone()));
        }
    }
    if let Some(order) = &query.order {
        let dir = if order.ascending { "ASC" } else { "DESC" };
        builder.push(format!(" ORDER BY t.{} {dir}", order.column));
    }
    // Two rows are enough to tell "exactly one" from "several".
    let limit = match (query.single, query.limit) {
        (true, Some(limit)) => Some(limit.min(2)),
        (true, None) => Some(2),
        (false, limit) => limit,
    };
    if let Some(limit) = limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit as i64);
    }
    Ok(builder)
}

fn columns_of(fields: &Map<String, Value>) -> Result<Vec<&str>, BackendError> {
    fields
        .keys()
        .map(|key| {
            if is_identifier(key) {
                Ok(key.as_str())
            } else {
                Err(BackendError::InvalidQuery(format!("'{key}' is not a valid column name")))
            }
        })
        .collect()
}

fn object(row: Value) -> Result<Map<String, Value>, BackendError> {
    match row {
        Value::Object(map) => Ok(map),
        _ => Err(BackendError::InvalidQuery("row must be a JSON object".into())),
    }
}

/// `INSERT` that lets the database fill every column the row does not name.
pub(crate) fn insert_sql(table: Table, fields: Map<String, Value>) -> Result<QueryBuilder<'static, Postgres>, BackendError> {
    let name = table.as_str();
    if fields.is_empty() {
        return Ok(QueryBuilder::new(format!(
            "INSERT INTO {name} AS t DEFAULT VALUES RETURNING to_jsonb(t)"
        )));
    }
    let columns = columns_of(&fields)?.join(", ");
    let mut builder = QueryBuilder::new(format!(
        "INSERT INTO {name} AS t ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::{name}, "
    ));
    builder.push_bind(Json(Value::Object(fields)));
    builder.push(") RETURNING to_jsonb(t)");
    Ok(builder)
}

/// `UPDATE` of only the named columns.
pub(crate) fn update_sql(table: Table, id: Uuid, fields: Map<String, Value>) -> Result<QueryBuilder<'static, Postgres>, BackendError> {
    let name = table.as_str();
    let columns = columns_of(&fields)?.join(", ");
    let mut builder = QueryBuilder::new(format!(
        "UPDATE {name} AS t SET ({columns}) = (SELECT {columns} FROM jsonb_populate_record(NULL::{name}, "
    ));
    builder.push_bind(Json(Value::Object(fields)));
    builder.push(")) WHERE t.id = ");
    builder.push_bind(id);
    builder.push(" RETURNING to_jsonb(t)");
    Ok(builder)
}

fn map_sqlx(table: Table, err: sqlx::Error) -> BackendError {
    tracing::error!(%table, "postgres error: {:?}", err);
    match err {
        sqlx::Error::Database(db) => {
            // 23505 unique_violation (duplicate slug), 23xxx other constraint failures.
            let status = match db.code().as_deref() {
                Some("23505") => 409,
                Some(code) if code.starts_with("23") || code.starts_with("22") => 400,
                _ => 500,
            };
            BackendError::Api {
                status,
                message: db.message().to_string(),
            }
        }
        sqlx::Error::RowNotFound => BackendError::NotFound { table },
        other => BackendError::Network(other.to_string()),
    }
}

#[async_trait]
impl TableStore for PostgresRepository {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, BackendError> {
        let mut builder = select_sql(table, query)?;
        let rows = builder
            .build_query_scalar::<Json<Value>>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx(table, e))?;
        collapse_single(table, query, rows.into_iter().map(|Json(row)| row).collect())
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value, BackendError> {
        let mut builder = insert_sql(table, object(row)?)?;
        let Json(created) = builder
            .build_query_scalar::<Json<Value>>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx(table, e))?;
        Ok(created)
    }

    async fn update(&self, table: Table, id: Uuid, patch: Value) -> Result<Value, BackendError> {
        let fields = object(patch)?;
        if fields.is_empty() {
            // Nothing to change: behave like PostgREST and return the current row.
            let rows = self.select(table, &Query::by_id(id)).await?;
            return rows.into_iter().next().ok_or(BackendError::NotFound { table });
        }
        let mut builder = update_sql(table, id, fields)?;
        builder
            .build_query_scalar::<Json<Value>>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx(table, e))?
            .map(|Json(row)| row)
            .ok_or(BackendError::NotFound { table })
    }

    async fn delete(&self, table: Table, id: Uuid) -> Result<(), BackendError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("DELETE FROM {} WHERE id = ", table.as_str()));
        builder.push_bind(id);
        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx(table, e))?;
        Ok(())
    }

    /// Direct database access already runs with the connection's own role.
    fn with_access_token(&self, _access_token: &str) -> StoreState {
        Arc::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::QueryOptions;
    use serde_json::json;

    #[test]
    fn public_listing_sql() {
        let query = QueryOptions::new()
            .eq("category", "Web")
            .limit(3)
            .to_query()
            .published_only();
        let builder = select_sql(Table::Portfolios, &query).unwrap();
        assert_eq!(
            builder.sql(),
            "SELECT to_jsonb(t) FROM portfolios t WHERE true \
             AND to_jsonb(t.category) = $1 AND to_jsonb(t.published) = $2 \
             ORDER BY t.created_at DESC LIMIT $3"
        );
    }

    #[test]
    fn projection_and_null_filter_sql() {
        let query = QueryOptions::new()
            .select("id,published")
            .eq("link", Value::Null)
            .single()
            .to_query();
        let builder = select_sql(Table::Portfolios, &query).unwrap();
        assert_eq!(
            builder.sql(),
            "SELECT jsonb_build_object('id', t.id, 'published', t.published) FROM portfolios t \
             WHERE true AND t.link IS NULL ORDER BY t.created_at DESC LIMIT $1"
        );
    }

    #[test]
    fn insert_names_only_given_columns() {
        let fields = object(json!({"slug": "test", "title": "Test"})).unwrap();
        let builder = insert_sql(Table::Portfolios, fields).unwrap();
        assert_eq!(
            builder.sql(),
            "INSERT INTO portfolios AS t (slug, title) SELECT slug, title \
             FROM jsonb_populate_record(NULL::portfolios, $1) RETURNING to_jsonb(t)"
        );
    }

    #[test]
    fn update_rejects_bad_column_names() {
        let fields = object(json!({"title = 'x'; --": "y"})).unwrap();
        assert!(matches!(
            update_sql(Table::Services, Uuid::nil(), fields),
            Err(BackendError::InvalidQuery(_))
        ));
    }
}
