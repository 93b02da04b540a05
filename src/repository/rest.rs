use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, header};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    auth::AuthProvider,
    error::BackendError,
    models::{AuthSession, SessionUser, Table},
    repository::{Query, StoreState, TableStore},
};

const OBJECT_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";
const RETURN_REPRESENTATION: &str = "return=representation";
const RETURN_MINIMAL: &str = "return=minimal";

/// SupabaseRest
///
/// Client for the hosted backend: PostgREST under `/rest/v1` for tables and
/// GoTrue under `/auth/v1` for sessions. Every request carries the public API
/// key; table requests are authorised either as the anonymous role or, after
/// `with_access_token`, as a signed-in user.
///
/// The underlying `reqwest::Client` pools connections and is cheap to clone.
#[derive(Clone)]
pub struct SupabaseRest {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    bearer: String,
}

impl SupabaseRest {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            bearer: anon_key.to_string(),
        })
    }

    fn rest_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn request(&self, method: Method, url: String, bearer: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
    }

    fn table_request(&self, method: Method, table: Table) -> RequestBuilder {
        self.request(method, self.rest_url(table), &self.bearer)
    }
}

// --- PostgREST encoding ---

/// The text PostgREST expects after an operator for a JSON value.
fn filter_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// filter_param
///
/// `column=eq.value`, or `column=is.null` for a null value.
pub(crate) fn filter_param(column: &str, value: &Value) -> (String, String) {
    let rhs = match value {
        Value::Null => "is.null".to_string(),
        other => format!("eq.{}", filter_text(other)),
    };
    (column.to_string(), rhs)
}

/// select_params
///
/// Encodes a resolved query as PostgREST query-string pairs.
pub(crate) fn select_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![(
        "select".to_string(),
        match query.columns() {
            Some(columns) => columns.join(","),
            None => "*".to_string(),
        },
    )];
    params.extend(query.filters.iter().map(|f| filter_param(&f.column, &f.value)));
    if let Some(order) = &query.order {
        let dir = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, dir)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn id_param(id: Uuid) -> (String, String) {
    ("id".to_string(), format!("eq.{id}"))
}

/// Pulls a readable message out of a PostgREST or GoTrue error body.
fn error_message(body: &Value) -> Option<String> {
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Maps a non-success response to a `BackendError`.
async fn read_error(response: Response, table: Option<Table>) -> BackendError {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    // PGRST116: an object was requested but zero or several rows matched.
    if let (Some(table), Some("PGRST116")) = (table, body.get("code").and_then(Value::as_str)) {
        let details = body.get("details").and_then(Value::as_str).unwrap_or_default();
        return if details.contains(" 0 rows") {
            BackendError::NotFound { table }
        } else {
            BackendError::MultipleRows { table }
        };
    }

    if status == StatusCode::UNAUTHORIZED {
        return BackendError::Unauthorized;
    }

    let message = error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("backend request failed")
            .to_string()
    });
    BackendError::Api {
        status: status.as_u16(),
        message,
    }
}

async fn expect_success(response: Response, table: Option<Table>) -> Result<Response, BackendError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let err = read_error(response, table).await;
        tracing::error!(table = ?table, error = %err, "backend request rejected");
        Err(err)
    }
}

#[async_trait]
impl TableStore for SupabaseRest {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, BackendError> {
        query.validate()?;
        let mut request = self
            .table_request(Method::GET, table)
            .query(&select_params(query));
        if query.single {
            request = request.header(header::ACCEPT, OBJECT_MEDIA_TYPE);
        }

        let response = expect_success(request.send().await?, Some(table)).await?;
        if query.single {
            let row: Value = response.json().await?;
            Ok(vec![row])
        } else {
            Ok(response.json::<Vec<Value>>().await?)
        }
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value, BackendError> {
        let request = self
            .table_request(Method::POST, table)
            .header("Prefer", RETURN_REPRESENTATION)
            .header(header::ACCEPT, OBJECT_MEDIA_TYPE)
            .json(&row);
        let response = expect_success(request.send().await?, Some(table)).await?;
        Ok(response.json().await?)
    }

    async fn append(&self, table: Table, row: Value) -> Result<(), BackendError> {
        let request = self
            .table_request(Method::POST, table)
            .header("Prefer", RETURN_MINIMAL)
            .json(&row);
        expect_success(request.send().await?, Some(table)).await?;
        Ok(())
    }

    async fn update(&self, table: Table, id: Uuid, patch: Value) -> Result<Value, BackendError> {
        let request = self
            .table_request(Method::PATCH, table)
            .query(&[id_param(id)])
            .header("Prefer", RETURN_REPRESENTATION)
            .header(header::ACCEPT, OBJECT_MEDIA_TYPE)
            .json(&patch);
        let response = expect_success(request.send().await?, Some(table)).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, table: Table, id: Uuid) -> Result<(), BackendError> {
        let request = self
            .table_request(Method::DELETE, table)
            .query(&[id_param(id)]);
        expect_success(request.send().await?, Some(table)).await?;
        Ok(())
    }

    fn with_access_token(&self, access_token: &str) -> StoreState {
        let mut scoped = self.clone();
        scoped.bearer = access_token.to_string();
        Arc::new(scoped)
    }
}

/// GoTrue answers signup with either a bare user or a full session.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session { user: SessionUser },
    User(SessionUser),
}

#[async_trait]
impl AuthProvider for SupabaseRest {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let request = self
            .request(Method::POST, self.auth_url("token"), &self.anon_key)
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({ "email": email, "password": password }));
        let response = expect_success(request.send().await?, None).await?;
        Ok(response.json().await?)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SessionUser, BackendError> {
        let request = self
            .request(Method::POST, self.auth_url("signup"), &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }));
        let response = expect_success(request.send().await?, None).await?;
        Ok(match response.json::<SignUpResponse>().await? {
            SignUpResponse::Session { user } | SignUpResponse::User(user) => user,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let request = self.request(Method::POST, self.auth_url("logout"), access_token);
        expect_success(request.send().await?, None).await?;
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<SessionUser, BackendError> {
        let request = self.request(Method::GET, self.auth_url("user"), access_token);
        let response = request.send().await?;
        if response.status() == StatusCode::FORBIDDEN {
            return Err(BackendError::Unauthorized);
        }
        let response = expect_success(response, None).await?;
        Ok(response.json().await?)
    }
}
