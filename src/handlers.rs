use crate::{
    AppState,
    auth::{AdminSession, clear_cookie, session_cookie, session_token},
    crud::CrudHandle,
    error::{BackendError, ErrorBody, HookError, ValidationError},
    gate::{DASHBOARD_ROUTE, GateState, LOGIN_ROUTE, SessionGate},
    models::{
        AboutPage, BlogPost, ContactSubmission, DashboardSummary, Editable, HomePage,
        LoginPrompt, LoginRequest, NewContactSubmission, PortfolioItem, PresignedUrlRequest,
        PresignedUrlResponse, PublishToggle, Record, SectionError, Service, SessionInfo,
        SessionUser, SignUpRequest, TableCount,
    },
    repository::{PUBLISHED, QueryOptions},
    storage::media_key,
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use uuid::Uuid;

/// Items shown in the home page's "featured work" and "latest posts" strips.
const HOME_STRIP_LEN: usize = 3;
/// Items in each "recent" list on the admin dashboard.
const DASHBOARD_RECENT_LEN: usize = 5;

// --- Filter Structs ---

/// CategoryFilter
///
/// Query parameters for the portfolio and blog listings. A missing, empty or
/// `all` category lists everything.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct CategoryFilter {
    pub category: Option<String>,
}

impl CategoryFilter {
    fn selected(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"))
    }
}

/// AdminListParams
///
/// Query parameters for the admin listings.
#[derive(Deserialize, Default)]
pub struct AdminListParams {
    /// Only rows with this publish status. Ignored for contact submissions.
    pub published: Option<bool>,
    pub limit: Option<usize>,
}

fn section_error(section: &str, err: &HookError) -> SectionError {
    SectionError {
        section: section.to_string(),
        message: err.message.clone(),
    }
}

// --- Public Pages ---

/// home
///
/// [Public Route] Featured work, services and the latest posts. Each section
/// loads independently; a failed section is reported in `errors` and left empty.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Home page data", body = HomePage))
)]
pub async fn home(State(state): State<AppState>) -> Json<HomePage> {
    let content = state.content();
    let (featured, services, posts) = tokio::join!(
        content.featured_portfolios(HOME_STRIP_LEN),
        content.services(),
        content.latest_posts(HOME_STRIP_LEN),
    );

    let mut page = HomePage::default();
    match featured {
        Ok(items) => page.featured_work = items,
        Err(err) => page.errors.push(section_error("featured_work", &err)),
    }
    match services {
        Ok(items) => page.services = items,
        Err(err) => page.errors.push(section_error("services", &err)),
    }
    match posts {
        Ok(items) => page.latest_posts = items,
        Err(err) => page.errors.push(section_error("latest_posts", &err)),
    }
    Json(page)
}

/// about
///
/// [Public Route] Services summary and the number of published projects.
#[utoipa::path(
    get,
    path = "/about",
    responses((status = 200, description = "About page data", body = AboutPage))
)]
pub async fn about(State(state): State<AppState>) -> Json<AboutPage> {
    let content = state.content();
    let (services, projects) = tokio::join!(content.services(), content.published_portfolio_count());

    let mut page = AboutPage::default();
    match services {
        Ok(items) => page.services = items,
        Err(err) => page.errors.push(section_error("services", &err)),
    }
    match projects {
        Ok(count) => page.published_projects = count,
        Err(err) => page.errors.push(section_error("published_projects", &err)),
    }
    Json(page)
}

#[utoipa::path(
    get,
    path = "/services",
    responses(
        (status = 200, description = "Published services, oldest first", body = [Service]),
        (status = 502, description = "Backend unavailable", body = ErrorBody)
    )
)]
pub async fn list_services(State(state): State<AppState>) -> Result<Json<Vec<Service>>, HookError> {
    Ok(Json(state.content().services().await?))
}

#[utoipa::path(
    get,
    path = "/services/{slug}",
    params(("slug" = String, Path, description = "Service slug")),
    responses(
        (status = 200, description = "Found", body = Service),
        (status = 404, description = "No published service with this slug", body = ErrorBody)
    )
)]
pub async fn get_service(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<Service>, HookError> {
    Ok(Json(state.content().service_by_slug(&slug).await?))
}

/// list_portfolio
///
/// [Public Route] Published case studies, newest first, optionally narrowed to one category.
#[utoipa::path(
    get,
    path = "/portfolio",
    params(CategoryFilter),
    responses((status = 200, description = "Published case studies", body = [PortfolioItem]))
)]
pub async fn list_portfolio(
    State(state): State<AppState>,
    Query(filter): Query<CategoryFilter>,
) -> Result<Json<Vec<PortfolioItem>>, HookError> {
    let content = state.content();
    let items = match filter.selected() {
        Some(category) => content.portfolios_by_category(category).await?,
        None => content.portfolios().await?,
    };
    Ok(Json(items))
}

#[utoipa::path(
    get,
    path = "/portfolio/{slug}",
    params(("slug" = String, Path, description = "Case study slug")),
    responses(
        (status = 200, description = "Found", body = PortfolioItem),
        (status = 404, description = "No published case study with this slug", body = ErrorBody)
    )
)]
pub async fn get_portfolio_item(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PortfolioItem>, HookError> {
    Ok(Json(state.content().portfolio_by_slug(&slug).await?))
}

#[utoipa::path(
    get,
    path = "/blog",
    params(CategoryFilter),
    responses((status = 200, description = "Published posts, newest first", body = [BlogPost]))
)]
pub async fn list_blog(
    State(state): State<AppState>,
    Query(filter): Query<CategoryFilter>,
) -> Result<Json<Vec<BlogPost>>, HookError> {
    let content = state.content();
    let posts = match filter.selected() {
        Some(category) => content.blog_posts_by_category(category).await?,
        None => content.blog_posts().await?,
    };
    Ok(Json(posts))
}

#[utoipa::path(
    get,
    path = "/blog/{slug}",
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Found", body = BlogPost),
        (status = 404, description = "No published post with this slug", body = ErrorBody)
    )
)]
pub async fn get_blog_post(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<BlogPost>, HookError> {
    Ok(Json(state.content().blog_post_by_slug(&slug).await?))
}

/// submit_contact
///
/// [Public Route] Stores a contact form submission. Visitors may insert but
/// never read submissions, so nothing is echoed back.
#[utoipa::path(
    post,
    path = "/contact",
    request_body = NewContactSubmission,
    responses(
        (status = 201, description = "Submission stored"),
        (status = 422, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn submit_contact(
    State(state): State<AppState>,
    Json(payload): Json<NewContactSubmission>,
) -> Result<StatusCode, BackendError> {
    CrudHandle::<ContactSubmission>::new(state.store.clone(), None)
        .submit(payload)
        .await?;
    Ok(StatusCode::CREATED)
}

// --- Admin Session ---

/// login_page
///
/// [Admin Session Route] Admins are sent straight to the dashboard; anyone else
/// gets the login prompt.
#[utoipa::path(
    get,
    path = "/admin/login",
    responses(
        (status = 200, description = "Login required", body = LoginPrompt),
        (status = 303, description = "Already signed in as admin")
    )
)]
pub async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = session_token(&headers);
    let signed_in_as = match SessionGate::from_state(&state).check(token.as_deref()).await {
        GateState::Admin(_) => return Redirect::to(DASHBOARD_ROUTE).into_response(),
        GateState::NonAdmin(user) => user.email,
        GateState::Loading | GateState::Unauthenticated => None,
    };
    Json(LoginPrompt {
        login_required: true,
        signed_in_as,
    })
    .into_response()
}

/// login
///
/// [Admin Session Route] Email + password sign-in. A valid account that is not
/// on the admin list is signed straight back out and refused.
#[utoipa::path(
    post,
    path = "/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; session cookie set", body = crate::models::AuthSession),
        (status = 400, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Not an admin account", body = ErrorBody)
    )
)]
pub async fn login(State(state): State<AppState>, Json(payload): Json<LoginRequest>) -> Result<Response, BackendError> {
    payload.validate()?;
    let session = state.auth.sign_in(payload.email.trim(), &payload.password).await?;

    if !state.policy.admits(&session.user) {
        tracing::warn!(user = %session.user.id, "non-admin account refused at admin login");
        if let Err(err) = state.auth.sign_out(&session.access_token).await {
            tracing::warn!("sign-out after refused login failed: {}", err);
        }
        let body = ErrorBody {
            error: "this account does not have admin access".to_string(),
        };
        return Ok((StatusCode::FORBIDDEN, Json(body)).into_response());
    }

    tracing::info!(user = %session.user.id, "admin signed in");
    let cookie = session_cookie(&session.access_token, session.expires_in, state.config.secure_cookies());
    Ok(([(header::SET_COOKIE, cookie)], Json(session)).into_response())
}

/// signup
///
/// [Admin Session Route] Creates an account. Checked locally before the auth
/// service is called; admin access still depends on the allow-list.
#[utoipa::path(
    post,
    path = "/admin/signup",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "Account created", body = SessionUser),
        (status = 422, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SessionUser>), BackendError> {
    payload.validate()?;
    let user = state.auth.sign_up(payload.email.trim(), &payload.password).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// logout
///
/// [Admin Session Route] Ends the session and returns to the login route.
/// The token is revoked locally as well, so it stops working here even when
/// sessions are verified from the JWT alone. A failed remote sign-out is
/// logged; the cookie is cleared regardless.
#[utoipa::path(
    post,
    path = "/admin/logout",
    responses((status = 303, description = "Signed out"))
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.revoked.revoke(&token);
        if let Err(err) = state.auth.sign_out(&token).await {
            tracing::warn!("sign-out failed: {}", err);
        }
    }
    (
        [(header::SET_COOKIE, clear_cookie(state.config.secure_cookies()))],
        Redirect::to(LOGIN_ROUTE),
    )
        .into_response()
}

/// session_info
///
/// [Admin Session Route] The caller's identity and admin status.
#[utoipa::path(
    get,
    path = "/admin/session",
    responses(
        (status = 200, description = "Current session", body = SessionInfo),
        (status = 401, description = "No valid session")
    )
)]
pub async fn session_info(user: SessionUser, State(state): State<AppState>) -> Json<SessionInfo> {
    let is_admin = state.policy.admits(&user);
    Json(SessionInfo { user, is_admin })
}

// --- Admin Area (behind the gate) ---

pub async fn admin_root() -> Redirect {
    Redirect::to(DASHBOARD_ROUTE)
}

async fn table_count<T: Record>(crud: CrudHandle<T>) -> Result<TableCount, HookError> {
    let ids = QueryOptions::new().select("id");
    if T::TABLE.has_published_flag() {
        let published_ids = ids.clone().eq(PUBLISHED, true);
        let (all, published) = tokio::join!(crud.get_all(&ids), crud.get_all(&published_ids));
        Ok(TableCount {
            table: T::TABLE,
            total: all?.len(),
            published: Some(published?.len()),
        })
    } else {
        Ok(TableCount {
            table: T::TABLE,
            total: crud.get_all(&ids).await?.len(),
            published: None,
        })
    }
}

/// dashboard
///
/// [Admin Route] Per-table counts, loaded concurrently, then the most recent
/// contact submissions and posts. A failed section does not hide the others.
#[utoipa::path(
    get,
    path = "/admin/dashboard",
    responses(
        (status = 200, description = "Dashboard summary", body = DashboardSummary),
        (status = 303, description = "No admin session; redirected to the login route")
    )
)]
pub async fn dashboard(State(state): State<AppState>, Extension(session): Extension<AdminSession>) -> Json<DashboardSummary> {
    let (portfolios, services, posts, contacts) = tokio::join!(
        table_count(state.crud::<PortfolioItem>(&session)),
        table_count(state.crud::<Service>(&session)),
        table_count(state.crud::<BlogPost>(&session)),
        table_count(state.crud::<ContactSubmission>(&session)),
    );

    let mut summary = DashboardSummary::default();
    for (table, result) in [
        (PortfolioItem::TABLE, portfolios),
        (Service::TABLE, services),
        (BlogPost::TABLE, posts),
        (ContactSubmission::TABLE, contacts),
    ] {
        match result {
            Ok(count) => summary.counts.push(count),
            Err(err) => summary.errors.push(section_error(table.as_str(), &err)),
        }
    }

    let recent = QueryOptions::new().limit(DASHBOARD_RECENT_LEN);
    let contacts_crud = state.crud::<ContactSubmission>(&session);
    let posts_crud = state.crud::<BlogPost>(&session);
    let (recent_contacts, recent_posts) = tokio::join!(
        contacts_crud.get_all(&recent),
        posts_crud.get_all(&recent),
    );
    match recent_contacts {
        Ok(rows) => summary.recent_contacts = rows,
        Err(err) => summary.errors.push(section_error("recent_contacts", &HookError::from(err))),
    }
    match recent_posts {
        Ok(rows) => summary.recent_posts = rows,
        Err(err) => summary.errors.push(section_error("recent_posts", &HookError::from(err))),
    }
    Json(summary)
}

/// admin_list
///
/// [Admin Route] Every row of the table, newest first, published or not.
pub async fn admin_list<T: Record + Clone>(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Query(params): Query<AdminListParams>,
) -> Result<Json<Vec<T>>, BackendError> {
    let mut options = QueryOptions::new();
    if let Some(published) = params.published.filter(|_| T::TABLE.has_published_flag()) {
        options = options.eq(PUBLISHED, published);
    }
    if let Some(limit) = params.limit {
        options = options.limit(limit);
    }
    Ok(Json(state.crud::<T>(&session).get_all(&options).await?))
}

pub async fn admin_get<T: Record + Clone>(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<Uuid>,
) -> Result<Json<T>, BackendError> {
    Ok(Json(state.crud::<T>(&session).get_one(id).await?))
}

/// admin_create
///
/// [Admin Route] Creates a row. New rows start unpublished unless the payload says otherwise.
pub async fn admin_create<T: Editable>(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Json(payload): Json<T::New>,
) -> Result<(StatusCode, Json<T>), BackendError> {
    let created = state.crud::<T>(&session).create(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn admin_update<T: Editable>(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<Uuid>,
    Json(payload): Json<T::Patch>,
) -> Result<Json<T>, BackendError> {
    Ok(Json(state.crud::<T>(&session).update(id, payload).await?))
}

pub async fn admin_delete<T: Record + Clone>(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, BackendError> {
    state.crud::<T>(&session).remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// admin_toggle_published
///
/// [Admin Route] Flips the publish flag. The body carries the status the admin
/// currently sees; the row ends up with the opposite.
pub async fn admin_toggle_published<T: Editable>(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<Uuid>,
    Json(PublishToggle { published }): Json<PublishToggle>,
) -> Result<Json<T>, BackendError> {
    Ok(Json(state.crud::<T>(&session).toggle_published(id, published).await?))
}

/// presigned_upload
///
/// [Admin Route] A short-lived URL for uploading an image straight to object
/// storage. Only `image/*` content types are accepted.
#[utoipa::path(
    post,
    path = "/admin/uploads/presigned",
    request_body = PresignedUrlRequest,
    responses(
        (status = 200, description = "Upload URL", body = PresignedUrlResponse),
        (status = 422, description = "Not an image", body = ErrorBody),
        (status = 503, description = "Media storage not configured", body = ErrorBody)
    )
)]
pub async fn presigned_upload(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Json(payload): Json<PresignedUrlRequest>,
) -> Result<Json<PresignedUrlResponse>, Response> {
    let Some(storage) = state.storage.as_ref() else {
        let body = ErrorBody {
            error: "media storage is not configured".to_string(),
        };
        return Err((StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response());
    };

    let content_type = payload.file_type.trim().to_ascii_lowercase();
    if !content_type.starts_with("image/") {
        return Err(ValidationError::UnsupportedMediaType(payload.file_type).into_response());
    }

    let resource_key = media_key(&payload.filename);
    match storage.presigned_upload_url(&resource_key, &content_type).await {
        Ok(upload_url) => {
            tracing::info!(user = %session.user.id, key = %resource_key, "issued upload url");
            Ok(Json(PresignedUrlResponse {
                upload_url,
                resource_key,
            }))
        }
        Err(err) => {
            tracing::error!("{}", err);
            let body = ErrorBody {
                error: "could not create an upload URL".to_string(),
            };
            Err((StatusCode::BAD_GATEWAY, Json(body)).into_response())
        }
    }
}
