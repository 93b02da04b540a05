use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ValidationError;

// --- Tables ---

/// Table
///
/// The four tables the site reads and writes in the hosted backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Portfolios,
    Services,
    BlogPosts,
    ContactSubmissions,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Portfolios,
        Table::Services,
        Table::BlogPosts,
        Table::ContactSubmissions,
    ];

    /// The table name as known to the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Portfolios => "portfolios",
            Table::Services => "services",
            Table::BlogPosts => "blog_posts",
            Table::ContactSubmissions => "contact_submissions",
        }
    }

    /// Contact submissions carry no `published` column and are never public.
    pub fn has_published_flag(&self) -> bool {
        !matches!(self, Table::ContactSubmissions)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record
///
/// Ties a row type to the table it is stored in. The hooks use this to pick
/// the table and to decode rows.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    const TABLE: Table;
}

// --- Core Content Schemas (Mapped to Backend Tables) ---

/// PortfolioItem
///
/// A case study shown on `/portfolio` and `/portfolio/{slug}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
#[serde(default)]
pub struct PortfolioItem {
    pub id: Uuid,
    pub title: String,
    // Unique per table, used for public routing.
    pub slug: String,
    pub category: String,
    pub description: String,
    pub thumbnail: String,
    pub images: Vec<String>,
    pub client: String,
    pub year: String,
    // Display order matters.
    pub tags: Vec<String>,
    pub color: String,
    pub link: Option<String>,

    // Case study narrative.
    pub challenge: Option<String>,
    pub solution: Option<String>,
    pub results: Option<String>,
    pub testimonial: Option<String>,
    pub testimonial_author: Option<String>,

    pub published: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl Record for PortfolioItem {
    const TABLE: Table = Table::Portfolios;
}

/// Service
///
/// An offering listed on `/services`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
#[serde(default)]
pub struct Service {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub tagline: String,
    pub description: String,
    pub pricing: String,
    pub duration: String,
    pub features: Vec<String>,
    pub color: String,
    pub published: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl Record for Service {
    const TABLE: Table = Table::Services;
}

/// BlogPost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
#[serde(default)]
pub struct BlogPost {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub category: String,
    pub excerpt: String,
    // Full article body (markdown).
    pub content: String,
    pub author: String,
    pub image: String,
    pub color: String,
    pub published: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl Record for BlogPost {
    const TABLE: Table = Table::BlogPosts;
}

/// ContactSubmission
///
/// A message sent through the public contact form. Only ever read by admins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
#[serde(default)]
pub struct ContactSubmission {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    // The service the visitor is interested in.
    pub service: String,
    pub message: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl Record for ContactSubmission {
    const TABLE: Table = Table::ContactSubmissions;
}

// --- Slugs ---

/// slugify
///
/// Lowercases ASCII alphanumerics and collapses every other run of characters
/// into a single `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// is_url_safe_slug
///
/// Accepts `[a-z0-9]+(-[a-z0-9]+)*`.
pub fn is_url_safe_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .split('-')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()))
}

fn resolve_slug(slug: &mut Option<String>, title: &str) -> Result<(), ValidationError> {
    match slug {
        Some(s) if !s.trim().is_empty() => {
            if !is_url_safe_slug(s) {
                return Err(ValidationError::InvalidSlug(s.clone()));
            }
        }
        _ => {
            let derived = slugify(title);
            if derived.is_empty() {
                return Err(ValidationError::Required("slug"));
            }
            *slug = Some(derived);
        }
    }
    Ok(())
}

fn check_patch_slug(slug: &Option<String>) -> Result<(), ValidationError> {
    match slug {
        Some(s) if !is_url_safe_slug(s) => Err(ValidationError::InvalidSlug(s.clone())),
        _ => Ok(()),
    }
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Required(field))
    } else {
        Ok(())
    }
}

/// Minimal shape check: something before and after a single `@`, and a dot in the domain.
pub fn is_plausible_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.') && !domain.contains('@')
        }
        None => false,
    }
}

/// Draft
///
/// A write payload that is checked (and normalised) locally before it is sent.
pub trait Draft: Serialize + Send + Sync {
    fn validate(&mut self) -> Result<(), ValidationError>;
}

// --- Request Payloads (Input Schemas) ---

/// NewPortfolioItem
///
/// Admin payload for `POST /admin/portfolio`. A missing slug is derived from the title.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
#[serde(default)]
pub struct NewPortfolioItem {
    pub title: String,
    pub slug: Option<String>,
    pub category: String,
    pub description: String,
    pub thumbnail: String,
    pub images: Vec<String>,
    pub client: String,
    pub year: String,
    pub tags: Vec<String>,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testimonial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testimonial_author: Option<String>,
    pub published: bool,
}

impl Draft for NewPortfolioItem {
    fn validate(&mut self) -> Result<(), ValidationError> {
        require(&self.title, "title")?;
        resolve_slug(&mut self.slug, &self.title)
    }
}

/// PortfolioItemPatch
///
/// Partial update for `PUT /admin/portfolio/{id}`. Only provided fields are sent.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PortfolioItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testimonial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testimonial_author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
}

impl Draft for PortfolioItemPatch {
    fn validate(&mut self) -> Result<(), ValidationError> {
        check_patch_slug(&self.slug)
    }
}

/// NewService
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
#[serde(default)]
pub struct NewService {
    pub title: String,
    pub slug: Option<String>,
    pub tagline: String,
    pub description: String,
    pub pricing: String,
    pub duration: String,
    pub features: Vec<String>,
    pub color: String,
    pub published: bool,
}

impl Draft for NewService {
    fn validate(&mut self) -> Result<(), ValidationError> {
        require(&self.title, "title")?;
        resolve_slug(&mut self.slug, &self.title)
    }
}

/// ServicePatch
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ServicePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
}

impl Draft for ServicePatch {
    fn validate(&mut self) -> Result<(), ValidationError> {
        check_patch_slug(&self.slug)
    }
}

/// NewBlogPost
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
#[serde(default)]
pub struct NewBlogPost {
    pub title: String,
    pub slug: Option<String>,
    pub category: String,
    pub excerpt: String,
    pub content: String,
    pub author: String,
    pub image: String,
    pub color: String,
    pub published: bool,
}

impl Draft for NewBlogPost {
    fn validate(&mut self) -> Result<(), ValidationError> {
        require(&self.title, "title")?;
        resolve_slug(&mut self.slug, &self.title)
    }
}

/// BlogPostPatch
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct BlogPostPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
}

impl Draft for BlogPostPatch {
    fn validate(&mut self) -> Result<(), ValidationError> {
        check_patch_slug(&self.slug)
    }
}

/// NewContactSubmission
///
/// Public payload for `POST /contact`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
#[serde(default)]
pub struct NewContactSubmission {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub service: String,
    pub message: String,
}

impl Draft for NewContactSubmission {
    fn validate(&mut self) -> Result<(), ValidationError> {
        require(&self.name, "name")?;
        require(&self.email, "email")?;
        if !is_plausible_email(&self.email) {
            return Err(ValidationError::InvalidEmail);
        }
        require(&self.message, "message")?;
        // An empty phone field in the form means "not given".
        if self.phone.as_deref().is_some_and(|p| p.trim().is_empty()) {
            self.phone = None;
        }
        Ok(())
    }
}

/// PublishToggle
///
/// Body of `POST /admin/{kind}/{id}/publish`: the status the admin currently sees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PublishToggle {
    pub published: bool,
}

/// Editable
///
/// A publishable content kind managed from the admin area, with its create and
/// patch payloads. Lets the admin CRUD handlers be written once for all three.
pub trait Editable: Record + Clone {
    type New: Draft + DeserializeOwned + 'static;
    type Patch: Draft + DeserializeOwned + 'static;
}

impl Editable for PortfolioItem {
    type New = NewPortfolioItem;
    type Patch = PortfolioItemPatch;
}

impl Editable for Service {
    type New = NewService;
    type Patch = ServicePatch;
}

impl Editable for BlogPost {
    type New = NewBlogPost;
    type Patch = BlogPostPatch;
}

// --- Session Schemas ---

/// SessionUser
///
/// The identity behind an access token, as reported by the auth collaborator
/// (or read from the verified token claims).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SessionUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// AuthSession
///
/// A signed-in session returned by `sign_in`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    // Seconds until the access token expires.
    #[serde(default)]
    pub expires_in: u64,
    pub user: SessionUser,
}

/// LoginRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.email, "email")?;
        require(&self.password, "password")
    }
}

pub const MIN_PASSWORD_LEN: usize = 6;

/// SignUpRequest
///
/// Note: the password is only passed through to the auth provider and never
/// persisted or logged by this service.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignUpRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.email, "email")?;
        if !is_plausible_email(&self.email) {
            return Err(ValidationError::InvalidEmail);
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort(MIN_PASSWORD_LEN));
        }
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        Ok(())
    }
}

/// LoginPrompt
///
/// Returned by `GET /admin/login` when the caller has no admin session.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginPrompt {
    pub login_required: bool,
    // Present when a session exists but is not an admin session.
    pub signed_in_as: Option<String>,
}

/// SessionInfo
///
/// Returned by `GET /admin/session`: who the caller is and whether the admin area is open to them.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionInfo {
    pub user: SessionUser,
    pub is_admin: bool,
}

// --- Media Schemas ---

/// PresignedUrlRequest
///
/// Input payload for requesting a short-lived upload URL for a portfolio or blog image.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlRequest {
    #[schema(example = "hero.png")]
    pub filename: String,
    #[schema(example = "image/png")]
    pub file_type: String,
}

/// PresignedUrlResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlResponse {
    /// The time-limited URL for the PUT request.
    pub upload_url: String,
    /// The object key to store in the record's image field.
    pub resource_key: String,
}

// --- Page & Dashboard Schemas (Output) ---

/// SectionError
///
/// A failure confined to one section of a page; the rest of the page still renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SectionError {
    pub section: String,
    pub message: String,
}

/// HomePage
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct HomePage {
    pub featured_work: Vec<PortfolioItem>,
    pub services: Vec<Service>,
    pub latest_posts: Vec<BlogPost>,
    pub errors: Vec<SectionError>,
}

/// AboutPage
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AboutPage {
    pub services: Vec<Service>,
    pub published_projects: usize,
    pub errors: Vec<SectionError>,
}

/// TableCount
///
/// Row counts for one table on the admin dashboard. `published` is `None` for
/// tables without a publish flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TableCount {
    pub table: Table,
    pub total: usize,
    pub published: Option<usize>,
}

/// DashboardSummary
///
/// Output schema for `GET /admin/dashboard`. Sections that failed to load are
/// listed in `errors` and left empty.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DashboardSummary {
    pub counts: Vec<TableCount>,
    pub recent_contacts: Vec<ContactSubmission>,
    pub recent_posts: Vec<BlogPost>,
    pub errors: Vec<SectionError>,
}
