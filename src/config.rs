use std::{env, time::Duration};

/// AppConfig
///
/// Holds the application's configuration, loaded once at startup and shared
/// read-only through the application state.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls log format, cookie flags and storage defaults.
    pub env: Env,
    // Project URL of the hosted backend (PostgREST under /rest/v1, auth under /auth/v1).
    pub supabase_url: String,
    // Public (anon) API key sent with every backend request.
    pub supabase_anon_key: String,
    // When set, access tokens are verified locally instead of asking the auth service.
    pub jwt_secret: Option<String>,
    // Emails allowed into the admin area.
    pub admin_emails: Vec<String>,
    // Direct database connection; replaces PostgREST as the table store when set.
    pub database_url: Option<String>,
    // Public content cache lifetime in seconds. 0 disables the cache.
    pub content_cache_ttl_secs: u64,
    pub backend_timeout_secs: u64,
    pub bind_addr: String,
    // Media uploads are disabled when no storage is configured.
    pub storage: Option<StorageConfig>,
}

/// StorageConfig
///
/// S3-compatible endpoint for media uploads (MinIO locally, Supabase Storage in production).
#[derive(Clone, Debug, PartialEq)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

/// Env
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

const DEFAULT_BUCKET: &str = "agency-media";

impl Default for AppConfig {
    /// Non-panicking values for test state setup.
    fn default() -> Self {
        Self {
            env: Env::Local,
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            jwt_secret: None,
            admin_emails: vec!["admin@example.com".to_string()],
            database_url: None,
            content_cache_ttl_secs: 30,
            backend_timeout_secs: 30,
            bind_addr: "0.0.0.0:3000".to_string(),
            storage: Some(StorageConfig::minio()),
        }
    }
}

impl StorageConfig {
    /// The dockerised MinIO used for local development.
    pub fn minio() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            region: "us-east-1".to_string(),
            access_key: "admin".to_string(),
            secret_key: "password".to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from the environment.
    ///
    /// # Panics
    /// Panics when `SUPABASE_URL` or `SUPABASE_ANON_KEY` is missing: the site
    /// cannot serve anything without its backend.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let supabase_url = env::var("SUPABASE_URL")
            .expect("FATAL: SUPABASE_URL must be set.")
            .trim_end_matches('/')
            .to_string();
        let supabase_anon_key =
            env::var("SUPABASE_ANON_KEY").expect("FATAL: SUPABASE_ANON_KEY must be set.");

        let storage = match env {
            Env::Local => Some(StorageConfig {
                bucket: env::var("S3_BUCKET_NAME").unwrap_or_else(|_| DEFAULT_BUCKET.to_string()),
                ..StorageConfig::minio()
            }),
            // Uploads go through Supabase's S3 gateway, but only once keys are provisioned.
            Env::Production => match (non_empty("S3_ACCESS_KEY"), non_empty("S3_SECRET_KEY")) {
                (Some(access_key), Some(secret_key)) => Some(StorageConfig {
                    endpoint: format!("{}/storage/v1/s3", supabase_url),
                    region: "stub".to_string(),
                    access_key,
                    secret_key,
                    bucket: env::var("S3_BUCKET_NAME").unwrap_or_else(|_| DEFAULT_BUCKET.to_string()),
                }),
                _ => None,
            },
        };

        Self {
            env,
            supabase_url,
            supabase_anon_key,
            jwt_secret: non_empty("SUPABASE_JWT_SECRET"),
            admin_emails: parse_list(&env::var("ADMIN_EMAILS").unwrap_or_default()),
            database_url: non_empty("DATABASE_URL"),
            content_cache_ttl_secs: parse_secs("CONTENT_CACHE_TTL_SECS", 30),
            backend_timeout_secs: parse_secs("BACKEND_TIMEOUT_SECS", 30),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            storage,
        }
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    /// `None` when the content cache is disabled.
    pub fn content_cache_ttl(&self) -> Option<Duration> {
        (self.content_cache_ttl_secs > 0).then(|| Duration::from_secs(self.content_cache_ttl_secs))
    }

    /// Session cookies are only marked `Secure` outside local development.
    pub fn secure_cookies(&self) -> bool {
        self.env == Env::Production
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_secs(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("{key}={raw:?} is not a number of seconds, using {default}");
            default
        }),
        Err(_) => default,
    }
}

/// Splits a comma-separated list, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_parsing_drops_blanks() {
        assert_eq!(
            parse_list(" a@x.com, ,B@y.org,"),
            vec!["a@x.com".to_string(), "B@y.org".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn zero_ttl_disables_cache() {
        let config = AppConfig {
            content_cache_ttl_secs: 0,
            ..AppConfig::default()
        };
        assert_eq!(config.content_cache_ttl(), None);
    }
}
