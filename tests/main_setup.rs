use agency_site::{AppConfig, config::Env};
use serial_test::serial;
use std::{env, panic};

const ALL_VARS: [&str; 12] = [
    "APP_ENV",
    "SUPABASE_URL",
    "SUPABASE_ANON_KEY",
    "SUPABASE_JWT_SECRET",
    "ADMIN_EMAILS",
    "DATABASE_URL",
    "CONTENT_CACHE_TTL_SECS",
    "BACKEND_TIMEOUT_SECS",
    "BIND_ADDR",
    "S3_ACCESS_KEY",
    "S3_SECRET_KEY",
    "S3_BUCKET_NAME",
];

// --- Setup/Teardown Utilities ---

/// Runs `test` with a clean slate of config variables and restores them afterward.
fn run_with_env<T, R>(test: T) -> R
where
    T: FnOnce() -> R + panic::UnwindSafe,
{
    let originals: Vec<(&str, Option<String>)> = ALL_VARS.iter().map(|&var| (var, env::var(var).ok())).collect();

    unsafe {
        for var in ALL_VARS {
            env::remove_var(var);
        }
    }

    let result = panic::catch_unwind(test);

    for (key, original_value) in originals.into_iter().rev() {
        unsafe {
            if let Some(val) = original_value {
                env::set_var(key, val);
            } else {
                env::remove_var(key);
            }
        }
    }

    match result {
        Ok(value) => value,
        Err(e) => panic::resume_unwind(e),
    }
}

fn set(vars: &[(&str, &str)]) {
    unsafe {
        for (key, value) in vars {
            env::set_var(key, value);
        }
    }
}

// --- Tests ---

#[test]
#[serial]
fn test_missing_backend_url_fails_fast() {
    let result = run_with_env(|| {
        panic::catch_unwind(|| {
            set(&[("SUPABASE_ANON_KEY", "anon")]);
            AppConfig::load()
        })
    });
    assert!(result.is_err(), "config loading should panic without SUPABASE_URL");
}

#[test]
#[serial]
fn test_missing_anon_key_fails_fast() {
    let result = run_with_env(|| {
        panic::catch_unwind(|| {
            set(&[("SUPABASE_URL", "http://localhost:54321")]);
            AppConfig::load()
        })
    });
    assert!(result.is_err(), "config loading should panic without SUPABASE_ANON_KEY");
}

#[test]
#[serial]
fn test_local_env_defaults() {
    let config = run_with_env(|| {
        set(&[
            ("SUPABASE_URL", "http://localhost:54321/"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("ADMIN_EMAILS", "owner@agency.io, ,editor@agency.io"),
        ]);
        AppConfig::load()
    });

    assert_eq!(config.env, Env::Local);
    assert_eq!(config.supabase_url, "http://localhost:54321");
    assert_eq!(config.jwt_secret, None);
    assert_eq!(config.database_url, None);
    assert_eq!(config.content_cache_ttl_secs, 30);
    assert_eq!(config.bind_addr, "0.0.0.0:3000");
    assert_eq!(config.admin_emails, vec!["owner@agency.io", "editor@agency.io"]);
    assert!(!config.secure_cookies());

    // Dockerised MinIO.
    let storage = config.storage.expect("local storage");
    assert_eq!(storage.endpoint, "http://localhost:9000");
    assert_eq!(storage.bucket, "agency-media");
}

#[test]
#[serial]
fn test_overrides_are_read() {
    let config = run_with_env(|| {
        set(&[
            ("SUPABASE_URL", "http://localhost:54321"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("SUPABASE_JWT_SECRET", "local-secret"),
            ("CONTENT_CACHE_TTL_SECS", "0"),
            ("BACKEND_TIMEOUT_SECS", "not-a-number"),
            ("S3_BUCKET_NAME", "custom"),
        ]);
        AppConfig::load()
    });

    assert_eq!(config.jwt_secret.as_deref(), Some("local-secret"));
    assert_eq!(config.content_cache_ttl(), None);
    assert_eq!(config.backend_timeout_secs, 30);
    assert_eq!(config.storage.map(|s| s.bucket), Some("custom".to_string()));
}

#[test]
#[serial]
fn test_production_without_storage_keys_disables_uploads() {
    let config = run_with_env(|| {
        set(&[
            ("APP_ENV", "production"),
            ("SUPABASE_URL", "https://project.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("S3_ACCESS_KEY", ""),
        ]);
        AppConfig::load()
    });

    assert_eq!(config.env, Env::Production);
    assert!(config.secure_cookies());
    assert!(config.storage.is_none());
    assert!(config.admin_emails.is_empty());
}

#[test]
#[serial]
fn test_production_storage_uses_backend_gateway() {
    let config = run_with_env(|| {
        set(&[
            ("APP_ENV", "production"),
            ("SUPABASE_URL", "https://project.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("S3_ACCESS_KEY", "key"),
            ("S3_SECRET_KEY", "secret"),
        ]);
        AppConfig::load()
    });

    let storage = config.storage.expect("production storage");
    assert_eq!(storage.endpoint, "https://project.supabase.co/storage/v1/s3");
    assert_eq!(storage.access_key, "key");
    assert_eq!(storage.secret_key, "secret");
}
