use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use deadpool_postgres::{Config, Pool, PoolConfig, Runtime};
use tokio_postgres::NoTls;

/// Posts per page on every public listing.
pub const PAGE_SIZE: i64 = 10;
/// Rows per page in admin changelists.
pub const ADMIN_PAGE_SIZE: i64 = 100;

const DEV_JWT_SECRET: &str = "postboard-development-secret";

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_address: String,
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
    pub media_root: PathBuf,
    pub max_upload_bytes: usize,
    pub staff_usernames: Vec<String>,
    pub allowed_origins: Vec<String>,
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} is not a valid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let port: u16 = parse_var("PORT", 8080)?;

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret.trim().to_string(),
            _ => {
                log::warn!("JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        Ok(Self {
            bind_address: format!("0.0.0.0:{port}"),
            jwt_secret,
            session_ttl_hours: parse_var("SESSION_TTL_HOURS", 24 * 14)?,
            media_root: PathBuf::from(env::var("MEDIA_ROOT").unwrap_or_else(|_| "media".into())),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", 5 * 1024 * 1024)?,
            staff_usernames: comma_list(&env::var("STAFF_USERNAMES").unwrap_or_default()),
            allowed_origins: comma_list(
                &env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:8080,http://127.0.0.1:8080".into()),
            ),
        })
    }

    pub fn is_staff(&self, username: &str) -> bool {
        self.staff_usernames.iter().any(|staff| staff == username)
    }
}

/// Builds the PostgreSQL pool, or `None` when `PG_HOST` is not configured.
pub fn get_pg_pool() -> Result<Option<Pool>> {
    let Ok(host) = env::var("PG_HOST") else {
        return Ok(None);
    };

    let mut cfg = Config::new();
    cfg.host = Some(host);
    cfg.user = Some(env::var("PG_USER").context("PG_USER not set")?);
    cfg.password = env::var("PG_PASS").ok();
    cfg.dbname = Some(env::var("PG_DB").context("PG_DB not set")?);

    let mut pool = PoolConfig::default();
    pool.max_size = parse_var("PG_POOL_SIZE", 16)?;
    cfg.pool = Some(pool);

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map(Some)
        .context("failed to create postgres pool")
}
