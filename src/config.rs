use crate::security::Credentials;
use anyhow::{Context, Result};
use std::fmt;

#[derive(Clone)]
pub struct Config {
    // Stores
    pub mongo_uri_dev: String,
    pub mongo_uri_release: String,
    pub db_name: String,

    // Login gate
    pub admin_username: String,
    pub admin_password: String,

    // Server
    pub port: u16,
    pub session_ttl_minutes: u32,
    /// Mark the session cookie `Secure`. Disable only for plain-HTTP local use.
    pub secure_cookies: bool,

    // Pagination
    pub default_page_size: u64,
    pub max_page_size: u64,

    // Promote
    pub replication_batch_size: u64,
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let default_page_size = parse_or("DEFAULT_PAGE_SIZE", 10u64).max(1);
        let max_page_size = parse_or("MAX_PAGE_SIZE", 200u64).max(default_page_size);

        Ok(Self {
            mongo_uri_dev: std::env::var("MONGO_URI_DEV").context("MONGO_URI_DEV not set")?,
            mongo_uri_release: std::env::var("MONGO_URI_RELEASE")
                .context("MONGO_URI_RELEASE not set")?,
            db_name: std::env::var("DB_NAME").context("DB_NAME not set")?,

            admin_username: std::env::var("ADMIN_USERNAME").context("ADMIN_USERNAME not set")?,
            admin_password: std::env::var("ADMIN_PASSWORD").context("ADMIN_PASSWORD not set")?,

            port: parse_or("PORT", 8080),
            session_ttl_minutes: parse_or("SESSION_TTL_MINUTES", 720),
            secure_cookies: parse_or("SECURE_COOKIES", true),

            default_page_size,
            max_page_size,

            replication_batch_size: parse_or("REPLICATION_BATCH_SIZE", 100u64).max(1),
        })
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.session_ttl_minutes))
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.admin_username, &self.admin_password)
    }

    /// Clamp a requested page size to `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("mongo_uri_dev", &self.mongo_uri_dev)
            .field("mongo_uri_release", &self.mongo_uri_release)
            .field("db_name", &self.db_name)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"<redacted>")
            .field("port", &self.port)
            .field("session_ttl_minutes", &self.session_ttl_minutes)
            .field("secure_cookies", &self.secure_cookies)
            .field("default_page_size", &self.default_page_size)
            .field("max_page_size", &self.max_page_size)
            .field("replication_batch_size", &self.replication_batch_size)
            .finish()
    }
}
