use anyhow::{Context, Result};
use std::env;

use crate::middleware::rate_limiter::RateLimitConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitSettings,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
    /// Base used to build shareable poll links.
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `None` runs the service on the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub supabase_url: String,
    pub anon_key: String,
    pub jwt_secret: String,
}

// Keys stay out of logs
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("supabase_url", &self.supabase_url)
            .field("anon_key", &"<redacted>")
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub vote: RateLimitConfig,
    pub poll_creation: RateLimitConfig,
    pub poll_deletion: RateLimitConfig,
    pub cleanup_probability: f64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            vote: RateLimitConfig::vote(),
            poll_creation: RateLimitConfig::poll_creation(),
            poll_deletion: RateLimitConfig::poll_deletion(),
            cleanup_probability: 0.01,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid value for {}", name))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let window_ms: u64 = parse_var("RATE_LIMIT_WINDOW_MS", "60000")?;
        anyhow::ensure!(window_ms > 0, "RATE_LIMIT_WINDOW_MS must be greater than 0");

        let limit = |name: &str, base: RateLimitConfig| -> Result<RateLimitConfig> {
            let max: u32 = parse_var(name, &base.max.to_string())?;
            anyhow::ensure!(max > 0, "{} must be greater than 0", name);
            Ok(RateLimitConfig {
                max,
                window_ms,
                ..base
            })
        };

        Ok(Self {
            server: ServerConfig {
                port: parse_var("PORT", "3000")?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                public_base_url: env::var("PUBLIC_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string())
                    .trim_end_matches('/')
                    .to_string(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok().filter(|u| !u.is_empty()),
                max_connections: parse_var("DB_MAX_CONNECTIONS", "10")?,
                min_connections: parse_var("DB_MIN_CONNECTIONS", "1")?,
            },
            auth: AuthConfig {
                supabase_url: env::var("SUPABASE_URL")
                    .context("SUPABASE_URL must be set")?
                    .trim_end_matches('/')
                    .to_string(),
                anon_key: env::var("SUPABASE_ANON_KEY").context("SUPABASE_ANON_KEY must be set")?,
                jwt_secret: env::var("SUPABASE_JWT_SECRET")
                    .context("SUPABASE_JWT_SECRET must be set")?,
            },
            rate_limit: RateLimitSettings {
                vote: limit("RATE_LIMIT_VOTE_MAX", RateLimitConfig::vote())?,
                poll_creation: limit("RATE_LIMIT_POLL_CREATION_MAX", RateLimitConfig::poll_creation())?,
                poll_deletion: limit("RATE_LIMIT_POLL_DELETION_MAX", RateLimitConfig::poll_deletion())?,
                cleanup_probability: parse_var("RATE_LIMIT_CLEANUP_PROBABILITY", "0.01")?,
            },
            cache: CacheConfig {
                ttl_secs: parse_var("CACHE_TTL_SECS", "60")?,
                max_entries: parse_var("CACHE_MAX_ENTRIES", "10000")?,
            },
        })
    }

    /// Configuration for tests and local tooling: in-memory store, local
    /// auth endpoint, default limits.
    pub fn for_local(jwt_secret: &str) -> Self {
        Self {
            server: ServerConfig {
                port: 3000,
                host: "127.0.0.1".to_string(),
                cors_allowed_origins: vec!["http://localhost:3000".to_string()],
                public_base_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 1,
                min_connections: 1,
            },
            auth: AuthConfig {
                supabase_url: "http://localhost:54321".to_string(),
                anon_key: "anon".to_string(),
                jwt_secret: jwt_secret.to_string(),
            },
            rate_limit: RateLimitSettings::default(),
            cache: CacheConfig {
                ttl_secs: 60,
                max_entries: crate::cache::DEFAULT_MAX_ENTRIES,
            },
        }
    }
}
