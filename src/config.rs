use crate::popularity::CacheConfig;
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Default popularity cache TTL: 5 minutes in milliseconds
const DEFAULT_CACHE_TTL_MS: u64 = 5 * 60 * 1000;

/// Default bound on a single recomputation: 30 seconds
const DEFAULT_RECOMPUTE_TIMEOUT_MS: u64 = 30 * 1000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub mongo_url: String,
    pub mongo_db: String,
    pub cakes_collection: String,
    pub orders_collection: String,
    pub comments_collection: String,
}

#[derive(Debug, Clone)]
pub struct PopularityConfig {
    pub cache_ttl_ms: u64,
    /// `0` disables the timeout
    pub recompute_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub popularity: PopularityConfig,
    /// Enable debug logging for record-store queries (set via CLI)
    pub debug_queries: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mongo_url = env::var("MONGO_URL").context("MONGO_URL is required")?;

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse()?,
            },
            store: StoreConfig {
                mongo_url,
                mongo_db: env::var("MONGO_DB").unwrap_or_else(|_| "bakery".to_string()),
                cakes_collection: env::var("CAKES_COLLECTION")
                    .unwrap_or_else(|_| "cakes".to_string()),
                orders_collection: env::var("ORDERS_COLLECTION")
                    .unwrap_or_else(|_| "orders".to_string()),
                comments_collection: env::var("COMMENTS_COLLECTION")
                    .unwrap_or_else(|_| "comments".to_string()),
            },
            popularity: PopularityConfig {
                cache_ttl_ms: env_millis("POPULAR_CACHE_TTL_MS", DEFAULT_CACHE_TTL_MS),
                recompute_timeout_ms: env_millis(
                    "POPULAR_RECOMPUTE_TIMEOUT_MS",
                    DEFAULT_RECOMPUTE_TIMEOUT_MS,
                ),
            },
            debug_queries: false, // Set by CLI args in main.rs
        })
    }

    pub fn to_cache_config(&self) -> CacheConfig {
        let timeout_ms = self.popularity.recompute_timeout_ms;
        CacheConfig {
            ttl: Duration::from_millis(self.popularity.cache_ttl_ms),
            recompute_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        }
    }
}

fn env_millis(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
