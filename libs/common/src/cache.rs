//! Redis cache module
//!
//! This module provides the Redis connection used for counters that must be
//! shared between service instances, such as fixed-window rate limits.

use anyhow::Result;
use redis::Client;
use tracing::info;

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// Redis is optional for the services in this workspace, so an unset
    /// `REDIS_URL` yields `None` instead of a default address.
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL
    pub fn from_env() -> Option<Self> {
        std::env::var("REDIS_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(|url| RedisConfig { url })
    }
}

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Initialize a new Redis connection pool
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool { client })
    }

    /// Get a connection from the pool
    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Count one hit against a fixed window and return the total so far.
    ///
    /// The key is created with a TTL of `window_seconds` on the first hit of
    /// a window; later hits only increment it, so the window never slides.
    pub async fn hit(&self, key: &str, window_seconds: u64) -> Result<u64> {
        let mut conn = self.get_connection().await?;

        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(0)
            .arg("EX")
            .arg(window_seconds.max(1))
            .arg("NX")
            .ignore()
            .incr(key, 1u64)
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_redis_config_requires_url() {
        unsafe {
            std::env::remove_var("REDIS_URL");
        }
        assert!(RedisConfig::from_env().is_none());

        unsafe {
            std::env::set_var("REDIS_URL", "redis://cache:6379");
        }
        let config = RedisConfig::from_env().expect("config should be present");
        assert_eq!(config.url, "redis://cache:6379");

        unsafe {
            std::env::remove_var("REDIS_URL");
        }
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at localhost:6379"]
    async fn test_redis_connection() -> Result<()> {
        let config = RedisConfig {
            url: "redis://localhost:6379".to_string(),
        };

        let pool = RedisPool::new(&config).await?;
        assert!(pool.health_check().await?);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at localhost:6379"]
    async fn test_hit_counts_within_window() -> Result<()> {
        let config = RedisConfig {
            url: "redis://localhost:6379".to_string(),
        };

        let pool = RedisPool::new(&config).await?;
        let key = format!("test:hit:{}", std::process::id());

        assert_eq!(pool.hit(&key, 5).await?, 1);
        assert_eq!(pool.hit(&key, 5).await?, 2);
        assert_eq!(pool.hit(&key, 5).await?, 3);

        Ok(())
    }
}
