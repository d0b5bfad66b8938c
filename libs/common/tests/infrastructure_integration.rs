//! Integration tests for the infrastructure components
//!
//! These tests verify that PostgreSQL and Redis are reachable with the
//! configuration the dispatch service reads at startup.

use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool},
};
use sqlx::Row;

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL and Redis at REDIS_URL"]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    assert!(health_check(&pool).await?, "Database health check failed");

    let row = sqlx::query("SELECT 1 as result").fetch_one(&pool).await?;
    let result: i32 = row.get("result");
    assert_eq!(result, 1, "PostgreSQL simple query test failed");

    let redis_config = RedisConfig::from_env().ok_or("REDIS_URL is not set")?;
    let redis_pool = RedisPool::new(&redis_config).await?;

    assert!(
        redis_pool.health_check().await?,
        "Redis health check failed"
    );

    let key = format!("integration:window:{}", std::process::id());
    let first = redis_pool.hit(&key, 10).await?;
    let second = redis_pool.hit(&key, 10).await?;
    assert_eq!(second, first + 1, "Redis window counter did not increment");

    Ok(())
}
