use crate::config::{Config, DatabaseConfig};
use crate::database::sqlite_repository::SqliteRepository;
use crate::db::init_pool;
use chrono::Utc;
use sqlx::SqlitePool;

pub fn test_database_config() -> DatabaseConfig {
    DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        ..DatabaseConfig::default()
    }
}

/// Default configuration against a fresh in-memory database.
pub fn test_config() -> Config {
    Config {
        database: test_database_config(),
        ..Config::default()
    }
}

pub async fn test_repository() -> SqliteRepository {
    let pool = init_pool(&test_database_config()).await.expect("in-memory database");
    SqliteRepository::new(pool)
}

/// Insert a user row directly, skipping password hashing.
pub async fn insert_user(pool: &SqlitePool, username: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO users (username, email, password_hash, created_at) VALUES (?, ?, 'x', ?) RETURNING id")
        .bind(username)
        .bind(format!("{username}@example.com"))
        .bind(Utc::now())
        .fetch_one(pool)
        .await
        .expect("insert user")
}
