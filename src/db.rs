use crate::config::DatabaseConfig;
use crate::error::app_error::AppError;
use rocket::fairing::AdHoc;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Open the pool, verify the store is reachable and apply migrations.
///
/// Any error here is fatal for the caller: nothing may be served without a
/// reachable store.
pub async fn init_pool(db_config: &DatabaseConfig) -> Result<SqlitePool, AppError> {
    let in_memory = is_in_memory(&db_config.url);

    let mut options = SqliteConnectOptions::from_str(&db_config.url)
        .map_err(|e| AppError::db("Invalid database url", e))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(db_config.acquire_timeout));
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    // Every connection to `sqlite::memory:` is its own database, so the pool
    // must hold exactly one connection that is never recycled.
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new()
            .max_connections(db_config.max_connections)
            .min_connections(db_config.min_connections)
            .idle_timeout(Duration::from_secs(30))
            .max_lifetime(Duration::from_secs(1800))
    };

    let pool = pool_options
        .acquire_timeout(Duration::from_secs(db_config.acquire_timeout))
        .connect_with(options)
        .await
        .map_err(|e| AppError::db("Failed to connect to database", e))?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| AppError::db("Database is not reachable", e))?;

    MIGRATOR.run(&pool).await?;

    Ok(pool)
}

pub fn stage_db(db_config: DatabaseConfig) -> AdHoc {
    AdHoc::try_on_ignite("SQLite (sqlx)", |rocket| async move {
        match init_pool(&db_config).await {
            Ok(pool) => {
                tracing::info!(url = %db_config.url, "Database pool initialized successfully");
                Ok(rocket.manage(pool))
            }
            Err(e) => {
                tracing::error!(error = ?e, url = %db_config.url, "Failed to initialize database pool");
                Err(rocket)
            }
        }
    })
}
