use crate::Config;
use crate::database::sqlite_repository::SqliteRepository;
use crate::db::init_pool;
use crate::service::reaper::SessionReaper;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct ReapResult {
    pub sessions_deleted: u64,
}

/// Run a single reaper sweep against the configured database.
pub async fn reap_expired_sessions(config: &Config) -> Result<ReapResult, String> {
    let pool = init_pool(&config.database)
        .await
        .map_err(|err| format!("Failed to initialize database pool: {err:?}"))?;

    let reaper = SessionReaper::new(Arc::new(SqliteRepository::new(pool.clone())), config.session.reap_interval());
    let result = reaper.sweep().await.map_err(|err| format!("Failed to delete expired sessions: {err:?}"));

    pool.close().await;

    Ok(ReapResult {
        sessions_deleted: result?,
    })
}
