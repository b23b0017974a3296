use crate::database::session::SessionStore;
use crate::error::app_error::AppError;
use crate::service::session::SessionManager;
use chrono::Utc;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Orbit, Rocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Periodically deletes sessions whose `expires_at` has passed.
///
/// A failed sweep is logged and retried on the next tick; it never ends the
/// loop. The loop stops only when its cancellation token fires.
pub struct SessionReaper {
    store: Arc<dyn SessionStore>,
    interval: Duration,
}

impl SessionReaper {
    pub fn new(store: Arc<dyn SessionStore>, interval: Duration) -> Self {
        Self {
            store,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// One sweep: delete every session that expired before now.
    pub async fn sweep(&self) -> Result<u64, AppError> {
        self.store.delete_expired_before(Utc::now()).await
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(interval = ?self.interval, "Session reaper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Session reaper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    // Cancelling mid-sweep abandons the delete; the next run repeats it.
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("Session reaper shutting down during sweep");
                            break;
                        }
                        result = self.sweep() => self.report(result),
                    }
                }
            }
        }
    }

    fn report(&self, result: Result<u64, AppError>) {
        match result {
            Ok(0) => debug!("Session sweep: no expired sessions"),
            Ok(deleted) => info!(deleted, "Session sweep completed"),
            Err(e) => error!(error = ?e, "Session sweep failed"),
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}

/// Spawns the reaper when the server lifts off and cancels it on shutdown.
///
/// The store comes from the managed `SessionManager`, so this fairing must be
/// attached after the one that stages it.
pub struct ReaperFairing {
    interval: Duration,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl ReaperFairing {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }
}

#[rocket::async_trait]
impl Fairing for ReaperFairing {
    fn info(&self) -> Info {
        Info {
            name: "Session Reaper",
            kind: Kind::Liftoff | Kind::Shutdown | Kind::Singleton,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        match rocket.state::<SessionManager>() {
            Some(sessions) => {
                SessionReaper::new(sessions.store().clone(), self.interval).spawn(self.cancel.clone());
            }
            None => error!("Session reaper not started: no session manager is managed"),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::database::memory::MemorySessionStore;
    use crate::database::sqlite_repository::SqliteRepository;
    use crate::db::init_pool;
    use crate::models::session::{Session, SessionOrigin, SessionValidation};
    use crate::test_utils::insert_user;
    use chrono::{DateTime, Duration as ChronoDuration};
    use std::sync::atomic::AtomicU32;

    /// Store whose sweeps always fail, counting the attempts.
    #[derive(Default)]
    struct FailingStore {
        sweeps: AtomicU32,
    }

    #[async_trait::async_trait]
    impl SessionStore for FailingStore {
        async fn create_session(&self, _: i64, _: &SessionOrigin, _: ChronoDuration) -> Result<Session, AppError> {
            Err(AppError::db("create", sqlx::Error::PoolClosed))
        }

        async fn get_session(&self, _: &str) -> Result<Option<Session>, AppError> {
            Err(AppError::db("get", sqlx::Error::PoolClosed))
        }

        async fn delete_session(&self, _: &str) -> Result<bool, AppError> {
            Err(AppError::db("delete", sqlx::Error::PoolClosed))
        }

        async fn delete_expired_before(&self, _: DateTime<Utc>) -> Result<u64, AppError> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            Err(AppError::db("sweep", sqlx::Error::PoolClosed))
        }

        async fn list_sessions_for_user(&self, _: i64, _: DateTime<Utc>) -> Result<Vec<Session>, AppError> {
            Err(AppError::db("list", sqlx::Error::PoolClosed))
        }

        async fn delete_sessions_for_user(&self, _: i64) -> Result<u64, AppError> {
            Err(AppError::db("delete all", sqlx::Error::PoolClosed))
        }
    }

    #[tokio::test]
    async fn sweep_deletes_only_expired_sessions() {
        let store = Arc::new(MemorySessionStore::new());
        let live = store
            .create_session(1, &SessionOrigin::default(), ChronoDuration::hours(1))
            .await
            .expect("live");
        let stale = store
            .create_session(1, &SessionOrigin::default(), ChronoDuration::milliseconds(1))
            .await
            .expect("stale");
        tokio::time::sleep(Duration::from_millis(10)).await;

        let reaper = SessionReaper::new(store.clone(), Duration::from_secs(3600));
        assert_eq!(reaper.sweep().await.expect("sweep"), 1);
        assert_eq!(reaper.sweep().await.expect("second sweep"), 0);
        assert!(store.get_session(&live.session_id).await.expect("get").is_some());
        assert!(store.get_session(&stale.session_id).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn background_task_reaps_on_schedule_and_stops_on_cancel() {
        let store = Arc::new(MemorySessionStore::new());
        store
            .create_session(1, &SessionOrigin::default(), ChronoDuration::milliseconds(1))
            .await
            .expect("stale");

        let cancel = CancellationToken::new();
        let handle = SessionReaper::new(store.clone(), Duration::from_millis(20)).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.is_empty().await);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reaper stops after cancel")
            .expect("reaper task does not panic");
    }

    #[tokio::test]
    async fn failing_sweeps_do_not_stop_the_reaper() {
        let store = Arc::new(FailingStore::default());
        let cancel = CancellationToken::new();
        let handle = SessionReaper::new(store.clone(), Duration::from_millis(10)).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!handle.is_finished());
        assert!(store.sweeps.load(Ordering::SeqCst) >= 2);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reaper stops after cancel")
            .expect("reaper task does not panic");
    }

    #[tokio::test]
    async fn cancelled_before_first_tick_does_no_work() {
        let store = Arc::new(FailingStore::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        SessionReaper::new(store.clone(), Duration::from_secs(3600)).run(cancel).await;
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sweeps_run_alongside_live_traffic_on_a_shared_database() {
        const WORKERS: usize = 8;
        const ROUNDS: usize = 25;
        const STALE: u64 = 20;

        let dir = tempfile::tempdir().expect("temp dir");
        let db_config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("forum.db").display()),
            max_connections: 4,
            ..DatabaseConfig::default()
        };
        let pool = init_pool(&db_config).await.expect("file-backed database");
        let user_id = insert_user(&pool, "alice").await;
        let store: Arc<dyn SessionStore> = Arc::new(SqliteRepository::new(pool.clone()));

        let mut stale = Vec::new();
        for _ in 0..STALE {
            let session = store
                .create_session(user_id, &SessionOrigin::default(), ChronoDuration::milliseconds(1))
                .await
                .expect("stale session");
            stale.push(session.session_id);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        let sessions = SessionManager::with_ttl(store.clone(), ChronoDuration::hours(1));
        let reaper = Arc::new(SessionReaper::new(store.clone(), Duration::from_millis(1)));
        let stop = CancellationToken::new();

        let sweeper = {
            let reaper = reaper.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut deleted = 0;
                while !stop.is_cancelled() {
                    deleted += reaper.sweep().await?;
                    tokio::task::yield_now().await;
                }
                Ok::<u64, AppError>(deleted)
            })
        };

        let mut workers = Vec::new();
        for _ in 0..WORKERS {
            let sessions = sessions.clone();
            workers.push(tokio::spawn(async move {
                let mut kept = Vec::new();
                for round in 0..ROUNDS {
                    let token = sessions.issue(user_id, &SessionOrigin::default()).await?;
                    assert_eq!(sessions.validate(&token).await?, SessionValidation::Valid { user_id });
                    if round % 2 == 0 {
                        sessions.revoke(&token).await?;
                        assert_eq!(sessions.validate(&token).await?, SessionValidation::Invalid);
                    } else {
                        kept.push(token);
                    }
                }
                Ok::<Vec<String>, AppError>(kept)
            }));
        }

        let mut live = Vec::new();
        for worker in workers {
            live.extend(worker.await.expect("worker task").expect("no store errors under load"));
        }
        stop.cancel();
        let swept = sweeper.await.expect("sweeper task").expect("no sweep errors under load");
        let remaining = reaper.sweep().await.expect("final sweep");

        assert_eq!(swept + remaining, STALE);
        for token in &stale {
            assert!(store.get_session(token).await.expect("get").is_none());
        }
        for token in &live {
            assert_eq!(sessions.validate(token).await.expect("validate"), SessionValidation::Valid { user_id });
        }
        assert_eq!(sessions.active_sessions(user_id).await.expect("active").len(), live.len());

        pool.close().await;
    }
}
