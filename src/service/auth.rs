use crate::database::sqlite_repository::SqliteRepository;
use crate::error::app_error::AppError;
use crate::models::session::SessionOrigin;
use crate::models::user::User;
use crate::service::session::SessionManager;
use tracing::{info, warn};

/// Successful credential check plus the session issued for it.
pub struct LoginOutcome {
    pub session_id: String,
    pub user: User,
}

pub struct AuthService<'a> {
    pub repo: &'a SqliteRepository,
    pub sessions: &'a SessionManager,
}

impl<'a> AuthService<'a> {
    pub fn new(repo: &'a SqliteRepository, sessions: &'a SessionManager) -> Self {
        Self { repo, sessions }
    }

    /// Check credentials and issue a session.
    ///
    /// Unknown users and wrong passwords are indistinguishable to the caller.
    /// `previous` is the session the client already presented; it is revoked
    /// before the new one is issued, so a failed revoke leaves no orphan row.
    pub async fn login(
        &self,
        login: &str,
        password: &str,
        origin: &SessionOrigin,
        previous: Option<&str>,
    ) -> Result<LoginOutcome, AppError> {
        let Some(user) = self.repo.get_user_by_login(login).await? else {
            SqliteRepository::dummy_verify(password);
            warn!(ip = origin.real_ip.as_deref().unwrap_or("unknown"), "Login for unknown user");
            return Err(AppError::InvalidCredentials);
        };

        if let Err(e) = self.repo.verify_password(&user, password) {
            warn!(user_id = user.id, ip = origin.real_ip.as_deref().unwrap_or("unknown"), "Login with wrong password");
            return Err(e);
        }

        if let Some(previous) = previous {
            self.sessions.revoke(previous).await?;
        }

        let session_id = self.sessions.issue(user.id, origin).await?;
        info!(user_id = user.id, "User logged in");

        Ok(LoginOutcome { session_id, user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::session::SessionStore;
    use crate::models::session::{Session, SessionValidation};
    use crate::test_utils::test_repository;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Arc;

    /// SQLite store whose single-session deletes always fail.
    struct RevokeFailingStore {
        inner: SqliteRepository,
    }

    #[async_trait::async_trait]
    impl SessionStore for RevokeFailingStore {
        async fn create_session(&self, user_id: i64, origin: &SessionOrigin, ttl: Duration) -> Result<Session, AppError> {
            self.inner.create_session(user_id, origin, ttl).await
        }

        async fn get_session(&self, session_id: &str) -> Result<Option<Session>, AppError> {
            self.inner.get_session(session_id).await
        }

        async fn delete_session(&self, _: &str) -> Result<bool, AppError> {
            Err(AppError::db("delete", sqlx::Error::PoolClosed))
        }

        async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
            self.inner.delete_expired_before(cutoff).await
        }

        async fn list_sessions_for_user(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<Session>, AppError> {
            self.inner.list_sessions_for_user(user_id, now).await
        }

        async fn delete_sessions_for_user(&self, user_id: i64) -> Result<u64, AppError> {
            self.inner.delete_sessions_for_user(user_id).await
        }
    }

    #[tokio::test]
    async fn login_issues_a_valid_session() {
        let repo = test_repository().await;
        let user = repo.create_user("alice", "alice@example.com", "correct horse").await.expect("create");
        let sessions = SessionManager::with_ttl(Arc::new(repo.clone()), Duration::hours(1));
        let auth = AuthService::new(&repo, &sessions);

        let outcome = auth
            .login("alice@example.com", "correct horse", &SessionOrigin::default(), None)
            .await
            .expect("login");
        assert_eq!(outcome.user.id, user.id);
        assert_eq!(
            sessions.validate(&outcome.session_id).await.expect("validate"),
            SessionValidation::Valid { user_id: user.id }
        );
    }

    #[tokio::test]
    async fn bad_credentials_issue_nothing() {
        let repo = test_repository().await;
        let user = repo.create_user("alice", "alice@example.com", "correct horse").await.expect("create");
        let sessions = SessionManager::with_ttl(Arc::new(repo.clone()), Duration::hours(1));
        let auth = AuthService::new(&repo, &sessions);

        let wrong = auth.login("alice", "battery staple", &SessionOrigin::default(), None).await;
        assert!(matches!(wrong, Err(AppError::InvalidCredentials)));
        let unknown = auth.login("mallory", "battery staple", &SessionOrigin::default(), None).await;
        assert!(matches!(unknown, Err(AppError::InvalidCredentials)));

        assert!(sessions.active_sessions(user.id).await.expect("active").is_empty());
    }

    #[tokio::test]
    async fn login_replaces_the_presented_session() {
        let repo = test_repository().await;
        let user = repo.create_user("alice", "alice@example.com", "correct horse").await.expect("create");
        let sessions = SessionManager::with_ttl(Arc::new(repo.clone()), Duration::hours(1));
        let auth = AuthService::new(&repo, &sessions);

        let first = auth
            .login("alice", "correct horse", &SessionOrigin::default(), None)
            .await
            .expect("first login");
        let second = auth
            .login("alice", "correct horse", &SessionOrigin::default(), Some(&first.session_id))
            .await
            .expect("second login");

        assert_eq!(sessions.validate(&first.session_id).await.expect("validate"), SessionValidation::Invalid);
        let active = sessions.active_sessions(user.id).await.expect("active");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_id, second.session_id);
    }

    #[tokio::test]
    async fn failed_revoke_of_presented_session_issues_nothing() {
        let repo = test_repository().await;
        let user = repo.create_user("alice", "alice@example.com", "correct horse").await.expect("create");
        let store = Arc::new(RevokeFailingStore { inner: repo.clone() });
        let sessions = SessionManager::with_ttl(store, Duration::hours(1));
        let auth = AuthService::new(&repo, &sessions);

        let err = auth
            .login("alice", "correct horse", &SessionOrigin::default(), Some("stale-token"))
            .await
            .err()
            .expect("revoke failure aborts login");
        assert!(err.is_store_error());
        assert!(sessions.active_sessions(user.id).await.expect("active").is_empty());
    }
}
