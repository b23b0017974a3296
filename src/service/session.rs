use crate::config::SessionConfig;
use crate::database::session::SessionStore;
use crate::error::app_error::AppError;
use crate::models::session::{Session, SessionOrigin, SessionValidation};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Turns stored session rows into authentication decisions.
///
/// Validity is the conjunction of "row exists" and `now < expires_at`. Rows
/// that are past expiry but not yet swept stay invalid; only the reaper
/// removes them.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, config: &SessionConfig) -> Self {
        Self::with_ttl(store, config.ttl())
    }

    pub fn with_ttl(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Issue a new session for an authenticated user and return its token.
    pub async fn issue(&self, user_id: i64, origin: &SessionOrigin) -> Result<String, AppError> {
        let session = self.store.create_session(user_id, origin, self.ttl).await?;
        info!(
            user_id,
            session = session.id,
            expires_at = %session.expires_at,
            "Issued session"
        );
        Ok(session.session_id)
    }

    pub async fn validate(&self, session_id: &str) -> Result<SessionValidation, AppError> {
        self.validate_at(session_id, Utc::now()).await
    }

    /// Read-only: an expired row is reported invalid and left for the reaper.
    pub async fn validate_at(&self, session_id: &str, now: DateTime<Utc>) -> Result<SessionValidation, AppError> {
        match self.store.get_session(session_id).await? {
            Some(session) if !session.is_expired_at(now) => Ok(SessionValidation::Valid { user_id: session.user_id }),
            Some(session) => {
                debug!(session = session.id, expires_at = %session.expires_at, "Rejected expired session");
                Ok(SessionValidation::Invalid)
            }
            None => Ok(SessionValidation::Invalid),
        }
    }

    /// Revoking an unknown or already revoked token is not an error.
    pub async fn revoke(&self, session_id: &str) -> Result<(), AppError> {
        if self.store.delete_session(session_id).await? {
            info!("Revoked session");
        } else {
            debug!("Revoke requested for unknown session");
        }
        Ok(())
    }

    pub async fn active_sessions(&self, user_id: i64) -> Result<Vec<Session>, AppError> {
        self.store.list_sessions_for_user(user_id, Utc::now()).await
    }

    pub async fn revoke_all(&self, user_id: i64) -> Result<u64, AppError> {
        let revoked = self.store.delete_sessions_for_user(user_id).await?;
        info!(user_id, revoked, "Revoked all sessions of user");
        Ok(revoked)
    }
}
