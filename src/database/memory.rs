use crate::database::session::{MAX_TOKEN_ATTEMPTS, SessionStore, generate_session_token, session_window};
use crate::error::app_error::AppError;
use crate::models::session::{Session, SessionOrigin};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

/// In-process session store with the same semantics as the SQLite one,
/// minus durability and the foreign key on `user_id`.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    next_id: AtomicI64,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, user_id: i64, origin: &SessionOrigin, ttl: Duration) -> Result<Session, AppError> {
        let (created_at, expires_at) = session_window(Utc::now(), ttl)?;
        let mut sessions = self.sessions.write().await;

        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = generate_session_token();
            if sessions.contains_key(&token) {
                continue;
            }
            let session = Session {
                id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
                session_id: token.clone(),
                user_id,
                user_agent: origin.user_agent.clone(),
                real_ip: origin.real_ip.clone(),
                expires_at,
                created_at,
            };
            sessions.insert(token, session.clone());
            return Ok(session);
        }

        Err(AppError::TokenExhausted {
            attempts: MAX_TOKEN_ATTEMPTS,
        })
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, AppError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, AppError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at >= cutoff);
        Ok((before - sessions.len()) as u64)
    }

    async fn list_sessions_for_user(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<Session>, AppError> {
        let mut listed: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id && !s.is_expired_at(now))
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(listed)
    }

    async fn delete_sessions_for_user(&self, user_id: i64) -> Result<u64, AppError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }
}
