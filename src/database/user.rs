use crate::config::UserDeletePolicy;
use crate::database::session::{is_foreign_key_violation, is_unique_violation};
use crate::database::sqlite_repository::SqliteRepository;
use crate::error::app_error::AppError;
use crate::models::user::User;
use argon2::Argon2;
use chrono::Utc;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use std::sync::LazyLock;
use tracing::info;

const COLUMNS: &str = "id, username, email, password_hash, created_at";

/// A real Argon2 hash generated once, used as a timing decoy so that logins
/// for unknown users cost the same as logins for existing ones.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| hash_password("dummy-never-matches").ok());

impl SqliteRepository {
    pub async fn create_user(&self, username: &str, email: &str, password: &str) -> Result<User, AppError> {
        let password_hash = hash_password(password)?;
        let query = format!(
            "INSERT INTO users (username, email, password_hash, created_at)
             VALUES (?, ?, ?, ?)
             RETURNING {COLUMNS}"
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(username)
            .bind(email)
            .bind(&password_hash)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::UserAlreadyExists(username.to_string())
                } else {
                    AppError::db("Failed to create user", e)
                }
            })?;

        Ok(user)
    }

    /// Looks the user up by username first, then by email.
    pub async fn get_user_by_login(&self, login: &str) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE username = ? OR email = ? ORDER BY username = ? DESC LIMIT 1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(login)
            .bind(login)
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = ?");
        let user = sqlx::query_as::<_, User>(&query).bind(id).fetch_optional(&self.pool).await?;

        Ok(user)
    }

    pub fn verify_password(&self, user: &User, password: &str) -> Result<(), AppError> {
        let password_hash = PasswordHash::new(&user.password_hash).map_err(|e| AppError::password_hash("Failed to parse stored password hash", e))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &password_hash)
            .map_err(|_| AppError::InvalidCredentials)
    }

    /// Throwaway verification for logins naming an unknown user.
    pub fn dummy_verify(password: &str) {
        if let Some(hash) = DUMMY_HASH.as_deref().and_then(|h| PasswordHash::new(h).ok()) {
            let _ = Argon2::default().verify_password(password.as_bytes(), &hash);
        }
    }

    /// Delete a user, handling their sessions according to `policy`.
    ///
    /// Under `Restrict` the foreign key on `sessions.user_id` (and on the
    /// forum content tables) makes the delete fail while anything still
    /// references the user; that is reported as a conflict.
    pub async fn delete_user(&self, id: i64, policy: UserDeletePolicy) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        if policy == UserDeletePolicy::RevokeSessions {
            let revoked = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::db("Failed to revoke sessions of deleted user", e))?
                .rows_affected();
            info!(user_id = id, revoked, "Revoked sessions of user being deleted");
        }

        let deleted = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    AppError::Conflict("user is still referenced by sessions or content".to_string())
                } else {
                    AppError::db("Failed to delete user", e)
                }
            })?
            .rows_affected();

        if deleted == 0 {
            return Err(AppError::NotFound(format!("user {id}")));
        }

        tx.commit().await?;
        Ok(())
    }
}

pub(crate) fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}
