use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{RefreshToken, User};
use crate::error::{AppError, AuthError, DatabaseError};

/// Persistence seam for the session subsystem.
///
/// The session manager only ever talks to storage through this trait:
/// production wires in [`PgAuthStore`], tests wire in an in-memory fake.
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<User, AppError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Case-insensitive lookup, restricted to active accounts.
    async fn find_active_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn touch_last_login(&self, user_id: Uuid) -> Result<(), AppError>;

    async fn deactivate_user(&self, user_id: Uuid) -> Result<(), AppError>;

    async fn insert_refresh_token(&self, record: &RefreshToken) -> Result<RefreshToken, AppError>;

    /// Marks the matching row revoked. Returns whether a row was updated;
    /// revoking an unknown or already-revoked token is not an error.
    async fn revoke_refresh_token(&self, token: &str) -> Result<bool, AppError>;

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<(), AppError>;

    /// Matches on token string, `is_revoked = false`, `expires_at > now`
    /// and the owner's `is_active = true`. Any single miss yields `None`.
    async fn find_active_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<(User, RefreshToken)>, AppError>;

    /// Revoke-old + insert-new as a single atomic unit. If the old token
    /// no longer matches an unrevoked row the whole rotation aborts.
    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        new_record: &RefreshToken,
    ) -> Result<RefreshToken, AppError>;

    /// Deletes rows whose `expires_at` has passed; returns the count.
    async fn purge_expired_tokens(&self) -> Result<u64, AppError>;
}

pub struct PgAuthStore {
    pool: Arc<PgPool>,
}

impl PgAuthStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| {
                AppError::DatabaseError(DatabaseError::ConnectionError(e.to_string()))
            })?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn pool(&self) -> &PgPool {
        self.pool.as_ref()
    }
}

#[async_trait]
impl AuthStore for PgAuthStore {
    async fn create_user(&self, user: &User) -> Result<User, AppError> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, hashed_password, full_name, created_at, updated_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, email, hashed_password, full_name, created_at, updated_at, last_login, is_active
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(&user.full_name)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.is_active)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::DatabaseError(DatabaseError::Duplicate)
            }
            _ => e.into(),
        })?;

        Ok(created)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, hashed_password, full_name, created_at, updated_at, last_login, is_active FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn find_active_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, hashed_password, full_name, created_at, updated_at, last_login, is_active FROM users WHERE lower(email) = lower($1) AND is_active = TRUE",
        )
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn touch_last_login(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(user_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn deactivate_user(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET is_active = FALSE, updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(user_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn insert_refresh_token(&self, record: &RefreshToken) -> Result<RefreshToken, AppError> {
        let stored = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token, expires_at, is_revoked, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, token, expires_at, is_revoked, created_at
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token)
        .bind(record.expires_at)
        .bind(record.is_revoked)
        .bind(record.created_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(stored)
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = TRUE WHERE token = $1 AND is_revoked = FALSE",
        )
        .bind(token)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE refresh_tokens SET is_revoked = TRUE WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn find_active_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<(User, RefreshToken)>, AppError> {
        let record = sqlx::query_as::<_, RefreshToken>(
            "SELECT id, user_id, token, expires_at, is_revoked, created_at FROM refresh_tokens WHERE token = $1 AND is_revoked = FALSE AND expires_at > $2",
        )
        .bind(token)
        .bind(Utc::now())
        .fetch_optional(self.pool.as_ref())
        .await?;

        let record = match record {
            Some(record) => record,
            None => return Ok(None),
        };

        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, hashed_password, full_name, created_at, updated_at, last_login, is_active FROM users WHERE id = $1 AND is_active = TRUE",
        )
        .bind(record.user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user.map(|user| (user, record)))
    }

    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        new_record: &RefreshToken,
    ) -> Result<RefreshToken, AppError> {
        let mut transaction = self.pool.begin().await?;

        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = TRUE WHERE token = $1 AND is_revoked = FALSE",
        )
        .bind(old_token)
        .execute(&mut *transaction)
        .await?;

        // Lost a race with a concurrent rotation or revocation.
        if revoked.rows_affected() == 0 {
            transaction.rollback().await?;
            return Err(AuthError::InvalidToken.into());
        }

        let stored = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token, expires_at, is_revoked, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, token, expires_at, is_revoked, created_at
            "#,
        )
        .bind(new_record.id)
        .bind(new_record.user_id)
        .bind(&new_record.token)
        .bind(new_record.expires_at)
        .bind(new_record.is_revoked)
        .bind(new_record.created_at)
        .fetch_one(&mut *transaction)
        .await;

        match stored {
            Ok(stored) => {
                transaction.commit().await?;
                Ok(stored)
            }
            Err(e) => {
                transaction.rollback().await?;
                Err(e.into())
            }
        }
    }

    async fn purge_expired_tokens(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(Utc::now())
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}
