use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use authd::db::{AuthStore, RefreshToken, User};
use authd::error::{AppError, AuthError, DatabaseError};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tokens: HashMap<String, RefreshToken>,
}

/// In-memory `AuthStore` used by the integration tests. A single lock
/// around both tables makes rotation trivially atomic, mirroring the
/// transactional guarantee of the Postgres implementation.
#[derive(Default)]
pub struct MemoryAuthStore {
    tables: Mutex<Tables>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn token_count(&self) -> usize {
        self.tables.lock().await.tokens.len()
    }
}

#[async_trait]
impl AuthStore for MemoryAuthStore {
    async fn create_user(&self, user: &User) -> Result<User, AppError> {
        let mut tables = self.tables.lock().await;

        if tables
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(AppError::DatabaseError(DatabaseError::Duplicate));
        }

        tables.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_active_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .find(|u| u.is_active && u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn touch_last_login(&self, user_id: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn deactivate_user(&self, user_id: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.is_active = false;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_refresh_token(&self, record: &RefreshToken) -> Result<RefreshToken, AppError> {
        let mut tables = self.tables.lock().await;

        if tables.tokens.contains_key(&record.token) {
            return Err(AppError::DatabaseError(DatabaseError::Duplicate));
        }

        tables.tokens.insert(record.token.clone(), record.clone());
        Ok(record.clone())
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        match tables.tokens.get_mut(token) {
            Some(record) if !record.is_revoked => {
                record.is_revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        for record in tables.tokens.values_mut() {
            if record.user_id == user_id {
                record.is_revoked = true;
            }
        }
        Ok(())
    }

    async fn find_active_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<(User, RefreshToken)>, AppError> {
        let tables = self.tables.lock().await;

        let record = match tables.tokens.get(token) {
            Some(record) if record.is_active() => record.clone(),
            _ => return Ok(None),
        };

        let user = match tables.users.get(&record.user_id) {
            Some(user) if user.is_active => user.clone(),
            _ => return Ok(None),
        };

        Ok(Some((user, record)))
    }

    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        new_record: &RefreshToken,
    ) -> Result<RefreshToken, AppError> {
        let mut tables = self.tables.lock().await;

        match tables.tokens.get_mut(old_token) {
            Some(record) if !record.is_revoked => record.is_revoked = true,
            _ => return Err(AppError::AuthError(AuthError::InvalidToken)),
        }

        tables
            .tokens
            .insert(new_record.token.clone(), new_record.clone());
        Ok(new_record.clone())
    }

    async fn purge_expired_tokens(&self) -> Result<u64, AppError> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let before = tables.tokens.len();
        tables.tokens.retain(|_, record| record.expires_at >= now);
        Ok((before - tables.tokens.len()) as u64)
    }
}
