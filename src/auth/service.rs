use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::password::{validate_password_strength, PasswordHasher};
use crate::auth::rate_limit::{LoginRateLimiter, RateLimitConfig};
use crate::auth::token::{TokenCodec, TokenType};
use crate::config::AuthConfig;
use crate::db::models::{RefreshToken, User};
use crate::db::store::AuthStore;
use crate::error::{AppError, AuthError};

/// Response shape handed to the HTTP layer on login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Orchestrates credential verification, token issuance, rotation and
/// revocation on top of the persistence seam.
///
/// Refresh tokens follow a single lineage: issued on login, rotated
/// (retired and reissued) on every refresh, revoked on logout or
/// account deactivation, deleted once expired by the cleanup job.
pub struct SessionManager {
    store: Arc<dyn AuthStore>,
    codec: TokenCodec,
    hasher: PasswordHasher,
    limiter: LoginRateLimiter,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn AuthStore>,
        auth: &AuthConfig,
        rate_limit: RateLimitConfig,
    ) -> Result<Self, AppError> {
        let codec = TokenCodec::new(&auth.jwt_secret)?;

        Ok(Self {
            store,
            codec,
            hasher: PasswordHasher::new(),
            limiter: LoginRateLimiter::new(rate_limit),
            access_ttl: Duration::minutes(auth.access_token_expiry_minutes),
            refresh_ttl: Duration::minutes(auth.refresh_token_expiry_minutes),
        })
    }

    /// Create a new active user with a hashed password.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<User, AppError> {
        let email = normalize_identifier(email);

        if !validate_password_strength(password) {
            return Err(AppError::ValidationError(
                "Password must be at least 8 characters with upper, lower, digit and special characters".into(),
            ));
        }

        let hashed_password = self.hasher.hash(password).await?;
        let user = self
            .store
            .create_user(&User::new(email, hashed_password, full_name.map(String::from)))
            .await?;

        info!("New user registered: {}", user.email);
        Ok(user)
    }

    /// Verify credentials against the active user matching `identifier`.
    ///
    /// Unknown identifier and wrong password are indistinguishable: both
    /// return `Ok(None)`.
    pub async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<Option<User>, AppError> {
        let email = normalize_identifier(identifier);

        let user = match self.store.find_active_user_by_email(&email).await? {
            Some(user) => user,
            None => return Ok(None),
        };

        if !self.hasher.verify(password, &user.hashed_password).await {
            return Ok(None);
        }

        // Best-effort telemetry; a failed write must not fail the login.
        if let Err(e) = self.store.touch_last_login(user.id).await {
            warn!("Failed to update last_login for {}: {}", user.id, e);
        }

        Ok(Some(user))
    }

    /// Authenticate and issue an access/refresh token pair.
    ///
    /// The rate limiter is consulted before credentials are touched and
    /// fed only on failed authentications.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<TokenPair, AppError> {
        let email = normalize_identifier(identifier);

        if !self.limiter.is_allowed(&email).await {
            warn!("Rate limited login attempt for {}", email);
            return Err(AuthError::RateLimited.into());
        }

        let user = match self.authenticate(&email, password).await? {
            Some(user) => user,
            None => {
                self.limiter.record_attempt(&email).await;
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let pair = self.issue_pair(user.id)?;
        let record = self.build_refresh_record(user.id, &pair.refresh_token)?;
        self.store.insert_refresh_token(&record).await?;

        info!("User logged in: {}", user.email);
        Ok(pair)
    }

    /// Exchange an active refresh token for a new token pair.
    ///
    /// Rotation is single-use: the old token is revoked in the same
    /// atomic unit that persists the new one, so replaying the old token
    /// after a successful refresh always fails.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        if self.codec.decode(refresh_token, TokenType::Refresh).is_none() {
            return Err(AuthError::InvalidToken.into());
        }

        let (user, _record) = self
            .store
            .find_active_refresh_token(refresh_token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let pair = self.issue_pair(user.id)?;
        let record = self.build_refresh_record(user.id, &pair.refresh_token)?;
        self.store.rotate_refresh_token(refresh_token, &record).await?;

        debug!("Rotated refresh token for {}", user.email);
        Ok(pair)
    }

    /// Revoke a refresh token. Idempotent: revoking an unknown, expired
    /// or already-revoked token is still a successful logout.
    pub async fn logout(&self, refresh_token: &str) {
        match self.store.revoke_refresh_token(refresh_token).await {
            Ok(revoked) => debug!("Logout revoked token: {}", revoked),
            Err(e) => error!("Failed to revoke refresh token on logout: {}", e),
        }
    }

    /// Resolve an access token to its subject id, or `None` if the token
    /// fails verification in any way.
    pub fn validate(&self, access_token: &str) -> Option<Uuid> {
        self.codec
            .decode(access_token, TokenType::Access)
            .and_then(|claims| Uuid::parse_str(&claims.sub).ok())
    }

    /// Load the user behind an access token, surfacing `InactiveUser`
    /// distinctly when the account has been deactivated.
    pub async fn current_user(&self, access_token: &str) -> Result<User, AppError> {
        let subject = self.validate(access_token).ok_or(AuthError::InvalidToken)?;

        let user = self
            .store
            .find_user_by_id(subject)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !user.is_active {
            return Err(AuthError::InactiveUser.into());
        }

        Ok(user)
    }

    /// Deactivate the account and revoke every refresh token it owns.
    pub async fn deactivate_account(&self, user_id: Uuid) -> Result<(), AppError> {
        self.store.deactivate_user(user_id).await?;
        self.store.revoke_all_for_user(user_id).await?;

        info!("Deactivated account {}", user_id);
        Ok(())
    }

    /// Periodic maintenance: purge expired refresh token rows and sweep
    /// idle rate-limiter entries. Returns the number of rows removed.
    pub async fn cleanup(&self) -> Result<u64, AppError> {
        let purged = self.store.purge_expired_tokens().await?;
        self.limiter.sweep().await;

        info!("Cleaned up {} expired refresh tokens", purged);
        Ok(purged)
    }

    fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, AppError> {
        let access_token = self.codec.encode(user_id, TokenType::Access, self.access_ttl)?;
        let refresh_token = self
            .codec
            .encode(user_id, TokenType::Refresh, self.refresh_ttl)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    /// Build the persistent row for a freshly issued refresh token,
    /// recovering `expires_at` from the token itself. A string that does
    /// not decode as a refresh token is never stored.
    fn build_refresh_record(&self, user_id: Uuid, token: &str) -> Result<RefreshToken, AppError> {
        let claims = self
            .codec
            .decode(token, TokenType::Refresh)
            .ok_or(AuthError::InvalidToken)?;

        let expires_at: DateTime<Utc> =
            DateTime::from_timestamp(claims.exp, 0).ok_or(AuthError::InvalidToken)?;

        Ok(RefreshToken::new(user_id, token.to_string(), expires_at))
    }
}

fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier(" A@B.com "), "a@b.com");
        assert_eq!(normalize_identifier("a@b.com"), "a@b.com");
    }

    #[test]
    fn test_token_pair_response_shape() {
        let pair = TokenPair {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            token_type: "bearer".to_string(),
            expires_in: 1800,
        };

        let json = serde_json::to_value(&pair).unwrap();
        assert_eq!(json["token_type"], "bearer");
        assert_eq!(json["expires_in"], 1800);
        assert_eq!(json["access_token"], "access");
    }
}
