use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    /// Random token id, refresh tokens only. Guarantees uniqueness even
    /// for two tokens issued to the same subject in the same second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Creates and verifies signed, expiring tokens (HS256).
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::Encoding("signing secret is not set".into()));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    pub fn encode(
        &self,
        subject: Uuid,
        token_type: TokenType,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: match token_type {
                TokenType::Refresh => Some(random_token_id()),
                TokenType::Access => None,
            },
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Encoding(e.to_string()))
    }

    /// Verify signature, expiry and type tag.
    ///
    /// Every failure collapses to `None`; callers must not be able to
    /// distinguish a bad signature from an expired token.
    pub fn decode(&self, token: &str, expected_type: TokenType) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .ok()?
            .claims;

        if claims.token_type != expected_type {
            return None;
        }

        Some(claims)
    }
}

fn random_token_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new("test_secret").unwrap()
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(TokenCodec::new(""), Err(AuthError::Encoding(_))));
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        let subject = Uuid::new_v4();

        let token = codec
            .encode(subject, TokenType::Access, Duration::minutes(30))
            .unwrap();
        let claims = codec.decode(&token, TokenType::Access).unwrap();

        assert_eq!(claims.sub, subject.to_string());
        assert_eq!(claims.token_type, TokenType::Access);
        assert!(claims.exp > claims.iat);
        assert!(claims.jti.is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let codec = codec();
        let token = codec
            .encode(Uuid::new_v4(), TokenType::Access, Duration::minutes(-1))
            .unwrap();

        assert!(codec.decode(&token, TokenType::Access).is_none());
    }

    #[test]
    fn test_type_isolation() {
        let codec = codec();
        let subject = Uuid::new_v4();

        let access = codec
            .encode(subject, TokenType::Access, Duration::minutes(30))
            .unwrap();
        let refresh = codec
            .encode(subject, TokenType::Refresh, Duration::minutes(30))
            .unwrap();

        assert!(codec.decode(&access, TokenType::Refresh).is_none());
        assert!(codec.decode(&refresh, TokenType::Access).is_none());
        assert!(codec.decode(&access, TokenType::Access).is_some());
        assert!(codec.decode(&refresh, TokenType::Refresh).is_some());
    }

    #[test]
    fn test_refresh_tokens_are_unique() {
        let codec = codec();
        let subject = Uuid::new_v4();

        // Same subject, same instant: jti still makes the strings differ.
        let first = codec
            .encode(subject, TokenType::Refresh, Duration::minutes(30))
            .unwrap();
        let second = codec
            .encode(subject, TokenType::Refresh, Duration::minutes(30))
            .unwrap();

        assert_ne!(first, second);
        let claims = codec.decode(&first, TokenType::Refresh).unwrap();
        assert_eq!(claims.jti.as_ref().map(String::len), Some(32));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let codec = codec();
        let other = TokenCodec::new("other_secret").unwrap();

        let token = codec
            .encode(Uuid::new_v4(), TokenType::Access, Duration::minutes(30))
            .unwrap();

        assert!(other.decode(&token, TokenType::Access).is_none());
    }

    #[test]
    fn test_garbage_rejected() {
        let codec = codec();
        assert!(codec.decode("not.a.token", TokenType::Access).is_none());
        assert!(codec.decode("", TokenType::Refresh).is_none());
    }
}
