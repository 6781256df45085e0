//! Session and credential lifecycle.
//!
//! Password hashing, signed token issuance and verification, refresh
//! token rotation and revocation, and login rate limiting.

mod password;
mod rate_limit;
mod service;
mod token;

pub use password::{validate_password_strength, PasswordHasher};
pub use rate_limit::{LoginRateLimiter, RateLimitConfig};
pub use service::{SessionManager, TokenPair};
pub use token::{Claims, TokenCodec, TokenType};
