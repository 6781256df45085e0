pub mod models;
pub mod store;

pub use models::{RefreshToken, User};
pub use store::{AuthStore, PgAuthStore};
