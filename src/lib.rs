pub mod config;
pub mod error;
pub mod identity;
pub mod redact;
pub mod security;
pub mod server;
pub mod storage;

pub use config::AuthConfig;
pub use error::{AppError, AuthError};
pub use identity::AuthService;
