//! Request authentication: which paths need it, how a caller proves who they
//! are (HTTP Basic or a session cookie), and where sessions live.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
pub mod guard;
pub mod basic;
pub mod cookie;

pub use principal::{User, UserFilter, UserUpdate};
pub use session::{SessionBackend, SessionRegistry, EmbeddedSessions};
pub use provider::AuthService;
pub use guard::{requires_auth, PathGuard};
