use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use super::principal::{UserFilter, UserUpdate};
use crate::storage::UserStore;

/// Session id -> user id mapping with an `ABSENT -> ACTIVE -> ABSENT` lifecycle.
///
/// Invalid or unknown input is never an error: creation yields `None`, lookup
/// yields `None`, destruction yields `false`.
pub trait SessionBackend: Send + Sync {
    fn create_session(&self, user_id: Option<&str>) -> Option<String>;
    fn user_id_for_session(&self, session_id: Option<&str>) -> Option<String>;
    fn destroy_session(&self, session_id: Option<&str>) -> bool;
}

impl<T: SessionBackend + ?Sized> SessionBackend for Arc<T> {
    fn create_session(&self, user_id: Option<&str>) -> Option<String> { (**self).create_session(user_id) }
    fn user_id_for_session(&self, session_id: Option<&str>) -> Option<String> { (**self).user_id_for_session(session_id) }
    fn destroy_session(&self, session_id: Option<&str>) -> bool { (**self).destroy_session(session_id) }
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Detached registry: sessions live in a map owned by this instance.
///
/// A user may hold any number of sessions at once (one per device/login).
/// Lookups share the read lock; create and destroy take the write lock.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    // session id -> user id
    sessions: RwLock<HashMap<String, String>>,
}

impl SessionRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.sessions.read().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl SessionBackend for SessionRegistry {
    fn create_session(&self, user_id: Option<&str>) -> Option<String> {
        let user_id = user_id?;
        let mut m = self.sessions.write();
        let mut sid = gen_id();
        // v4 collisions are not expected, but never hand out a live id twice
        while m.contains_key(&sid) { sid = gen_id(); }
        m.insert(sid.clone(), user_id.to_string());
        drop(m);
        tracing::debug!(target: "session.create", user_id, "session created");
        Some(sid)
    }

    fn user_id_for_session(&self, session_id: Option<&str>) -> Option<String> {
        self.sessions.read().get(session_id?).cloned()
    }

    fn destroy_session(&self, session_id: Option<&str>) -> bool {
        let Some(sid) = session_id else { return false; };
        let removed = self.sessions.write().remove(sid);
        match removed {
            Some(user_id) => {
                tracing::debug!(target: "session.destroy", user_id = %user_id, "session destroyed");
                true
            }
            None => false,
        }
    }
}

/// Embedded sessions: the id is stored on the user record itself.
///
/// A user has at most one embedded session, so a new login replaces the
/// previous one. Store failures are logged and treated as "no session".
pub struct EmbeddedSessions<S> {
    store: S,
}

impl<S: UserStore> EmbeddedSessions<S> {
    pub fn new(store: S) -> Self { Self { store } }
}

impl<S: UserStore> SessionBackend for EmbeddedSessions<S> {
    fn create_session(&self, user_id: Option<&str>) -> Option<String> {
        let user_id = user_id?;
        let sid = gen_id();
        match self.store.update(user_id, UserUpdate::session_id(Some(sid.clone()))) {
            Ok(()) => {
                tracing::debug!(target: "session.create", user_id, "embedded session created");
                Some(sid)
            }
            Err(e) => {
                tracing::debug!(target: "session.create", user_id, error = %e, "embedded session not created");
                None
            }
        }
    }

    fn user_id_for_session(&self, session_id: Option<&str>) -> Option<String> {
        let sid = session_id?;
        match self.store.find_by(&UserFilter::by_session(sid)) {
            Ok(found) => found.map(|u| u.id),
            Err(e) => {
                tracing::warn!(target: "session", error = %e, "session lookup failed");
                None
            }
        }
    }

    fn destroy_session(&self, session_id: Option<&str>) -> bool {
        let Some(sid) = session_id else { return false; };
        // cleared only while the user still holds this exact id
        match self.store.update_where(&UserFilter::by_session(sid), UserUpdate::session_id(None)) {
            Ok(Some(user_id)) => {
                tracing::debug!(target: "session.destroy", user_id = %user_id, "embedded session destroyed");
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(target: "session.destroy", error = %e, "failed to clear session");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryUserStore;

    fn round_trip<B: SessionBackend>(backend: &B, user_id: &str) {
        let sid = backend.create_session(Some(user_id)).unwrap();
        assert!(Uuid::parse_str(&sid).is_ok());
        assert_eq!(backend.user_id_for_session(Some(&sid)).as_deref(), Some(user_id));
        assert!(backend.destroy_session(Some(&sid)));
        assert_eq!(backend.user_id_for_session(Some(&sid)), None);
        assert!(!backend.destroy_session(Some(&sid)));
    }

    fn null_inputs<B: SessionBackend>(backend: &B) {
        assert_eq!(backend.create_session(None), None);
        assert_eq!(backend.user_id_for_session(None), None);
        assert_eq!(backend.user_id_for_session(Some("unknown")), None);
        assert!(!backend.destroy_session(None));
        assert!(!backend.destroy_session(Some("unknown")));
    }

    #[test]
    fn registry_round_trip() {
        let reg = SessionRegistry::new();
        round_trip(&reg, "42");
        null_inputs(&reg);
        assert!(reg.is_empty());
    }

    #[test]
    fn registry_allows_parallel_sessions_per_user() {
        let reg = SessionRegistry::new();
        let a = reg.create_session(Some("42")).unwrap();
        let b = reg.create_session(Some("42")).unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.user_id_for_session(Some(&a)).as_deref(), Some("42"));
        assert_eq!(reg.user_id_for_session(Some(&b)).as_deref(), Some("42"));

        assert!(reg.destroy_session(Some(&a)));
        assert_eq!(reg.user_id_for_session(Some(&b)).as_deref(), Some("42"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn registries_do_not_share_state() {
        let a = SessionRegistry::new();
        let b = SessionRegistry::new();
        let sid = a.create_session(Some("1")).unwrap();
        assert_eq!(b.user_id_for_session(Some(&sid)), None);
    }

    #[test]
    fn embedded_round_trip() {
        let store = MemoryUserStore::new();
        let user = store.create("e@mb.ed", "digest").unwrap();
        let sessions = EmbeddedSessions::new(store.clone());
        round_trip(&sessions, &user.id);
        null_inputs(&sessions);
        // unknown user id: nothing to attach the session to
        assert_eq!(sessions.create_session(Some("no-such-user")), None);
    }

    #[test]
    fn embedded_login_replaces_previous_session() {
        let store = MemoryUserStore::new();
        let user = store.create("e@mb.ed", "digest").unwrap();
        let sessions = EmbeddedSessions::new(store.clone());
        let first = sessions.create_session(Some(&user.id)).unwrap();
        let second = sessions.create_session(Some(&user.id)).unwrap();
        assert_ne!(first, second);
        assert_eq!(sessions.user_id_for_session(Some(&first)), None);
        assert_eq!(sessions.user_id_for_session(Some(&second)).as_deref(), Some(user.id.as_str()));
    }

    #[test]
    fn embedded_stale_destroy_keeps_newer_session() {
        let store = MemoryUserStore::new();
        let user = store.create("e@mb.ed", "digest").unwrap();
        let sessions = EmbeddedSessions::new(store.clone());
        let first = sessions.create_session(Some(&user.id)).unwrap();
        let second = sessions.create_session(Some(&user.id)).unwrap();
        assert!(!sessions.destroy_session(Some(&first)));
        assert_eq!(sessions.user_id_for_session(Some(&second)).as_deref(), Some(user.id.as_str()));
    }
}
