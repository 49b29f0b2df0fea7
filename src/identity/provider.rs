use std::sync::Arc;

use axum::http::HeaderMap;
use uuid::Uuid;

use super::basic;
use super::cookie;
use super::guard::PathGuard;
use super::principal::{User, UserFilter, UserUpdate};
use super::session::{EmbeddedSessions, SessionBackend, SessionRegistry};
use crate::config::{AuthConfig, AuthType, SessionMode};
use crate::error::{AuthError, AuthResult};
use crate::security::{Argon2Hasher, PasswordHasher};
use crate::storage::UserStore;

/// The authentication service: one long-lived instance per process, shared by
/// reference with every request handler.
///
/// Owns the credential store, the password hasher, the session backend and
/// the path guard. Lookups that fail for ordinary reasons (unknown user,
/// wrong password, unknown session) come back as `None`/`false`; only
/// registration and the reset flow return errors.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
    sessions: Arc<dyn SessionBackend>,
    guard: PathGuard,
    session_name: Option<String>,
    auth_type: AuthType,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, hasher: Arc<dyn PasswordHasher>, sessions: Arc<dyn SessionBackend>) -> Self {
        Self {
            store,
            hasher,
            sessions,
            guard: PathGuard::default(),
            session_name: None,
            auth_type: AuthType::default(),
        }
    }

    /// Wire a service from configuration, choosing the session backend.
    pub fn from_config(cfg: &AuthConfig, store: Arc<dyn UserStore>) -> Self {
        let sessions: Arc<dyn SessionBackend> = match cfg.session_mode {
            SessionMode::Registry => Arc::new(SessionRegistry::new()),
            SessionMode::Embedded => Arc::new(EmbeddedSessions::new(store.clone())),
        };
        Self::new(store, Arc::new(Argon2Hasher), sessions)
            .with_guard(PathGuard::new(cfg.excluded_paths.iter().cloned()))
            .with_session_name(cfg.session_name.clone())
            .with_auth_type(cfg.auth_type)
    }

    pub fn with_guard(mut self, guard: PathGuard) -> Self { self.guard = guard; self }
    pub fn with_session_name(mut self, name: Option<String>) -> Self { self.session_name = name; self }
    pub fn with_auth_type(mut self, auth_type: AuthType) -> Self { self.auth_type = auth_type; self }

    pub fn store(&self) -> &dyn UserStore { self.store.as_ref() }
    pub fn sessions(&self) -> &dyn SessionBackend { self.sessions.as_ref() }
    pub fn guard(&self) -> &PathGuard { &self.guard }
    pub fn session_name(&self) -> Option<&str> { self.session_name.as_deref() }
    pub fn auth_type(&self) -> AuthType { self.auth_type }

    pub fn requires_auth(&self, path: Option<&str>) -> bool { self.guard.requires_auth(path) }

    fn find(&self, filter: &UserFilter) -> Option<User> {
        match self.store.find_by(filter) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(target: "auth", error = %e, "credential store lookup failed");
                None
            }
        }
    }

    pub fn register_user(&self, email: &str, password: &str) -> AuthResult<User> {
        if self.find(&UserFilter::by_email(email)).is_some() {
            return Err(AuthError::AlreadyExists(email.to_string()));
        }
        let digest = self.hasher.hash(password)?;
        let user = self.store.create(email, &digest)?;
        tracing::info!(target: "auth.register", user_id = %user.id, "user registered");
        Ok(user)
    }

    pub fn valid_login(&self, email: &str, password: &str) -> bool {
        basic::resolve_user(self.store.as_ref(), self.hasher.as_ref(), Some(email), Some(password)).is_some()
    }

    /// Check credentials and open a session. `None` on any failure.
    pub fn login(&self, email: &str, password: &str) -> Option<(User, String)> {
        let user = basic::resolve_user(self.store.as_ref(), self.hasher.as_ref(), Some(email), Some(password))?;
        let sid = self.sessions.create_session(Some(&user.id))?;
        tracing::info!(target: "auth.login", user_id = %user.id, "login");
        Some((user, sid))
    }

    /// Open a session for an already-authenticated user id.
    pub fn create_session(&self, user_id: Option<&str>) -> Option<String> {
        self.sessions.create_session(user_id)
    }

    pub fn user_for_session(&self, session_id: Option<&str>) -> Option<User> {
        let user_id = self.sessions.user_id_for_session(session_id)?;
        self.find(&UserFilter::by_id(user_id))
    }

    pub fn logout(&self, session_id: Option<&str>) -> bool {
        let ok = self.sessions.destroy_session(session_id);
        if ok { tracing::info!(target: "auth.logout", "session closed"); }
        ok
    }

    /// Session id from the configured cookie.
    pub fn session_cookie(&self, headers: &HeaderMap) -> Option<String> {
        cookie::session_cookie(headers, self.session_name.as_deref())
    }

    pub fn user_from_basic(&self, headers: &HeaderMap) -> Option<User> {
        basic::user_from_basic_header(self.store.as_ref(), self.hasher.as_ref(), cookie::authorization_header(headers))
    }

    pub fn user_from_session_cookie(&self, headers: &HeaderMap) -> Option<User> {
        let sid = self.session_cookie(headers)?;
        self.user_for_session(Some(&sid))
    }

    /// Resolve the caller using the configured proof mechanism.
    pub fn current_user(&self, headers: &HeaderMap) -> Option<User> {
        match self.auth_type {
            AuthType::Basic => self.user_from_basic(headers),
            AuthType::Session => self.user_from_session_cookie(headers),
        }
    }

    /// Issue a fresh reset token for `email`, replacing any earlier one.
    pub fn request_reset_token(&self, email: &str) -> AuthResult<String> {
        let Some(user) = self.find(&UserFilter::by_email(email)) else {
            return Err(AuthError::UnknownUser(email.to_string()));
        };
        let token = Uuid::new_v4().to_string();
        self.store.update(&user.id, UserUpdate::reset_token(Some(token.clone())))?;
        tracing::info!(target: "auth.reset", user_id = %user.id, "reset token issued");
        Ok(token)
    }

    /// Consume `token` and set a new password. The token is single use.
    pub fn apply_reset(&self, token: &str, new_password: &str) -> AuthResult<()> {
        self.set_password(UserFilter::by_reset_token(token), new_password)
    }

    /// Reset variant used by the HTTP form: the token must belong to `email`.
    pub fn update_password(&self, email: &str, token: &str, new_password: &str) -> AuthResult<()> {
        let filter = UserFilter { email: Some(email.to_string()), reset_token: Some(token.to_string()), ..Default::default() };
        self.set_password(filter, new_password)
    }

    // Hash outside the store lock; the token check and its removal happen in one store write.
    fn set_password(&self, filter: UserFilter, new_password: &str) -> AuthResult<()> {
        let digest = self.hasher.hash(new_password)?;
        let upd = UserUpdate {
            password_digest: Some(digest),
            reset_token: Some(None),
            ..Default::default()
        };
        let Some(user_id) = self.store.update_where(&filter, upd)? else {
            return Err(AuthError::InvalidToken);
        };
        tracing::info!(target: "auth.reset", user_id = %user_id, "password updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryUserStore;
    use axum::http::header::{AUTHORIZATION, COOKIE};
    use axum::http::HeaderValue;
    use base64::prelude::*;

    fn service(mode: SessionMode) -> AuthService {
        let cfg = AuthConfig { session_mode: mode, ..AuthConfig::default() };
        AuthService::from_config(&cfg, Arc::new(MemoryUserStore::new()))
    }

    #[test]
    fn register_rejects_duplicates() {
        let svc = service(SessionMode::Registry);
        let u = svc.register_user("me@me.com", "mySecuredPwd").unwrap();
        assert_ne!(u.password_digest, "mySecuredPwd");
        let err = svc.register_user("me@me.com", "other").unwrap_err();
        assert_eq!(err, AuthError::AlreadyExists("me@me.com".into()));
    }

    #[test]
    fn login_and_logout_both_backends() {
        for mode in [SessionMode::Registry, SessionMode::Embedded] {
            let svc = service(mode);
            let u = svc.register_user("bob@bob.com", "pwd").unwrap();
            assert!(svc.valid_login("bob@bob.com", "pwd"));
            assert!(!svc.valid_login("bob@bob.com", "nope"));
            assert!(svc.login("bob@bob.com", "nope").is_none());

            let (logged, sid) = svc.login("bob@bob.com", "pwd").unwrap();
            assert_eq!(logged.id, u.id);
            assert_eq!(svc.user_for_session(Some(&sid)).map(|x| x.id), Some(u.id.clone()));
            assert!(svc.logout(Some(&sid)));
            assert!(svc.user_for_session(Some(&sid)).is_none());
            assert!(!svc.logout(Some(&sid)));
        }
    }

    #[test]
    fn reset_token_is_single_use() {
        let svc = service(SessionMode::Registry);
        svc.register_user("g@hbtn.io", "b4l0u").unwrap();

        let first = svc.request_reset_token("g@hbtn.io").unwrap();
        let token = svc.request_reset_token("g@hbtn.io").unwrap();
        assert_ne!(first, token);
        // only the latest token is live
        assert_eq!(svc.apply_reset(&first, "x"), Err(AuthError::InvalidToken));

        svc.apply_reset(&token, "t4rt1fl3tt3").unwrap();
        assert_eq!(svc.apply_reset(&token, "again"), Err(AuthError::InvalidToken));
        assert!(svc.valid_login("g@hbtn.io", "t4rt1fl3tt3"));
        assert!(!svc.valid_login("g@hbtn.io", "b4l0u"));

        assert_eq!(svc.request_reset_token("ghost@hbtn.io"), Err(AuthError::UnknownUser("ghost@hbtn.io".into())));
    }

    #[test]
    fn update_password_checks_email() {
        let svc = service(SessionMode::Registry);
        svc.register_user("a@a.a", "one").unwrap();
        svc.register_user("b@b.b", "two").unwrap();
        let token = svc.request_reset_token("a@a.a").unwrap();
        assert_eq!(svc.update_password("b@b.b", &token, "x"), Err(AuthError::InvalidToken));
        svc.update_password("a@a.a", &token, "three").unwrap();
        assert!(svc.valid_login("a@a.a", "three"));
    }

    #[test]
    fn racing_resets_consume_token_once() {
        use std::sync::Barrier;

        let svc = service(SessionMode::Registry);
        svc.register_user("race@hbtn.io", "start").unwrap();
        for round in 0..5 {
            let token = svc.request_reset_token("race@hbtn.io").unwrap();
            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = ["left", "right"]
                .into_iter()
                .map(|pw| {
                    let (svc, token, barrier) = (svc.clone(), token.clone(), barrier.clone());
                    std::thread::spawn(move || {
                        barrier.wait();
                        svc.apply_reset(&token, pw)
                    })
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            let ok = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(ok, 1, "round {}: {:?}", round, results);
            assert!(results.contains(&Err(AuthError::InvalidToken)));
        }
    }

    #[test]
    fn current_user_follows_auth_type() {
        let svc = service(SessionMode::Registry);
        let u = svc.register_user("c@c.c", "pw").unwrap();
        let (_, sid) = svc.login("c@c.c", "pw").unwrap();

        let mut h = HeaderMap::new();
        h.insert(COOKIE, HeaderValue::from_str(&format!("_my_session_id={}", sid)).unwrap());
        h.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Basic {}", BASE64_STANDARD.encode("c@c.c:pw"))).unwrap());

        assert_eq!(svc.current_user(&h).map(|x| x.id), Some(u.id.clone()));
        let basic = svc.clone().with_auth_type(AuthType::Basic);
        assert_eq!(basic.current_user(&h).map(|x| x.id), Some(u.id.clone()));

        // no cookie name configured: session proof cannot be read
        let nameless = svc.clone().with_session_name(None);
        assert!(nameless.current_user(&h).is_none());
    }
}
