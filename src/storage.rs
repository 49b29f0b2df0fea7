//! Credential store: the collaborator that owns persistent user records.
//!
//! The core talks to it through [`UserStore`] only. [`MemoryUserStore`] is the
//! process-local implementation the server runs with; a SQL-backed store would
//! implement the same trait.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::identity::{User, UserFilter, UserUpdate};

pub trait UserStore: Send + Sync {
    /// First user matching every set field of `filter`. An empty filter is invalid input.
    fn find_by(&self, filter: &UserFilter) -> AuthResult<Option<User>>;
    /// Fails with `AlreadyExists` when the email is taken.
    fn create(&self, email: &str, password_digest: &str) -> AuthResult<User>;
    /// Fails with `NotFound` for an unknown id.
    fn update(&self, user_id: &str, update: UserUpdate) -> AuthResult<()>;
    /// Apply `update` to the user matching `filter`, checked and written as one
    /// step. Returns the id of the updated user, `None` when nothing matched.
    fn update_where(&self, filter: &UserFilter, update: UserUpdate) -> AuthResult<Option<String>>;
}

impl<T: UserStore + ?Sized> UserStore for Arc<T> {
    fn find_by(&self, filter: &UserFilter) -> AuthResult<Option<User>> { (**self).find_by(filter) }
    fn create(&self, email: &str, password_digest: &str) -> AuthResult<User> { (**self).create(email, password_digest) }
    fn update(&self, user_id: &str, update: UserUpdate) -> AuthResult<()> { (**self).update(user_id, update) }
    fn update_where(&self, filter: &UserFilter, update: UserUpdate) -> AuthResult<Option<String>> {
        (**self).update_where(filter, update)
    }
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    // email -> id, enforces uniqueness
    by_email: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct MemoryUserStore(Arc<RwLock<Tables>>);

impl MemoryUserStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.0.read().users.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl UserStore for MemoryUserStore {
    fn find_by(&self, filter: &UserFilter) -> AuthResult<Option<User>> {
        if filter.is_empty() {
            return Err(AuthError::InvalidInput("empty user filter".into()));
        }
        let t = self.0.read();
        // Fast paths for the unique keys
        if let Some(id) = &filter.id {
            return Ok(t.users.get(id).filter(|u| filter.matches(u)).cloned());
        }
        if let Some(email) = &filter.email {
            return Ok(t.by_email.get(email).and_then(|id| t.users.get(id)).filter(|u| filter.matches(u)).cloned());
        }
        Ok(t.users.values().find(|u| filter.matches(u)).cloned())
    }

    fn create(&self, email: &str, password_digest: &str) -> AuthResult<User> {
        let mut t = self.0.write();
        if t.by_email.contains_key(email) {
            return Err(AuthError::AlreadyExists(email.to_string()));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            password_digest: password_digest.to_string(),
            session_id: None,
            reset_token: None,
            created_at: now,
            updated_at: now,
        };
        t.by_email.insert(user.email.clone(), user.id.clone());
        t.users.insert(user.id.clone(), user.clone());
        tracing::debug!(target: "store", user_id = %user.id, "user created");
        Ok(user)
    }

    fn update(&self, user_id: &str, update: UserUpdate) -> AuthResult<()> {
        if update.is_empty() {
            return Err(AuthError::InvalidInput("empty user update".into()));
        }
        let mut t = self.0.write();
        let Some(user) = t.users.get_mut(user_id) else {
            return Err(AuthError::NotFound(format!("user {}", user_id)));
        };
        update.apply(user);
        Ok(())
    }

    fn update_where(&self, filter: &UserFilter, update: UserUpdate) -> AuthResult<Option<String>> {
        if filter.is_empty() {
            return Err(AuthError::InvalidInput("empty user filter".into()));
        }
        if update.is_empty() {
            return Err(AuthError::InvalidInput("empty user update".into()));
        }
        let mut t = self.0.write();
        let Tables { users, by_email } = &mut *t;
        let target = match (&filter.id, &filter.email) {
            (Some(id), _) => users.get_mut(id),
            (None, Some(email)) => match by_email.get(email) {
                Some(id) => users.get_mut(id),
                None => None,
            },
            (None, None) => users.values_mut().find(|u| filter.matches(u)),
        };
        match target.filter(|u| filter.matches(u)) {
            Some(user) => {
                update.apply(user);
                Ok(Some(user.id.clone()))
            }
            None => Ok(None),
        }
    }
}
