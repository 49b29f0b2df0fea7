use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AuthError, AuthResult};

/// A stored user record. Only the credential store creates these.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_digest: String,
    #[serde(skip_serializing)]
    pub session_id: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Public projection returned by the API; never carries secrets.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "email": self.email,
            "created_at": self.created_at.to_rfc3339(),
            "updated_at": self.updated_at.to_rfc3339(),
        })
    }
}

/// Lookup criteria for the credential store. Every field that is set must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub id: Option<String>,
    pub email: Option<String>,
    pub session_id: Option<String>,
    pub reset_token: Option<String>,
}

impl UserFilter {
    pub fn by_id(id: impl Into<String>) -> Self { Self { id: Some(id.into()), ..Default::default() } }
    pub fn by_email(email: impl Into<String>) -> Self { Self { email: Some(email.into()), ..Default::default() } }
    pub fn by_session(session_id: impl Into<String>) -> Self { Self { session_id: Some(session_id.into()), ..Default::default() } }
    pub fn by_reset_token(token: impl Into<String>) -> Self { Self { reset_token: Some(token.into()), ..Default::default() } }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.email.is_none() && self.session_id.is_none() && self.reset_token.is_none()
    }

    pub fn matches(&self, user: &User) -> bool {
        if self.is_empty() { return false; }
        self.id.as_ref().map_or(true, |v| *v == user.id)
            && self.email.as_ref().map_or(true, |v| *v == user.email)
            && self.session_id.as_ref().map_or(true, |v| user.session_id.as_ref() == Some(v))
            && self.reset_token.as_ref().map_or(true, |v| user.reset_token.as_ref() == Some(v))
    }
}

/// The closed set of fields the core may change on a user.
///
/// For the optional fields the outer `Option` says whether to touch the field,
/// the inner one is the new value (`Some(None)` clears it).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub password_digest: Option<String>,
    pub session_id: Option<Option<String>>,
    pub reset_token: Option<Option<String>>,
}

impl UserUpdate {
    pub fn password_digest(digest: impl Into<String>) -> Self {
        Self { password_digest: Some(digest.into()), ..Default::default() }
    }

    pub fn session_id(session_id: Option<String>) -> Self {
        Self { session_id: Some(session_id), ..Default::default() }
    }

    pub fn reset_token(token: Option<String>) -> Self {
        Self { reset_token: Some(token), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.password_digest.is_none() && self.session_id.is_none() && self.reset_token.is_none()
    }

    /// Build an update from loosely typed `(name, value)` pairs, e.g. a form body.
    /// A `None` value clears the field. Unknown names are rejected.
    pub fn from_fields<'a, I>(fields: I) -> AuthResult<Self>
    where
        I: IntoIterator<Item = (&'a str, Option<String>)>,
    {
        let mut upd = UserUpdate::default();
        for (name, value) in fields {
            match name {
                "password_digest" | "hashed_password" => {
                    let Some(v) = value else {
                        return Err(AuthError::InvalidInput("password_digest cannot be cleared".into()));
                    };
                    upd.password_digest = Some(v);
                }
                "session_id" => upd.session_id = Some(value),
                "reset_token" => upd.reset_token = Some(value),
                other => return Err(AuthError::InvalidInput(format!("{} is not an updatable user field", other))),
            }
        }
        Ok(upd)
    }

    pub(crate) fn apply(self, user: &mut User) {
        if let Some(d) = self.password_digest { user.password_digest = d; }
        if let Some(s) = self.session_id { user.session_id = s; }
        if let Some(t) = self.reset_token { user.reset_token = t; }
        user.updated_at = Utc::now();
    }
}
