//! HTTP Basic authentication.
//!
//! Expected header: `Authorization: Basic <base64(email:password)>`. Every
//! stage yields `None` on bad input so the caller only ever sees "no user".

use base64::prelude::*;

use super::principal::{User, UserFilter};
use crate::security::PasswordHasher;
use crate::storage::UserStore;

pub const BASIC_PREFIX: &str = "Basic ";

/// The base64 payload of a Basic header, borrowed from the header.
pub fn extract_base64(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix(BASIC_PREFIX)
}

/// Standard padded base64 to UTF-8 text.
pub fn decode(b64: Option<&str>) -> Option<String> {
    let bytes = BASE64_STANDARD.decode(b64?.as_bytes()).ok()?;
    String::from_utf8(bytes).ok()
}

/// Split `email:password` on the first colon; the password may contain more.
pub fn split_credentials(decoded: Option<&str>) -> Option<(String, String)> {
    let (email, password) = decoded?.split_once(':')?;
    Some((email.to_string(), password.to_string()))
}

/// Look the user up by email and check the password against the stored digest.
pub fn resolve_user<S, H>(store: &S, hasher: &H, email: Option<&str>, password: Option<&str>) -> Option<User>
where
    S: UserStore + ?Sized,
    H: PasswordHasher + ?Sized,
{
    let (email, password) = (email?, password?);
    let user = match store.find_by(&UserFilter::by_email(email)) {
        Ok(found) => found?,
        Err(e) => {
            tracing::warn!(target: "auth.basic", error = %e, "credential store lookup failed");
            return None;
        }
    };
    if hasher.verify(password, &user.password_digest) {
        Some(user)
    } else {
        tracing::debug!(target: "auth.basic", user_id = %user.id, "password mismatch");
        None
    }
}

/// Full Basic pipeline from the raw `Authorization` header value.
pub fn user_from_basic_header<S, H>(store: &S, hasher: &H, header: Option<&str>) -> Option<User>
where
    S: UserStore + ?Sized,
    H: PasswordHasher + ?Sized,
{
    let decoded = decode(extract_base64(header));
    let (email, password) = split_credentials(decoded.as_deref())?;
    resolve_user(store, hasher, Some(&email), Some(&password))
}
