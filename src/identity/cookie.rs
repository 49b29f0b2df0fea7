//! Session cookie plumbing: read the configured cookie, build Set-Cookie values.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, HeaderValue};

/// Value of the cookie called `name`, if both the name and the cookie exist.
pub fn session_cookie(headers: &HeaderMap, name: Option<&str>) -> Option<String> {
    let name = name.filter(|n| !n.is_empty())?;
    for cookie in headers.get_all(COOKIE) {
        let Ok(s) = cookie.to_str() else { continue; };
        for part in s.split(';') {
            if let Some((k, v)) = part.trim().split_once('=') {
                if k == name { return Some(v.to_string()); }
            }
        }
    }
    None
}

/// Raw `Authorization` header, if present and printable.
pub fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

pub fn set_session_cookie(name: &str, sid: &str) -> Option<HeaderValue> {
    // HttpOnly cookie scoped to path / with SameSite=Lax
    HeaderValue::from_str(&format!("{}={}; HttpOnly; SameSite=Lax; Path=/", name, sid)).ok()
}

pub fn clear_session_cookie(name: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Lax; Path=/", name)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cookie: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        h
    }

    #[test]
    fn reads_named_cookie() {
        let h = headers("theme=dark; _my_session_id=abc-123; other=1");
        assert_eq!(session_cookie(&h, Some("_my_session_id")).as_deref(), Some("abc-123"));
        assert_eq!(session_cookie(&h, Some("theme")).as_deref(), Some("dark"));
        assert_eq!(session_cookie(&h, Some("missing")), None);
    }

    #[test]
    fn missing_name_or_header() {
        let h = headers("_my_session_id=abc");
        assert_eq!(session_cookie(&h, None), None);
        assert_eq!(session_cookie(&h, Some("")), None);
        assert_eq!(session_cookie(&HeaderMap::new(), Some("_my_session_id")), None);
    }

    #[test]
    fn multiple_cookie_headers() {
        let mut h = HeaderMap::new();
        h.append(COOKIE, HeaderValue::from_static("a=1"));
        h.append(COOKIE, HeaderValue::from_static("session_id=xyz"));
        assert_eq!(session_cookie(&h, Some("session_id")).as_deref(), Some("xyz"));
    }

    #[test]
    fn set_and_clear_values() {
        let v = set_session_cookie("session_id", "abc").unwrap();
        assert!(v.to_str().unwrap().starts_with("session_id=abc;"));
        let c = clear_session_cookie("session_id").unwrap();
        assert!(c.to_str().unwrap().contains("Expires=Thu, 01 Jan 1970"));
        assert!(set_session_cookie("bad\nname", "x").is_none());
    }

    #[test]
    fn authorization_passthrough() {
        let mut h = HeaderMap::new();
        assert_eq!(authorization_header(&h), None);
        h.insert(AUTHORIZATION, HeaderValue::from_static("Basic Ym9i"));
        assert_eq!(authorization_header(&h), Some("Basic Ym9i"));
    }
}
