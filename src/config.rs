//! Process configuration read from environment variables.
//!
//! | variable               | default                                  |
//! |------------------------|------------------------------------------|
//! | `AUTHGATE_HTTP_PORT`   | `5000`                                   |
//! | `SESSION_NAME`         | `_my_session_id`                         |
//! | `AUTH_TYPE`            | `session_auth` (or `basic_auth`)         |
//! | `AUTH_SESSION_BACKEND` | `registry` (or `embedded`)               |
//! | `AUTH_EXCLUDED_PATHS`  | status, unauthorized, forbidden, login   |
//! | `AUTH_PII_FIELDS`      | `email,password,ssn,phone,name`          |

use std::env;
use std::str::FromStr;

use anyhow::anyhow;

pub const DEFAULT_HTTP_PORT: u16 = 5000;
pub const DEFAULT_SESSION_NAME: &str = "_my_session_id";
pub const DEFAULT_EXCLUDED_PATHS: &str = "/api/v1/status/,/api/v1/unauthorized/,/api/v1/forbidden/,/api/v1/auth_session/login/";
pub const DEFAULT_PII_FIELDS: &str = "email,password,ssn,phone,name";

/// Which proof the API middleware accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthType {
    Basic,
    #[default]
    Session,
}

impl FromStr for AuthType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic_auth" | "basic" => Ok(AuthType::Basic),
            "session_auth" | "session" => Ok(AuthType::Session),
            other => Err(anyhow!("unknown AUTH_TYPE '{}'", other)),
        }
    }
}

/// Where session ids are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// Separate in-memory registry, several sessions per user.
    #[default]
    Registry,
    /// On the user record, one session per user.
    Embedded,
}

impl FromStr for SessionMode {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "registry" | "detached" => Ok(SessionMode::Registry),
            "embedded" | "user" => Ok(SessionMode::Embedded),
            other => Err(anyhow!("unknown AUTH_SESSION_BACKEND '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub http_port: u16,
    pub session_name: Option<String>,
    pub auth_type: AuthType,
    pub session_mode: SessionMode,
    pub excluded_paths: Vec<String>,
    pub pii_fields: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            session_name: Some(DEFAULT_SESSION_NAME.to_string()),
            auth_type: AuthType::default(),
            session_mode: SessionMode::default(),
            excluded_paths: split_list(DEFAULT_EXCLUDED_PATHS),
            pii_fields: split_list(DEFAULT_PII_FIELDS),
        }
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',').map(str::trim).filter(|p| !p.is_empty()).map(String::from).collect()
}

impl AuthConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = AuthConfig::default();
        if let Some(p) = get("AUTHGATE_HTTP_PORT") {
            cfg.http_port = p.trim().parse::<u16>().map_err(|e| anyhow!("AUTHGATE_HTTP_PORT '{}': {}", p, e))?;
        }
        if let Some(n) = get("SESSION_NAME") {
            let n = n.trim().to_string();
            cfg.session_name = if n.is_empty() { None } else { Some(n) };
        }
        if let Some(t) = get("AUTH_TYPE") { cfg.auth_type = t.parse()?; }
        if let Some(m) = get("AUTH_SESSION_BACKEND") { cfg.session_mode = m.parse()?; }
        if let Some(p) = get("AUTH_EXCLUDED_PATHS") { cfg.excluded_paths = split_list(&p); }
        if let Some(f) = get("AUTH_PII_FIELDS") { cfg.pii_fields = split_list(&f); }
        Ok(cfg)
    }
}
