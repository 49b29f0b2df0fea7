//!
//! authgate HTTP server
//! --------------------
//! Axum routes for the user authentication service and the guarded `/api/v1`
//! surface.
//!
//! Responsibilities:
//! - Registration, login/logout with a session cookie, profile lookup.
//! - Password reset: token request and token-checked password update.
//! - `/api/v1` guard middleware: path exclusions, then Basic or session proof.
//!
//! Password hashing is CPU bound, so every handler that hashes or verifies runs
//! the work on the blocking pool.

use std::net::SocketAddr;

use axum::extract::{Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Form, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::error::{AppError, AppResult, AuthError};
use crate::identity::{cookie, AuthService, User, UserFilter};
use crate::storage::MemoryUserStore;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
}

/// The user resolved by the API guard, attached as a request extension.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CredentialsForm {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResetRequestForm {
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResetForm {
    email: Option<String>,
    reset_token: Option<String>,
    new_password: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal("join_error".to_string(), e.to_string()))
}

fn cookie_name(auth: &AuthService) -> AppResult<&str> {
    auth.session_name().ok_or_else(|| AppError::internal("config", "session cookie name not configured"))
}

fn with_cookie(mut headers: HeaderMap, value: Option<axum::http::HeaderValue>) -> AppResult<HeaderMap> {
    let v = value.ok_or_else(|| AppError::internal("cookie", "session cookie could not be encoded"))?;
    headers.insert(SET_COOKIE, v);
    Ok(headers)
}

/// Build the full router. Exposed so tests can drive it without a socket.
pub fn build_router(auth: AuthService) -> Router {
    let state = AppState { auth };

    let api = Router::new()
        .route("/api/v1/status", get(api_status))
        .route("/api/v1/unauthorized", get(api_unauthorized))
        .route("/api/v1/forbidden", get(api_forbidden))
        .route("/api/v1/users/me", get(api_me))
        .route("/api/v1/auth_session/login", post(api_session_login))
        .route("/api/v1/auth_session/logout", delete(api_session_logout))
        .route_layer(middleware::from_fn_with_state(state.clone(), api_guard));

    Router::new()
        .route("/", get(welcome))
        .route("/users", post(register))
        .route("/sessions", post(login).delete(logout))
        .route("/profile", get(profile))
        .route("/reset_password", post(reset_token).put(update_password))
        .merge(api)
        .with_state(state)
}

/// Start the server on the configured port with an in-memory credential store.
pub async fn run(cfg: AuthConfig) -> anyhow::Result<()> {
    let auth = AuthService::from_config(&cfg, std::sync::Arc::new(MemoryUserStore::new()));
    info!(
        target: "startup",
        auth_type = ?cfg.auth_type,
        session_backend = ?cfg.session_mode,
        excluded = ?cfg.excluded_paths,
        "authgate configured"
    );
    let app = build_router(auth);

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// --- guard ---

async fn api_guard(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let auth = &state.auth;
    if !auth.requires_auth(Some(req.uri().path())) {
        return next.run(req).await;
    }
    let headers = req.headers().clone();
    if cookie::authorization_header(&headers).is_none() && auth.session_cookie(&headers).is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"}))).into_response();
    }
    let svc = auth.clone();
    let user = match blocking(move || svc.current_user(&headers)).await {
        Ok(u) => u,
        Err(e) => return e.into_response(),
    };
    let Some(user) = user else {
        return (StatusCode::FORBIDDEN, Json(json!({"error": "Forbidden"}))).into_response();
    };
    req.extensions_mut().insert(CurrentUser(user));
    next.run(req).await
}

// --- user authentication service ---

async fn welcome() -> Json<serde_json::Value> {
    Json(json!({"message": "Bienvenue"}))
}

async fn register(State(state): State<AppState>, Form(form): Form<CredentialsForm>) -> AppResult<Response> {
    let (Some(email), Some(password)) = (non_empty(form.email), non_empty(form.password)) else {
        return Err(AppError::user("missing_field", "email and password are required"));
    };
    let auth = state.auth.clone();
    let e = email.clone();
    match blocking(move || auth.register_user(&e, &password)).await? {
        Ok(_) => Ok((StatusCode::CREATED, Json(json!({"email": email, "message": "user created"}))).into_response()),
        Err(AuthError::AlreadyExists(_)) => {
            Ok((StatusCode::BAD_REQUEST, Json(json!({"message": "email already registered"}))).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

async fn login(State(state): State<AppState>, Form(form): Form<CredentialsForm>) -> AppResult<Response> {
    let (Some(email), Some(password)) = (non_empty(form.email), non_empty(form.password)) else {
        return Err(AppError::auth("unauthorized", "missing credentials"));
    };
    let name = cookie_name(&state.auth)?.to_string();
    let auth = state.auth.clone();
    let e = email.clone();
    let Some((_, sid)) = blocking(move || auth.login(&e, &password)).await? else {
        return Err(AppError::auth("unauthorized", "invalid credentials"));
    };
    let headers = with_cookie(HeaderMap::new(), cookie::set_session_cookie(&name, &sid))?;
    Ok((StatusCode::OK, headers, Json(json!({"email": email, "message": "logged in"}))).into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let auth = &state.auth;
    let sid = auth.session_cookie(&headers);
    if !auth.logout(sid.as_deref()) {
        return Err(AppError::forbidden("forbidden", "no active session"));
    }
    let out = with_cookie(HeaderMap::new(), cookie::clear_session_cookie(cookie_name(auth)?))?;
    Ok((out, Redirect::to("/")).into_response())
}

async fn profile(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<serde_json::Value>> {
    match state.auth.user_from_session_cookie(&headers) {
        Some(user) => Ok(Json(json!({"email": user.email}))),
        None => Err(AppError::forbidden("forbidden", "no active session")),
    }
}

async fn reset_token(State(state): State<AppState>, Form(form): Form<ResetRequestForm>) -> AppResult<Json<serde_json::Value>> {
    let Some(email) = non_empty(form.email) else {
        return Err(AppError::forbidden("forbidden", "email required"));
    };
    let token = state.auth.request_reset_token(&email)?;
    Ok(Json(json!({"email": email, "reset_token": token})))
}

async fn update_password(State(state): State<AppState>, Form(form): Form<ResetForm>) -> AppResult<Response> {
    let (Some(email), Some(token), Some(new_password)) =
        (non_empty(form.email), non_empty(form.reset_token), non_empty(form.new_password))
    else {
        return Err(AppError::user("missing_field", "Missing email, reset token, or new password"));
    };
    let auth = state.auth.clone();
    let e = email.clone();
    match blocking(move || auth.update_password(&e, &token, &new_password)).await? {
        Ok(()) => Ok(Json(json!({"email": email, "message": "Password updated"})).into_response()),
        Err(AuthError::InvalidToken) => {
            Ok((StatusCode::FORBIDDEN, Json(json!({"message": "Invalid reset token"}))).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

// --- /api/v1 ---

async fn api_status() -> Json<serde_json::Value> {
    Json(json!({"status": "OK"}))
}

async fn api_unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"}))).into_response()
}

async fn api_forbidden() -> Response {
    (StatusCode::FORBIDDEN, Json(json!({"error": "Forbidden"}))).into_response()
}

async fn api_me(user: Option<Extension<CurrentUser>>) -> Response {
    match user {
        Some(Extension(CurrentUser(u))) => Json(u.to_json()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"}))).into_response(),
    }
}

async fn api_session_login(State(state): State<AppState>, Form(form): Form<CredentialsForm>) -> AppResult<Response> {
    let Some(email) = non_empty(form.email) else {
        return Ok((StatusCode::BAD_REQUEST, Json(json!({"error": "email missing"}))).into_response());
    };
    let Some(password) = non_empty(form.password) else {
        return Ok((StatusCode::BAD_REQUEST, Json(json!({"error": "password missing"}))).into_response());
    };
    let name = cookie_name(&state.auth)?.to_string();

    let auth = state.auth.clone();
    let lookup_email = email.clone();
    let Some(user) = blocking(move || auth.store().find_by(&UserFilter::by_email(lookup_email))).await?? else {
        return Ok((StatusCode::NOT_FOUND, Json(json!({"error": "no user found for this email"}))).into_response());
    };

    let auth = state.auth.clone();
    let Some((user, sid)) = blocking(move || auth.login(&email, &password)).await? else {
        warn!(target: "auth.login", user_id = %user.id, "wrong password");
        return Ok((StatusCode::UNAUTHORIZED, Json(json!({"error": "wrong password"}))).into_response());
    };
    let headers = with_cookie(HeaderMap::new(), cookie::set_session_cookie(&name, &sid))?;
    Ok((StatusCode::OK, headers, Json(user.to_json())).into_response())
}

async fn api_session_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let sid = state.auth.session_cookie(&headers);
    if state.auth.logout(sid.as_deref()) {
        (StatusCode::OK, Json(json!({}))).into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"}))).into_response()
    }
}
