//! HTTP endpoints for login, sessions, and password reset.
//!
//! Denials are deliberately uniform: wrong password, unknown email, and
//! passwordless accounts all return the same 401 body, and reset requests
//! return the same 200 body whether or not the account exists.

use axum::{
    Json,
    extract::{ConnectInfo, Extension, Path},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, InvalidHeaderValue, RETRY_AFTER, SET_COOKIE},
    },
    response::IntoResponse,
};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::orchestrator::{LoginDenied, LoginOutcome, RevokeOutcome};
use super::rate_limit::RateLimitClass;
use super::reset::ConfirmOutcome;
use super::state::{AuthConfig, AuthState};
use super::store::{Session, SessionMeta};
use super::types::{
    LoginRequest, LoginResponse, LogoutRequest, MessageResponse, PasswordResetConfirmRequest,
    PasswordResetRequest, SessionInfoResponse, SessionResponse, ValidationErrorResponse,
};
use super::utils::{client_key, normalize_email, valid_email};

const SESSION_COOKIE_NAME: &str = "gardi_session";

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const ACCOUNT_LOCKED: &str = "Account temporarily locked, try again later";
const RESET_REQUESTED: &str = "If an account exists for that email, a reset link has been sent";

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login success", body = LoginResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Unauthorized", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    if request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing password".to_string()).into_response();
    }

    let limiter_key = client_key(&headers, peer);
    let decision = auth_state
        .rate_limiter()
        .check(&limiter_key, RateLimitClass::Login);
    if !decision.allowed {
        return rate_limited_response(decision.retry_after);
    }

    let meta = SessionMeta {
        ip_address: Some(limiter_key.clone()),
        user_agent: extract_user_agent(&headers),
    };

    let password = SecretString::from(request.password);
    match auth_state.auth().login(&email, &password, meta).await {
        Ok(LoginOutcome::LoggedIn(issued)) => {
            // A successful login opens a fresh budget for this client.
            auth_state
                .rate_limiter()
                .reset(&limiter_key, RateLimitClass::Login);

            let mut response_headers = HeaderMap::new();
            match session_cookie(&auth_state, &issued.token) {
                Ok(cookie) => {
                    response_headers.insert(SET_COOKIE, cookie);
                }
                Err(err) => {
                    error!("Failed to build session cookie: {err}");
                }
            }
            let body = LoginResponse {
                user_id: issued.session.user_id.to_string(),
                token: issued.token,
                expires_at: issued.session.expires_at.to_rfc3339(),
            };
            (StatusCode::OK, response_headers, Json(body)).into_response()
        }
        Ok(LoginOutcome::Denied(LoginDenied::InvalidCredentials)) => {
            (StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS.to_string()).into_response()
        }
        Ok(LoginOutcome::Denied(LoginDenied::AccountLocked)) => {
            (StatusCode::UNAUTHORIZED, ACCOUNT_LOCKED.to_string()).into_response()
        }
        Err(err) => {
            error!("Login failed: {err:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string()).into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionInfoResponse),
        (status = 204, description = "No active session"),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let decision = auth_state
        .rate_limiter()
        .check(&client_key(&headers, peer), RateLimitClass::Default);
    if !decision.allowed {
        return rate_limited_response(decision.retry_after);
    }

    // Missing tokens are treated as "no session" to avoid leaking auth state.
    let Some(token) = extract_session_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    match auth_state.auth().session_info(&token).await {
        Ok(Some(session)) => {
            let response = SessionInfoResponse {
                session_id: session.id.to_string(),
                user_id: session.user_id.to_string(),
                expires_at: session.expires_at.to_rfc3339(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to lookup session: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Session cleared"),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    let decision = auth_state
        .rate_limiter()
        .check(&client_key(&headers, peer), RateLimitClass::Default);
    if !decision.allowed {
        return rate_limited_response(decision.retry_after);
    }

    let request = payload.map(|Json(p)| p).unwrap_or_default();

    if let Some(token) = extract_session_token(&headers) {
        if let Err(err) = auth_state.auth().logout(&token, request.revoke_all).await {
            error!("Failed to delete session: {err:#}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

#[utoipa::path(
    get,
    path = "/v1/auth/sessions",
    responses(
        (status = 200, description = "Active sessions for the caller", body = [SessionResponse]),
        (status = 401, description = "Unauthorized", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn list_sessions(
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let decision = auth_state
        .rate_limiter()
        .check(&client_key(&headers, peer), RateLimitClass::Default);
    if !decision.allowed {
        return rate_limited_response(decision.retry_after);
    }

    let session = match authenticate_session(&headers, &auth_state).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response();
        }
        Err(status) => return status.into_response(),
    };

    match auth_state.auth().list_sessions(session.user_id).await {
        Ok(sessions) => {
            let body: Vec<SessionResponse> = sessions.iter().map(SessionResponse::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => {
            error!("Failed to list sessions: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/auth/sessions/{session_id}",
    params(
        ("session_id" = String, Path, description = "Session to revoke")
    ),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Unauthorized", body = String),
        (status = 404, description = "Session not found", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn revoke_session(
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    auth_state: Extension<Arc<AuthState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let decision = auth_state
        .rate_limiter()
        .check(&client_key(&headers, peer), RateLimitClass::Default);
    if !decision.allowed {
        return rate_limited_response(decision.retry_after);
    }

    let session = match authenticate_session(&headers, &auth_state).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response();
        }
        Err(status) => return status.into_response(),
    };

    let Ok(session_id) = Uuid::parse_str(session_id.trim()) else {
        return (StatusCode::NOT_FOUND, "Not found".to_string()).into_response();
    };

    match auth_state
        .auth()
        .revoke_session(session.user_id, session_id)
        .await
    {
        Ok(RevokeOutcome::Revoked) => StatusCode::NO_CONTENT.into_response(),
        // Another user's session is reported as missing, not forbidden.
        Ok(RevokeOutcome::NotFound | RevokeOutcome::NotOwner) => {
            (StatusCode::NOT_FOUND, "Not found".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to revoke session: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset requested", body = MessageResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn request_reset(
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<PasswordResetRequest>>,
) -> impl IntoResponse {
    let request: PasswordResetRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    let limiter_key = client_key(&headers, peer);
    let decision = auth_state
        .rate_limiter()
        .check(&limiter_key, RateLimitClass::PasswordReset);
    if !decision.allowed {
        return rate_limited_response(decision.retry_after);
    }

    if let Err(err) = auth_state.auth().request_password_reset(&email).await {
        // Store failures still get the generic body; only the log differs.
        error!("Password reset request failed: {err:#}");
    }
    (
        StatusCode::OK,
        Json(MessageResponse {
            message: RESET_REQUESTED.to_string(),
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/password-reset/confirm",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = String),
        (status = 422, description = "Password policy violation", body = ValidationErrorResponse),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn confirm_reset(
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<PasswordResetConfirmRequest>>,
) -> impl IntoResponse {
    let request: PasswordResetConfirmRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    // Unauthenticated and a hash per attempt; without admission this is a
    // token brute-force surface.
    let decision = auth_state
        .rate_limiter()
        .check(&client_key(&headers, peer), RateLimitClass::Default);
    if !decision.allowed {
        return rate_limited_response(decision.retry_after);
    }

    let password = SecretString::from(request.password);
    match auth_state
        .auth()
        .confirm_password_reset(request.token.trim(), &password)
        .await
    {
        Ok(ConfirmOutcome::Success { .. }) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Password updated".to_string(),
            }),
        )
            .into_response(),
        Ok(ConfirmOutcome::TokenInvalid) => {
            (StatusCode::BAD_REQUEST, "Invalid token".to_string()).into_response()
        }
        Ok(ConfirmOutcome::TokenExpired) => {
            (StatusCode::BAD_REQUEST, "Token expired".to_string()).into_response()
        }
        Ok(ConfirmOutcome::InvalidPassword(errors)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ValidationErrorResponse { errors }),
        )
            .into_response(),
        Err(err) => {
            error!("Password reset confirm failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password reset failed".to_string(),
            )
                .into_response()
        }
    }
}

/// Resolve the caller's session from headers, if present.
///
/// Returns `Ok(None)` when no valid session token is attached.
pub(crate) async fn authenticate_session(
    headers: &HeaderMap,
    auth_state: &AuthState,
) -> Result<Option<Session>, StatusCode> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    match auth_state.auth().session_info(&token).await {
        Ok(session) => Ok(session),
        Err(err) => {
            error!("Failed to lookup session: {err:#}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn rate_limited_response(retry_after: Option<u64>) -> axum::response::Response {
    let mut response_headers = HeaderMap::new();
    if let Some(seconds) = retry_after {
        if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
            response_headers.insert(RETRY_AFTER, value);
        }
    }
    (
        StatusCode::TOO_MANY_REQUESTS,
        response_headers,
        "Rate limited".to_string(),
    )
        .into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
fn session_cookie(auth_state: &AuthState, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = auth_state.config().session_ttl_seconds();
    // Only mark cookies secure when the frontend is served over HTTPS.
    let secure = auth_state.config().session_cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(auth_config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = auth_config.session_cookie_secure();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            // Truncate oversized values; some clients send kilobytes here.
            let mut agent = v.to_string();
            agent.truncate(512);
            agent
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::memory::{InMemorySessionStore, InMemoryTokenStore, InMemoryUserStore};
    use super::super::notify::LogNotifier;
    use super::super::rate_limit::FixedWindowRateLimiter;
    use super::super::store::User;
    use axum::http::header::{COOKIE, USER_AGENT};

    fn test_state(users: Arc<InMemoryUserStore>) -> Arc<AuthState> {
        Arc::new(AuthState::new(
            AuthConfig::new("http://localhost:3000".to_string()),
            users,
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(LogNotifier),
            Arc::new(FixedWindowRateLimiter::new()),
        ))
    }

    fn peer(last_octet: u8) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, last_octet], 40000))
    }

    #[tokio::test]
    async fn repeated_confirm_attempts_are_rate_limited() {
        let auth_state = test_state(Arc::new(InMemoryUserStore::new()));

        let mut limited = false;
        for _ in 0..150 {
            let response = confirm_reset(
                HeaderMap::new(),
                ConnectInfo(peer(9)),
                Extension(auth_state.clone()),
                Some(Json(PasswordResetConfirmRequest {
                    token: "guess".to_string(),
                    password: "N3w!passw0rd".to_string(),
                })),
            )
            .await
            .into_response();
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                limited = true;
                break;
            }
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        assert!(limited, "confirm attempts from one client were never limited");
    }

    #[tokio::test]
    async fn login_buckets_direct_clients_by_peer_address() {
        let auth_state = test_state(Arc::new(InMemoryUserStore::new()));
        let attempt = |p: SocketAddr, state: Arc<AuthState>| async move {
            login(
                HeaderMap::new(),
                ConnectInfo(p),
                Extension(state),
                Some(Json(LoginRequest {
                    email: "alice@example.com".to_string(),
                    password: "wrong".to_string(),
                })),
            )
            .await
            .into_response()
            .status()
        };

        for _ in 0..5 {
            let status = attempt(peer(1), auth_state.clone()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let status = attempt(peer(1), auth_state.clone()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        // A different peer still has a full budget.
        let status = attempt(peer(2), auth_state).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn reset_request_bodies_match_byte_for_byte() {
        let users = Arc::new(InMemoryUserStore::new());
        users
            .seed(User {
                id: Uuid::new_v4(),
                email: "alice@example.com".to_string(),
                password_hash: Some("$argon2id$old".to_string()),
                failed_login_attempts: 0,
                locked_until: None,
                last_login_at: None,
            })
            .await;
        let auth_state = test_state(users);

        let request = |email: &str, state: Arc<AuthState>| {
            let email = email.to_string();
            async move {
                request_reset(
                    HeaderMap::new(),
                    ConnectInfo(peer(3)),
                    Extension(state),
                    Some(Json(PasswordResetRequest { email })),
                )
                .await
                .into_response()
            }
        };

        let known = request("alice@example.com", auth_state.clone()).await;
        let unknown = request("ghost@example.com", auth_state).await;
        assert_eq!(known.status(), StatusCode::OK);
        assert_eq!(unknown.status(), StatusCode::OK);

        let known = axum::body::to_bytes(known.into_body(), usize::MAX)
            .await
            .unwrap();
        let unknown = axum::body::to_bytes(unknown.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(known, unknown);
    }

    #[test]
    fn bearer_token_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        headers.insert(
            COOKIE,
            HeaderValue::from_static("gardi_session=cookie-token"),
        );
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn cookie_token_is_parsed_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; gardi_session=tok-1; lang=en"),
        );
        assert_eq!(extract_session_token(&headers).as_deref(), Some("tok-1"));
    }

    #[test]
    fn empty_bearer_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(extract_session_token(&headers).is_none());
    }

    #[test]
    fn user_agent_is_truncated() {
        let mut headers = HeaderMap::new();
        let long = "x".repeat(2048);
        headers.insert(USER_AGENT, HeaderValue::from_str(&long).unwrap());
        let agent = extract_user_agent(&headers).unwrap();
        assert_eq!(agent.len(), 512);
    }

    #[test]
    fn rate_limited_response_sets_retry_after() {
        let response = rate_limited_response(Some(42));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RETRY_AFTER),
            Some(&HeaderValue::from_static("42"))
        );
    }
}
