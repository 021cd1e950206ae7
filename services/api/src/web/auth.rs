//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: the OAuth callback that opens a portal session,
//! logout, and the current-session lookup.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use tutoring_portal_core::domain::StudentIdentity;
use tutoring_portal_core::validation::email_in_domain;
use tutoring_portal_core::wizard::STUDENT_LOGIN_PATH;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ErrorBody, ErrorResponse};
use crate::web::middleware::{cookie_value, SESSION_COOKIE};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    /// Authorization code issued by the identity service.
    pub code: Option<String>,
    /// Same-site path to continue to after sign-in.
    pub next: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Accepts only same-site relative paths; anything else falls back to `/`.
pub fn sanitize_next(next: Option<&str>) -> String {
    match next {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

/// The origin the browser should land on. Behind a proxy the forwarded host
/// wins, except in development where the configured origin is always used.
pub fn redirect_base(config: &Config, headers: &HeaderMap) -> String {
    if config.development {
        return config.public_origin.clone();
    }
    headers
        .get("x-forwarded-host")
        .and_then(|v| v.to_str().ok())
        .filter(|host| !host.is_empty())
        .map(|host| format!("https://{}", host))
        .unwrap_or_else(|| config.public_origin.clone())
}

fn login_error_redirect(base: &str, code: &str) -> Response {
    Redirect::temporary(&format!("{}{}?error={}", base, STUDENT_LOGIN_PATH, code)).into_response()
}

fn session_cookie(session_id: &str, max_age: Duration) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        session_id,
        max_age.num_seconds()
    )
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /auth/callback - Exchange an authorization code for a portal session
#[utoipa::path(
    get,
    path = "/auth/callback",
    params(CallbackQuery),
    responses(
        (status = 307, description = "Redirect to `next`, or to the login page with an error code")
    )
)]
pub async fn callback_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let config = &state.config;
    let next = sanitize_next(query.next.as_deref());

    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        return login_error_redirect(&config.public_origin, "auth_failed");
    };

    // 1. Exchange the code with the identity service
    let identity = match state.identity.exchange_code(code).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Authorization code exchange failed: {:?}", e);
            return login_error_redirect(&config.public_origin, "auth_failed");
        }
    };

    let base = redirect_base(config, &headers);

    // 2. The student area is limited to the school's domain
    if next.starts_with("/student") && !email_in_domain(&identity.email, &config.allowed_email_domain)
    {
        info!(email = %identity.email, "Refused student sign-in outside the allowed domain");
        return login_error_redirect(&base, "invalid_domain");
    }

    // 3. Open a portal session
    let auth_session_id = Uuid::new_v4().to_string();
    let ttl = Duration::days(config.session_ttl_days);
    if let Err(e) = state
        .db
        .create_auth_session(&auth_session_id, &identity, Utc::now() + ttl)
        .await
    {
        error!("Failed to create auth session: {:?}", e);
        return login_error_redirect(&config.public_origin, "auth_failed");
    }

    info!(user_id = %identity.user_id, "Student signed in");
    (
        [(header::SET_COOKIE, session_cookie(&auth_session_id, ttl))],
        Redirect::temporary(&format!("{}{}", base, next)),
    )
        .into_response()
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session", body = ErrorBody)
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ErrorResponse> {
    let auth_session_id =
        cookie_value(&headers, SESSION_COOKIE).ok_or_else(ErrorResponse::unauthorized)?;

    state
        .db
        .delete_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            ErrorResponse::internal("ログアウトに失敗しました。")
        })?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie("", Duration::zero()))],
    ))
}

/// GET /auth/session - The signed-in student
#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Current identity", body = SessionResponse),
        (status = 401, description = "Not signed in", body = ErrorBody)
    )
)]
pub async fn session_handler(Extension(identity): Extension<StudentIdentity>) -> Json<SessionResponse> {
    Json(SessionResponse {
        user_id: identity.user_id,
        email: identity.email,
        display_name: identity.display_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_must_be_same_site_path() {
        assert_eq!(sanitize_next(None), "/");
        assert_eq!(sanitize_next(Some("/student")), "/student");
        assert_eq!(sanitize_next(Some("https://evil.example")), "/");
        assert_eq!(sanitize_next(Some("//evil.example")), "/");
        assert_eq!(sanitize_next(Some("/\\evil.example")), "/");
    }
}
