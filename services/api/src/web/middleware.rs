//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error};
use tutoring_portal_core::domain::StudentIdentity;
use tutoring_portal_core::ports::PortError;
use tutoring_portal_core::validation::email_in_domain;

use crate::config::Config;
use crate::error::ErrorResponse;
use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Returns the value of the named cookie from the request's `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| {
            let (key, value) = c.trim().split_once('=')?;
            (key == name).then_some(value)
        })
        .filter(|v| !v.is_empty())
}

/// Middleware that validates the auth session cookie and resolves the student.
///
/// If valid, inserts the `StudentIdentity` into request extensions for handlers to use.
/// If invalid or missing, returns 401 with the localized login message.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(auth_session_id) = cookie_value(req.headers(), SESSION_COOKIE) else {
        return ErrorResponse::unauthorized().into_response();
    };

    let identity = match state.db.validate_auth_session(auth_session_id).await {
        Ok(identity) => identity,
        Err(PortError::Unauthorized) | Err(PortError::NotFound(_)) => {
            debug!("Rejected an unknown or expired auth session");
            return ErrorResponse::unauthorized().into_response();
        }
        Err(e) => {
            error!("Failed to validate auth session: {:?}", e);
            return ErrorResponse::unauthorized().into_response();
        }
    };

    req.extensions_mut().insert(identity);
    next.run(req).await
}

/// Rejects identities outside the allowed email domain with 403.
pub fn require_student_domain(
    config: &Config,
    identity: &StudentIdentity,
) -> Result<(), ErrorResponse> {
    if email_in_domain(&identity.email, &config.allowed_email_domain) {
        Ok(())
    } else {
        Err(ErrorResponse::new(
            StatusCode::FORBIDDEN,
            format!(
                "@{} のメールアドレスでログインしてください。",
                config.allowed_email_domain
            ),
        ))
    }
}
