pub mod apply;
pub mod auth;
pub mod contact;
pub mod enroll;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod student;

pub use middleware::require_auth;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use state::AppState;

/// Builds every API route on top of the shared state. CORS and the Swagger UI
/// are layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/callback", get(auth::callback_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/api/contact", post(contact::contact_handler))
        .route("/api/terms/active", get(rest::active_term_handler))
        .route("/api/courses", get(rest::courses_handler))
        .route("/api/apply/courses", get(rest::apply_courses_handler))
        .route(
            "/api/apply/draft",
            put(apply::save_draft_handler).get(apply::restore_draft_handler),
        )
        .route("/api/apply/summary", get(apply::summary_handler))
        .route("/api/apply/slots", get(apply::slots_handler))
        .route("/api/timetable", get(rest::timetable_handler))
        .route("/api/timetable/periods", get(rest::periods_handler))
        .route("/api/tuition", get(rest::tuition_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/session", get(auth::session_handler))
        .route("/api/enroll", post(enroll::enroll_handler))
        .route("/api/student/enrollments", get(student::enrollments_handler))
        .route("/api/student/payments", get(student::payments_handler))
        .route("/api/student/classroom", get(student::classroom_handler))
        .route("/api/student/notes", get(student::notes_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
