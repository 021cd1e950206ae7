//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the public catalog endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::{ErrorBody, ErrorResponse};
use crate::web::state::AppState;
use crate::web::{apply, auth, contact, enroll, student};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use tutoring_portal_core::catalog::{
    build_timetable, group_catalog, group_open_courses, slots_for_term, CategoryGroup,
    GradeTimetable, OpenCourseGroup, School,
};
use tutoring_portal_core::domain::{Term, TuitionInfo};
use tutoring_portal_core::ports::PortError;
use tutoring_portal_core::schedule::{Period, SATURDAY_PERIODS, WEEKDAY_PERIODS};
use utoipa::{IntoParams, OpenApi};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        active_term_handler,
        courses_handler,
        apply_courses_handler,
        timetable_handler,
        periods_handler,
        tuition_handler,
        contact::contact_handler,
        enroll::enroll_handler,
        auth::callback_handler,
        auth::logout_handler,
        auth::session_handler,
        apply::save_draft_handler,
        apply::restore_draft_handler,
        apply::summary_handler,
        apply::slots_handler,
        student::enrollments_handler,
        student::payments_handler,
        student::classroom_handler,
        student::notes_handler,
    ),
    components(
        schemas(
            ErrorBody,
            contact::ContactResponse,
            enroll::EnrollResponse,
            auth::SessionResponse,
            apply::SaveDraftResponse,
            apply::DraftResponse,
            apply::SummaryResponse,
            apply::PaymentOption,
            apply::SlotChoice,
            apply::SlotsResponse,
        )
    ),
    tags(
        (name = "Tutoring Portal API", description = "Catalog, contact, enrollment and student-area endpoints for the tutoring service.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Query Structs
//=========================================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct TimetableQuery {
    /// `senior` (default) or `junior`.
    #[param(value_type = Option<String>)]
    pub school: Option<School>,
}

#[derive(Serialize)]
pub struct TimetableResponse {
    pub school: School,
    pub term: Option<Term>,
    pub grades: Vec<GradeTimetable>,
}

#[derive(Serialize)]
pub struct PeriodsResponse {
    pub weekday: &'static [Period],
    pub saturday: &'static [Period],
}

fn backend_failure(what: &str, e: PortError) -> ErrorResponse {
    error!("Failed to load {}: {:?}", what, e);
    ErrorResponse::internal("データの取得に失敗しました。時間をおいて再度お試しください。")
}

//=========================================================================================
// Catalog Handlers
//=========================================================================================

/// The term currently open for enrollment.
#[utoipa::path(
    get,
    path = "/api/terms/active",
    responses(
        (status = 200, description = "The active term"),
        (status = 404, description = "No term is active", body = ErrorBody)
    )
)]
pub async fn active_term_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Term>, ErrorResponse> {
    state
        .db
        .get_active_term()
        .await
        .map_err(|e| backend_failure("active term", e))?
        .map(Json)
        .ok_or_else(|| ErrorResponse::new(StatusCode::NOT_FOUND, "現在受付中の期間はありません。"))
}

/// Every course, grouped by category and then by subject.
#[utoipa::path(
    get,
    path = "/api/courses",
    responses(
        (status = 200, description = "Category groups, each with one entry per subject"),
        (status = 500, description = "Backend failure", body = ErrorBody)
    )
)]
pub async fn courses_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategoryGroup>>, ErrorResponse> {
    let (categories, courses) =
        futures::try_join!(state.db.list_categories(), state.db.list_courses())
            .map_err(|e| backend_failure("course catalog", e))?;
    Ok(Json(group_catalog(&categories, &courses)))
}

/// Open courses by category, for the first step of the group wizard.
#[utoipa::path(
    get,
    path = "/api/apply/courses",
    responses(
        (status = 200, description = "Open courses per category"),
        (status = 500, description = "Backend failure", body = ErrorBody)
    )
)]
pub async fn apply_courses_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OpenCourseGroup>>, ErrorResponse> {
    let (categories, courses) =
        futures::try_join!(state.db.list_categories(), state.db.list_open_courses())
            .map_err(|e| backend_failure("open courses", e))?;
    Ok(Json(group_open_courses(&categories, &courses)))
}

/// Weekly grids for every grade of a school, limited to the active term.
#[utoipa::path(
    get,
    path = "/api/timetable",
    params(TimetableQuery),
    responses(
        (status = 200, description = "Grade sections with weekday and Saturday grids"),
        (status = 500, description = "Backend failure", body = ErrorBody)
    )
)]
pub async fn timetable_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimetableQuery>,
) -> Result<Json<TimetableResponse>, ErrorResponse> {
    let school = query.school.unwrap_or_default();
    let (term, slots, categories) = futures::try_join!(
        state.db.get_active_term(),
        state.db.list_timetable_slots(),
        state.db.list_categories(),
    )
    .map_err(|e| backend_failure("timetable", e))?;

    let slots = slots_for_term(slots, term.as_ref());
    Ok(Json(TimetableResponse {
        school,
        grades: build_timetable(school, &slots, &categories),
        term,
    }))
}

/// The fixed period tables.
#[utoipa::path(
    get,
    path = "/api/timetable/periods",
    responses((status = 200, description = "Weekday and Saturday period tables"))
)]
pub async fn periods_handler() -> Json<PeriodsResponse> {
    Json(PeriodsResponse {
        weekday: &WEEKDAY_PERIODS,
        saturday: &SATURDAY_PERIODS,
    })
}

#[utoipa::path(
    get,
    path = "/api/tuition",
    responses(
        (status = 200, description = "Tuition rows in display order"),
        (status = 500, description = "Backend failure", body = ErrorBody)
    )
)]
pub async fn tuition_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TuitionInfo>>, ErrorResponse> {
    state
        .db
        .list_tuition_info()
        .await
        .map(Json)
        .map_err(|e| backend_failure("tuition", e))
}
