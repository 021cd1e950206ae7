//! services/api/src/web/student.rs
//!
//! The student area. Every handler runs behind `require_auth` and is limited
//! to the school's email domain.

use axum::{extract::State, Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use tutoring_portal_core::catalog::{
    assignments_by_day, assignments_for_term, enrollments_for_term, summarize_payments,
    DayAssignments, PaymentSummary,
};
use tutoring_portal_core::domain::{
    EnrollmentWithCourse, InstructorNote, NoteAudience, StudentIdentity, StudentUsageNote, Term,
};
use tutoring_portal_core::ports::PortError;

use crate::error::{ErrorBody, ErrorResponse};
use crate::web::middleware::require_student_domain;
use crate::web::state::AppState;

#[derive(Serialize)]
pub struct PaymentsResponse {
    pub term: Option<Term>,
    pub enrollments: Vec<EnrollmentWithCourse>,
    pub summary: PaymentSummary,
}

#[derive(Serialize)]
pub struct ClassroomResponse {
    pub term: Option<Term>,
    pub days: Vec<DayAssignments>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesResponse {
    pub usage_notes: Vec<StudentUsageNote>,
    pub instructor_notes: Vec<InstructorNote>,
}

fn load_failed(e: PortError) -> ErrorResponse {
    error!("Student area query failed: {:?}", e);
    ErrorResponse::internal("データの取得に失敗しました。時間をおいて再度お試しください。")
}

/// All of the student's enrollments, newest first.
#[utoipa::path(
    get,
    path = "/api/student/enrollments",
    responses(
        (status = 200, description = "Enrollments joined with their course"),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 403, description = "Outside the allowed domain", body = ErrorBody)
    )
)]
pub async fn enrollments_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<StudentIdentity>,
) -> Result<Json<Vec<EnrollmentWithCourse>>, ErrorResponse> {
    require_student_domain(&state.config, &identity)?;
    state
        .db
        .list_enrollments_for_student(identity.user_id)
        .await
        .map(Json)
        .map_err(load_failed)
}

/// Active-term enrollments with totals per payment status.
#[utoipa::path(
    get,
    path = "/api/student/payments",
    responses(
        (status = 200, description = "Enrollments and payment summary"),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 403, description = "Outside the allowed domain", body = ErrorBody)
    )
)]
pub async fn payments_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<StudentIdentity>,
) -> Result<Json<PaymentsResponse>, ErrorResponse> {
    require_student_domain(&state.config, &identity)?;
    let (term, enrollments) = futures::try_join!(
        state.db.get_active_term(),
        state.db.list_enrollments_for_student(identity.user_id),
    )
    .map_err(load_failed)?;

    let enrollments = enrollments_for_term(enrollments, term.as_ref());
    let summary = summarize_payments(&enrollments);
    Ok(Json(PaymentsResponse {
        term,
        enrollments,
        summary,
    }))
}

/// Active-term classroom assignments, grouped 月 through 土.
#[utoipa::path(
    get,
    path = "/api/student/classroom",
    responses(
        (status = 200, description = "Assignments per day"),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 403, description = "Outside the allowed domain", body = ErrorBody)
    )
)]
pub async fn classroom_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<StudentIdentity>,
) -> Result<Json<ClassroomResponse>, ErrorResponse> {
    require_student_domain(&state.config, &identity)?;
    let (term, assignments) = futures::try_join!(
        state.db.get_active_term(),
        state.db.list_classroom_assignments(),
    )
    .map_err(load_failed)?;

    let assignments = assignments_for_term(assignments, term.as_ref());
    Ok(Json(ClassroomResponse {
        days: assignments_by_day(&assignments),
        term,
    }))
}

/// Usage notes and the instructor notes addressed to students.
#[utoipa::path(
    get,
    path = "/api/student/notes",
    responses(
        (status = 200, description = "Usage notes and instructor notes"),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 403, description = "Outside the allowed domain", body = ErrorBody)
    )
)]
pub async fn notes_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<StudentIdentity>,
) -> Result<Json<NotesResponse>, ErrorResponse> {
    require_student_domain(&state.config, &identity)?;
    let (usage_notes, instructor_notes) = futures::try_join!(
        state.db.list_usage_notes(),
        state
            .db
            .list_instructor_notes(&[NoteAudience::Student, NoteAudience::Both]),
    )
    .map_err(load_failed)?;

    Ok(Json(NotesResponse {
        usage_notes,
        instructor_notes,
    }))
}
