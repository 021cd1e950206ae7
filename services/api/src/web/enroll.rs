//! services/api/src/web/enroll.rs
//!
//! `POST /api/enroll`: group and individual-tutoring enrollment. The whole
//! request is checked before anything is written, and the rows go in as a
//! single batch.

use axum::{body::Bytes, extract::State, Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use tutoring_portal_core::domain::{NewEnrollment, StudentIdentity};
use tutoring_portal_core::enrollment::{
    EnrollPayload, EnrollmentError, EnrollmentRequest, GroupEnrollment, IndividualEnrollment,
};
use tutoring_portal_core::ports::PortError;
use utoipa::ToSchema;

use crate::error::{ErrorBody, ErrorResponse};
use crate::web::middleware::require_student_domain;
use crate::web::state::AppState;

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnrollResponse {
    pub success: bool,
    pub message: String,
    pub enrollment_count: usize,
}

/// POST /api/enroll - Enroll the signed-in student
#[utoipa::path(
    post,
    path = "/api/enroll",
    request_body(content = String, description = "`{courseIds, paymentMethod}` or `{type: \"individual\", slots, subjects, format, paymentMethod, friendNames?}`", content_type = "application/json"),
    responses(
        (status = 200, description = "Enrollment recorded", body = EnrollResponse),
        (status = 400, description = "Invalid selection", body = ErrorBody),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 403, description = "Signed in outside the allowed domain", body = ErrorBody),
        (status = 500, description = "Backend failure", body = ErrorBody)
    )
)]
pub async fn enroll_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<StudentIdentity>,
    body: Bytes,
) -> Result<Json<EnrollResponse>, ErrorResponse> {
    require_student_domain(&state.config, &identity)?;

    let payload: EnrollPayload = serde_json::from_slice(&body).map_err(|e| {
        warn!("Undecodable enrollment body: {}", e);
        ErrorResponse::internal("サーバーエラーが発生しました。")
    })?;

    let request = payload
        .validate()
        .map_err(|e| ErrorResponse::bad_request(e.to_string()))?;

    let (rows, message) = match request {
        EnrollmentRequest::Group(group) => (
            plan_group(&state, &identity, &group).await?,
            "申し込みが完了しました。",
        ),
        EnrollmentRequest::Individual(individual) => (
            plan_individual(&state, &identity, &individual).await,
            "個別指導の申し込みが完了しました。",
        ),
    };

    let enrollment_count = state.db.insert_enrollments(rows).await.map_err(|e| match e {
        // A concurrent submission got there first.
        PortError::Conflict(detail) => {
            info!(student_id = %identity.user_id, %detail, "Duplicate enrollment rejected on insert");
            ErrorResponse::bad_request(EnrollmentError::AlreadyEnrolled.to_string())
        }
        e => {
            error!("Enrollment insert failed: {:?}", e);
            ErrorResponse::internal("申し込みの登録に失敗しました。")
        }
    })?;

    info!(student_id = %identity.user_id, enrollment_count, "Enrollment recorded");
    Ok(Json(EnrollResponse {
        success: true,
        message: message.to_string(),
        enrollment_count,
    }))
}

async fn plan_group(
    state: &AppState,
    identity: &StudentIdentity,
    group: &GroupEnrollment,
) -> Result<Vec<NewEnrollment>, ErrorResponse> {
    let (courses, held) = futures::try_join!(
        state.db.get_courses_by_ids(&group.course_ids),
        state
            .db
            .find_held_course_ids(identity.user_id, &group.course_ids),
    )
    .map_err(|e| {
        error!("Failed to load courses for enrollment: {:?}", e);
        ErrorResponse::internal("講座情報の取得に失敗しました。")
    })?;

    group
        .admit(identity.user_id, &courses, &held)
        .map_err(|e| ErrorResponse::bad_request(e.to_string()))
}

async fn plan_individual(
    state: &AppState,
    identity: &StudentIdentity,
    individual: &IndividualEnrollment,
) -> Vec<NewEnrollment> {
    // Rows are still accepted without a term; staff assign it later.
    let term_id = match state.db.get_active_term().await {
        Ok(term) => term.map(|t| t.id),
        Err(e) => {
            warn!("Could not resolve the active term: {:?}", e);
            None
        }
    };
    individual.rows(identity.user_id, term_id)
}
