//! services/api/src/web/contact.rs
//!
//! `POST /api/contact`: validates and stores a contact-form message.

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use tutoring_portal_core::validation::ContactForm;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ErrorBody, ErrorResponse};
use crate::web::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct ContactResponse {
    pub success: bool,
    pub message: String,
    pub id: Uuid,
}

/// POST /api/contact - Submit the contact form
#[utoipa::path(
    post,
    path = "/api/contact",
    request_body(content = String, description = "JSON object with name, email, phone, category, subject and message", content_type = "application/json"),
    responses(
        (status = 201, description = "Message stored", body = ContactResponse),
        (status = 400, description = "One or more fields are invalid", body = ErrorBody),
        (status = 500, description = "Malformed body or backend failure", body = ErrorBody)
    )
)]
pub async fn contact_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<ContactResponse>), ErrorResponse> {
    // Missing fields are empty strings, but a body that is not a JSON object is a server-side failure.
    let form: ContactForm = serde_json::from_slice(&body).map_err(|e| {
        warn!("Undecodable contact body: {}", e);
        ErrorResponse::internal("リクエストの処理に失敗しました。")
    })?;

    let submission = form
        .validate()
        .map_err(|errors| ErrorResponse::validation(errors.0))?;
    let category = submission.category;

    let id = state
        .db
        .insert_contact_submission(submission)
        .await
        .map_err(|e| {
            error!("Failed to store contact submission: {:?}", e);
            ErrorResponse::internal("送信に失敗しました。時間をおいて再度お試しください。")
        })?;

    info!(%id, %category, "Contact submission received");
    Ok((
        StatusCode::CREATED,
        Json(ContactResponse {
            success: true,
            message: "お問い合わせを受け付けました。".to_string(),
            id,
        }),
    ))
}
