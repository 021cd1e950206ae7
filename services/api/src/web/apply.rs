//! services/api/src/web/apply.rs
//!
//! Support endpoints for the enrollment wizards: the draft that carries a
//! half-finished application across the login redirect, and the summary that
//! re-checks a course selection before payment.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use tutoring_portal_core::domain::{Course, PaymentMethod};
use tutoring_portal_core::schedule::{encode_slot_list, parse_slot_list, sort_slots};
use tutoring_portal_core::wizard::{reconcile, CourseSelection, UnavailableCourse, WizardDraft};
use url::form_urlencoded;
use utoipa::{IntoParams, ToSchema};

use crate::error::{ErrorBody, ErrorResponse};
use crate::web::middleware::cookie_value;
use crate::web::state::AppState;

pub const DRAFT_COOKIE: &str = "apply_draft";

/// A draft only needs to outlive one sign-in round trip.
const DRAFT_MAX_AGE_SECS: i64 = 60 * 60;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveDraftResponse {
    pub login_url: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DraftResponse {
    #[schema(value_type = Object)]
    pub draft: WizardDraft,
    pub restore_path: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SummaryQuery {
    /// Comma-separated course ids, as in the wizard URL.
    pub courses: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PaymentOption {
    pub value: String,
    pub label: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    #[schema(value_type = Vec<Object>)]
    pub courses: Vec<Course>,
    #[schema(value_type = Vec<Object>)]
    pub unavailable: Vec<UnavailableCourse>,
    pub total_price: i64,
    pub payment_methods: Vec<PaymentOption>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SlotsQuery {
    /// Comma-separated `<day>-<period>` keys, as linked from the timetable.
    pub slots: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct SlotChoice {
    pub day: String,
    pub period: String,
    pub key: String,
    pub label: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SlotsResponse {
    pub slots: Vec<SlotChoice>,
    pub apply_path: String,
}

//=========================================================================================
// Cookie Encoding
//=========================================================================================

fn encode_draft(draft: &WizardDraft) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(draft)?;
    Ok(form_urlencoded::byte_serialize(json.as_bytes()).collect())
}

fn decode_draft(raw: &str) -> Option<WizardDraft> {
    let wrapped = format!("d={}", raw);
    let (_, json) = form_urlencoded::parse(wrapped.as_bytes()).next()?;
    serde_json::from_str(&json).ok()
}

fn draft_cookie(value: &str, max_age: i64) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        DRAFT_COOKIE, value, max_age
    )
}

fn check_draft(draft: &WizardDraft) -> Result<(), ErrorResponse> {
    match draft {
        WizardDraft::Group { course_ids, .. } if course_ids.is_empty() => {
            Err(ErrorResponse::bad_request("講座を選択してください。"))
        }
        WizardDraft::Individual { slots, .. } if slots.is_empty() => {
            Err(ErrorResponse::bad_request("時間帯を選択してください。"))
        }
        WizardDraft::Individual { slots, .. } => slots
            .iter()
            .try_for_each(|slot| slot.validate().map(|_| ()))
            .map_err(|_| ErrorResponse::bad_request("選択された時間帯が正しくありません。")),
        WizardDraft::Group { .. } => Ok(()),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// PUT /api/apply/draft - Keep wizard state while the user signs in
#[utoipa::path(
    put,
    path = "/api/apply/draft",
    request_body(content = Object, description = "Group or individual wizard draft", content_type = "application/json"),
    responses(
        (status = 200, description = "Draft stored; continue at `loginUrl`", body = SaveDraftResponse),
        (status = 400, description = "Draft has nothing selected", body = ErrorBody)
    )
)]
pub async fn save_draft_handler(
    Json(draft): Json<WizardDraft>,
) -> Result<impl IntoResponse, ErrorResponse> {
    check_draft(&draft)?;

    let value = encode_draft(&draft).map_err(|e| {
        error!("Failed to encode wizard draft: {}", e);
        ErrorResponse::internal("サーバーエラーが発生しました。")
    })?;

    Ok((
        [(header::SET_COOKIE, draft_cookie(&value, DRAFT_MAX_AGE_SECS))],
        Json(SaveDraftResponse {
            login_url: draft.login_url(),
        }),
    ))
}

/// GET /api/apply/draft - Take back the stored draft after sign-in
#[utoipa::path(
    get,
    path = "/api/apply/draft",
    responses(
        (status = 200, description = "The stored draft; the cookie is cleared", body = DraftResponse),
        (status = 404, description = "No draft stored", body = ErrorBody)
    )
)]
pub async fn restore_draft_handler(headers: HeaderMap) -> impl IntoResponse {
    let clear = [(header::SET_COOKIE, draft_cookie("", 0))];

    match cookie_value(&headers, DRAFT_COOKIE).and_then(decode_draft) {
        Some(draft) => {
            let restore_path = draft.restore_path();
            (
                clear,
                Json(DraftResponse {
                    draft,
                    restore_path,
                }),
            )
                .into_response()
        }
        None => {
            debug!("No usable wizard draft on the request");
            (
                clear,
                ErrorResponse::new(StatusCode::NOT_FOUND, "保存された申し込み内容がありません。"),
            )
                .into_response()
        }
    }
}

/// GET /api/apply/summary - Re-check a course selection before payment
#[utoipa::path(
    get,
    path = "/api/apply/summary",
    params(SummaryQuery),
    responses(
        (status = 200, description = "Courses still available, stale ids and the total", body = SummaryResponse),
        (status = 400, description = "Nothing selected", body = ErrorBody),
        (status = 500, description = "Backend failure", body = ErrorBody)
    )
)]
pub async fn summary_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<SummaryResponse>, ErrorResponse> {
    let selection = CourseSelection::from_query(query.courses.as_deref().unwrap_or_default());
    if selection.is_empty() {
        return Err(ErrorResponse::bad_request("講座を選択してください。"));
    }

    let courses = state
        .db
        .get_courses_by_ids(selection.ids())
        .await
        .map_err(|e| {
            error!("Failed to load selected courses: {:?}", e);
            ErrorResponse::internal("講座情報の取得に失敗しました。")
        })?;

    let reconciliation = reconcile(&selection, &courses);
    Ok(Json(SummaryResponse {
        courses: reconciliation.available,
        unavailable: reconciliation.unavailable,
        total_price: reconciliation.total_price,
        payment_methods: PaymentMethod::ALL
            .iter()
            .map(|m| PaymentOption {
                value: m.as_str().to_string(),
                label: m.label().to_string(),
            })
            .collect(),
    }))
}

/// GET /api/apply/slots - Check the slots preselected in the timetable
#[utoipa::path(
    get,
    path = "/api/apply/slots",
    params(SlotsQuery),
    responses(
        (status = 200, description = "Slots in display order with the wizard link", body = SlotsResponse),
        (status = 400, description = "A slot does not exist", body = ErrorBody)
    )
)]
pub async fn slots_handler(
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, ErrorResponse> {
    let mut slots = parse_slot_list(query.slots.as_deref().unwrap_or_default()).map_err(|e| {
        debug!("Rejected slot list: {}", e);
        ErrorResponse::bad_request("選択された時間帯が正しくありません。")
    })?;
    sort_slots(&mut slots);
    slots.dedup();

    let apply_path = if slots.is_empty() {
        "/apply/individual".to_string()
    } else {
        let query: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("slots", &encode_slot_list(&slots))
            .finish();
        format!("/apply/individual?{query}")
    };

    Ok(Json(SlotsResponse {
        slots: slots
            .iter()
            .map(|slot| SlotChoice {
                day: slot.day.clone(),
                period: slot.period.clone(),
                key: slot.key(),
                label: slot.label(),
            })
            .collect(),
        apply_path,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutoring_portal_core::domain::CourseType;
    use tutoring_portal_core::schedule::IndividualSlot;
    use uuid::Uuid;

    #[test]
    fn draft_survives_cookie_encoding() {
        let draft = WizardDraft::Individual {
            slots: vec![IndividualSlot::new("月", "1限")],
            subjects: vec!["英語".to_string()],
            format: CourseType::Individual1on2,
            friend_names: ["山田 花子".to_string(), String::new()],
            payment_method: PaymentMethod::AccountTransferLump,
        };
        let encoded = encode_draft(&draft).unwrap();
        assert!(!encoded.contains(';'));
        assert!(!encoded.contains(' '));
        assert_eq!(decode_draft(&encoded), Some(draft));
    }

    #[test]
    fn empty_group_draft_is_refused() {
        let draft = WizardDraft::Group {
            course_ids: vec![],
            payment_method: PaymentMethod::BankTransfer,
        };
        assert!(check_draft(&draft).is_err());

        let draft = WizardDraft::Group {
            course_ids: vec![Uuid::new_v4()],
            payment_method: PaymentMethod::BankTransfer,
        };
        assert!(check_draft(&draft).is_ok());
    }

    #[test]
    fn garbage_cookie_is_ignored() {
        assert_eq!(decode_draft("not-json"), None);
    }
}
