//! crates/tutoring_portal_core/src/enrollment.rs
//!
//! Parsing and admission of enrollment requests. A request is checked in full
//! before any row is produced, so a rejected batch never yields a partial
//! insert.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::domain::{
    Course, CourseType, EnrollmentStatus, NewEnrollment, PaymentMethod, PaymentStatus,
};
use crate::schedule::{IndividualSlot, SlotError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrollmentError {
    #[error("講座を選択してください。")]
    NoCoursesSelected,
    #[error("時間帯を選択してください。")]
    NoSlotsSelected,
    #[error("選択された時間帯が正しくありません。")]
    InvalidSlot(#[source] SlotError),
    #[error("教科を選択してください。")]
    NoSubjects,
    #[error("有効な受講形態を選択してください。")]
    InvalidFormat,
    #[error("有効な支払い方法を選択してください。")]
    InvalidPaymentMethod,
    #[error("選択された講座の一部が見つかりません。")]
    CourseNotFound,
    #[error("受付終了した講座が含まれています。")]
    CourseClosed,
    #[error("既に申し込み済みの講座が含まれています。")]
    AlreadyEnrolled,
}

//=========================================================================================
// Wire Payload
//=========================================================================================

/// Reads a field that may arrive with the wrong JSON type. A mistyped value is
/// treated as absent so validation reports it like a missing selection.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// The body of `POST /api/enroll`, before validation. Both the group and the
/// individual shapes share this struct; `type: "individual"` selects the latter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollPayload {
    #[serde(rename = "type", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub course_ids: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub slots: Option<Vec<IndividualSlot>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub subjects: Option<Vec<String>>,
    /// Older clients send a single subject.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub course_count: Option<u32>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub friend_names: Option<Vec<String>>,
}

/// A validated group enrollment: distinct course ids in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupEnrollment {
    pub course_ids: Vec<Uuid>,
    pub payment_method: PaymentMethod,
}

/// A validated individual-tutoring enrollment.
#[derive(Debug, Clone, PartialEq)]
pub struct IndividualEnrollment {
    pub slots: Vec<IndividualSlot>,
    pub subjects: Vec<String>,
    pub course_count: u32,
    pub format: CourseType,
    pub friend_names: Vec<String>,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentRequest {
    Group(GroupEnrollment),
    Individual(IndividualEnrollment),
}

fn parse_payment_method(raw: Option<&str>) -> Result<PaymentMethod, EnrollmentError> {
    raw.and_then(|m| m.parse().ok())
        .ok_or(EnrollmentError::InvalidPaymentMethod)
}

/// Drops repeated entries, keeping the first occurrence.
fn dedup_in_order<T: PartialEq + Clone>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

impl EnrollPayload {
    pub fn is_individual(&self) -> bool {
        self.kind.as_deref() == Some("individual")
    }

    /// Validates the payload shape. Checks run in the order the errors are
    /// reported to the user; the first failure wins.
    pub fn validate(&self) -> Result<EnrollmentRequest, EnrollmentError> {
        if self.is_individual() {
            self.validate_individual().map(EnrollmentRequest::Individual)
        } else {
            self.validate_group().map(EnrollmentRequest::Group)
        }
    }

    fn validate_group(&self) -> Result<GroupEnrollment, EnrollmentError> {
        let raw_ids = self
            .course_ids
            .as_deref()
            .filter(|ids| !ids.is_empty())
            .ok_or(EnrollmentError::NoCoursesSelected)?;
        let payment_method = parse_payment_method(self.payment_method.as_deref())?;

        // Ids that are not UUIDs cannot name an existing course.
        let course_ids = raw_ids
            .iter()
            .map(|id| Uuid::parse_str(id.trim()).map_err(|_| EnrollmentError::CourseNotFound))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GroupEnrollment {
            course_ids: dedup_in_order(&course_ids),
            payment_method,
        })
    }

    fn validate_individual(&self) -> Result<IndividualEnrollment, EnrollmentError> {
        let slots = self
            .slots
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(EnrollmentError::NoSlotsSelected)?;
        for slot in slots {
            slot.validate().map_err(EnrollmentError::InvalidSlot)?;
        }

        let subjects: Vec<String> = match (&self.subjects, &self.subject) {
            (Some(subjects), _) => subjects.clone(),
            (None, Some(subject)) => vec![subject.clone()],
            (None, None) => Vec::new(),
        };
        let subjects: Vec<String> = subjects
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if subjects.is_empty() {
            return Err(EnrollmentError::NoSubjects);
        }

        let format = self
            .format
            .as_deref()
            .and_then(|f| f.parse::<CourseType>().ok())
            .filter(CourseType::is_individual)
            .ok_or(EnrollmentError::InvalidFormat)?;

        let payment_method = parse_payment_method(self.payment_method.as_deref())?;

        let subjects = dedup_in_order(&subjects);
        Ok(IndividualEnrollment {
            slots: dedup_in_order(slots),
            course_count: self
                .course_count
                .unwrap_or_else(|| u32::try_from(subjects.len()).unwrap_or(u32::MAX)),
            subjects,
            format,
            friend_names: self.friend_names.clone().unwrap_or_default(),
            payment_method,
        })
    }
}

//=========================================================================================
// Admission and Row Planning
//=========================================================================================

impl GroupEnrollment {
    /// Checks the request against the current course rows and the student's
    /// held enrollments, and produces one pending row per course.
    ///
    /// `courses` is whatever the backend returned for `course_ids`; `held` are
    /// the ids the student already holds a non-cancelled enrollment for.
    pub fn admit(
        &self,
        student_id: Uuid,
        courses: &[Course],
        held: &[Uuid],
    ) -> Result<Vec<NewEnrollment>, EnrollmentError> {
        let selected: Vec<&Course> = self
            .course_ids
            .iter()
            .map(|id| courses.iter().find(|c| c.id == *id))
            .collect::<Option<Vec<_>>>()
            .ok_or(EnrollmentError::CourseNotFound)?;

        if selected.iter().any(|c| !c.is_open()) {
            return Err(EnrollmentError::CourseClosed);
        }
        if self.course_ids.iter().any(|id| held.contains(id)) {
            return Err(EnrollmentError::AlreadyEnrolled);
        }

        Ok(selected
            .into_iter()
            .map(|course| NewEnrollment {
                student_id,
                course_id: Some(course.id),
                term_id: course.term_id,
                status: EnrollmentStatus::Pending,
                payment_method: self.payment_method,
                payment_status: PaymentStatus::Unpaid,
                payment_amount: course.price,
                notes: None,
            })
            .collect())
    }
}

/// The JSON stored in `enrollments.notes` for an individual-tutoring slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualNotes {
    #[serde(rename = "type")]
    pub kind: String,
    pub day: String,
    pub period: String,
    pub subjects: Vec<String>,
    pub course_count: u32,
    pub format: CourseType,
    pub friend_names: Vec<String>,
}

impl IndividualEnrollment {
    /// One pending row per slot, with no course and the details serialized into
    /// `notes`. Price is settled later, so `payment_amount` starts at zero.
    pub fn rows(&self, student_id: Uuid, term_id: Option<Uuid>) -> Vec<NewEnrollment> {
        self.slots
            .iter()
            .map(|slot| {
                let notes = IndividualNotes {
                    kind: "individual".to_string(),
                    day: slot.day.clone(),
                    period: slot.period.clone(),
                    subjects: self.subjects.clone(),
                    course_count: self.course_count,
                    format: self.format,
                    friend_names: self.friend_names.clone(),
                };
                NewEnrollment {
                    student_id,
                    course_id: None,
                    term_id,
                    status: EnrollmentStatus::Pending,
                    payment_method: self.payment_method,
                    payment_status: PaymentStatus::Unpaid,
                    payment_amount: 0,
                    notes: serde_json::to_string(&notes).ok(),
                }
            })
            .collect()
    }
}
