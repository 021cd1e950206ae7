//! crates/tutoring_portal_core/src/domain.rs
//!
//! Defines the core data structures for the portal.
//! These mirror the rows consumed from the hosted backend; they carry no
//! database-specific types, only `serde` derives so handlers can return them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Returned when a text column holds a value outside a known enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Implements `as_str`, `Display` and `FromStr` for a text-backed enum.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

//=========================================================================================
// Terms and Catalog
//=========================================================================================

/// An enrollment period. Exactly one term is expected to be active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Term {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub enrollment_start: Option<NaiveDate>,
    pub enrollment_end: Option<NaiveDate>,
    pub is_active: bool,
    pub display_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseCategory {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub display_order: i32,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseStatus {
    Draft,
    Open,
    Closed,
}

text_enum!(CourseStatus, "course status", {
    Draft => "draft",
    Open => "open",
    Closed => "closed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseType {
    Group,
    #[serde(rename = "individual_1on1")]
    Individual1on1,
    #[serde(rename = "individual_1on2")]
    Individual1on2,
    #[serde(rename = "individual_1on3")]
    Individual1on3,
}

text_enum!(CourseType, "course type", {
    Group => "group",
    Individual1on1 => "individual_1on1",
    Individual1on2 => "individual_1on2",
    Individual1on3 => "individual_1on3",
});

impl CourseType {
    pub fn label(&self) -> &'static str {
        match self {
            CourseType::Group => "集団授業",
            CourseType::Individual1on1 => "個別指導（1対1）",
            CourseType::Individual1on2 => "個別指導（1対2）",
            CourseType::Individual1on3 => "個別指導（1対3）",
        }
    }

    pub fn is_individual(&self) -> bool {
        !matches!(self, CourseType::Group)
    }

    /// Number of companions that must be named when booking this format.
    pub fn companions(&self) -> usize {
        match self {
            CourseType::Group | CourseType::Individual1on1 => 0,
            CourseType::Individual1on2 => 1,
            CourseType::Individual1on3 => 2,
        }
    }
}

/// A purchasable offering. Only `Open` courses can be selected for enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub subject: String,
    pub description: String,
    pub instructor_name: Option<String>,
    pub course_type: CourseType,
    pub day_of_week: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub classroom: Option<String>,
    pub capacity: i32,
    pub price: i64,
    pub target_grade: Option<String>,
    pub term_id: Option<Uuid>,
    pub status: CourseStatus,
    pub display_order: i32,
}

impl Course {
    pub fn is_open(&self) -> bool {
        self.status == CourseStatus::Open
    }
}

/// The subset of course fields shown inside a timetable cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotCourse {
    pub name: String,
    pub instructor_name: Option<String>,
    pub target_grade: Option<String>,
    pub subject: String,
    pub course_type: CourseType,
    pub category_id: Uuid,
    pub price: i64,
    pub status: CourseStatus,
    pub term_id: Option<Uuid>,
}

/// A weekly placement of a course at a day, period and classroom.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimetableSlot {
    pub id: Uuid,
    pub course_id: Uuid,
    pub day_of_week: String,
    pub period: i32,
    pub start_time: String,
    pub end_time: String,
    pub classroom: String,
    pub course: Option<SlotCourse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuitionInfo {
    pub id: Uuid,
    pub category_id: Option<Uuid>,
    pub course_type: String,
    pub label: String,
    pub price: i64,
    pub unit: String,
    pub notes: Option<String>,
    pub display_order: i32,
}

//=========================================================================================
// Enrollments and Payments
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

text_enum!(EnrollmentStatus, "enrollment status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Cancelled => "cancelled",
    Completed => "completed",
});

impl EnrollmentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "申込中",
            EnrollmentStatus::Confirmed => "確定",
            EnrollmentStatus::Cancelled => "キャンセル",
            EnrollmentStatus::Completed => "完了",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    BankTransfer,
    AccountTransferLump,
    AccountTransferInstallment,
}

text_enum!(PaymentMethod, "payment method", {
    BankTransfer => "bank_transfer",
    AccountTransferLump => "account_transfer_lump",
    AccountTransferInstallment => "account_transfer_installment",
});

impl PaymentMethod {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "銀行振込",
            PaymentMethod::AccountTransferLump => "口座振替（一括）",
            PaymentMethod::AccountTransferInstallment => "口座振替（分割）",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
    Refunded,
}

text_enum!(PaymentStatus, "payment status", {
    Unpaid => "unpaid",
    Partial => "partial",
    Paid => "paid",
    Refunded => "refunded",
});

impl PaymentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "未払い",
            PaymentStatus::Partial => "一部入金",
            PaymentStatus::Paid => "支払い済み",
            PaymentStatus::Refunded => "返金済み",
        }
    }
}

/// A student's registration for a course, or for an individual tutoring slot
/// when `course_id` is `None` (details then live in `notes`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Option<Uuid>,
    pub term_id: Option<Uuid>,
    pub status: EnrollmentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: PaymentStatus,
    pub payment_amount: i64,
    pub payment_due_date: Option<NaiveDate>,
    pub enrolled_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// An enrollment joined with its course, as shown on the student dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentWithCourse {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub course: Option<Course>,
}

/// A row to be inserted by the enrollment API.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEnrollment {
    pub student_id: Uuid,
    pub course_id: Option<Uuid>,
    pub term_id: Option<Uuid>,
    pub status: EnrollmentStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_amount: i64,
    pub notes: Option<String>,
}

//=========================================================================================
// Auxiliary Records
//=========================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassroomAssignment {
    pub id: Uuid,
    pub course_id: Uuid,
    pub classroom: String,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    pub effective_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub course: Option<Course>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteAudience {
    Student,
    Tutor,
    Both,
}

text_enum!(NoteAudience, "note audience", {
    Student => "student",
    Tutor => "tutor",
    Both => "both",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructorNote {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub course_id: Uuid,
    pub target_audience: NoteAudience,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentUsageNote {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub display_order: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactCategory {
    Course,
    Tuition,
    Enrollment,
    Schedule,
    Other,
}

text_enum!(ContactCategory, "contact category", {
    Course => "course",
    Tuition => "tuition",
    Enrollment => "enrollment",
    Schedule => "schedule",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    New,
    Read,
    Replied,
}

text_enum!(ContactStatus, "contact status", {
    New => "new",
    Read => "read",
    Replied => "replied",
});

/// A validated contact-form message, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewContactSubmission {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub category: ContactCategory,
    pub subject: String,
    pub message: String,
    pub status: ContactStatus,
}

//=========================================================================================
// Identity
//=========================================================================================

/// The signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentIdentity {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_method_round_trips_through_text() {
        for method in PaymentMethod::ALL {
            assert_eq!(method.as_str().parse::<PaymentMethod>().unwrap(), *method);
        }
    }

    #[test]
    fn legacy_installment_methods_are_rejected() {
        let err = "installment_1".parse::<PaymentMethod>().unwrap_err();
        assert_eq!(err.kind, "payment method");
        assert!("installment_2".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn companions_follow_format() {
        assert_eq!(CourseType::Individual1on1.companions(), 0);
        assert_eq!(CourseType::Individual1on2.companions(), 1);
        assert_eq!(CourseType::Individual1on3.companions(), 2);
        assert!(!CourseType::Group.is_individual());
    }

    #[test]
    fn course_type_uses_wire_names() {
        let json = serde_json::to_string(&CourseType::Individual1on2).unwrap();
        assert_eq!(json, "\"individual_1on2\"");
    }
}
