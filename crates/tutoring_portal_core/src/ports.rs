//! crates/tutoring_portal_core/src/ports.rs
//!
//! Defines the service contracts (traits) the portal depends on.
//! The hosted database and the OAuth identity service are both external
//! collaborators; the core only sees them through these ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    ClassroomAssignment, Course, CourseCategory, EnrollmentWithCourse, InstructorNote,
    NewContactSubmission, NewEnrollment, NoteAudience, StudentIdentity, StudentUsageNote, Term,
    TimetableSlot, TuitionInfo,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Conflicts with an existing record: {0}")]
    Conflict(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Terms and Catalog ---
    async fn get_active_term(&self) -> PortResult<Option<Term>>;

    /// Categories ordered by `display_order`.
    async fn list_categories(&self) -> PortResult<Vec<CourseCategory>>;

    /// Every course, ordered by subject then name.
    async fn list_courses(&self) -> PortResult<Vec<Course>>;

    /// Courses with status `open`, ordered by `display_order`.
    async fn list_open_courses(&self) -> PortResult<Vec<Course>>;

    /// Fetches the given courses. Unknown ids are simply absent from the result.
    async fn get_courses_by_ids(&self, course_ids: &[Uuid]) -> PortResult<Vec<Course>>;

    /// Timetable slots joined with their course, ordered by day then period.
    async fn list_timetable_slots(&self) -> PortResult<Vec<TimetableSlot>>;

    async fn list_tuition_info(&self) -> PortResult<Vec<TuitionInfo>>;

    // --- Enrollments ---

    /// Returns the ids among `course_ids` for which the student already holds a
    /// non-cancelled enrollment.
    async fn find_held_course_ids(
        &self,
        student_id: Uuid,
        course_ids: &[Uuid],
    ) -> PortResult<Vec<Uuid>>;

    /// Inserts all rows in a single transaction and returns how many were written.
    async fn insert_enrollments(&self, enrollments: Vec<NewEnrollment>) -> PortResult<usize>;

    /// The student's enrollments joined with their course, newest first.
    async fn list_enrollments_for_student(
        &self,
        student_id: Uuid,
    ) -> PortResult<Vec<EnrollmentWithCourse>>;

    // --- Student Area ---
    async fn list_classroom_assignments(&self) -> PortResult<Vec<ClassroomAssignment>>;

    async fn list_usage_notes(&self) -> PortResult<Vec<StudentUsageNote>>;

    async fn list_instructor_notes(
        &self,
        audiences: &[NoteAudience],
    ) -> PortResult<Vec<InstructorNote>>;

    // --- Contact ---
    async fn insert_contact_submission(&self, submission: NewContactSubmission)
        -> PortResult<Uuid>;

    // --- Auth Sessions ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        identity: &StudentIdentity,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<StudentIdentity>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchanges an OAuth authorization code for the identity of the signed-in user.
    async fn exchange_code(&self, code: &str) -> PortResult<StudentIdentity>;
}
