//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::str::FromStr;
use tutoring_portal_core::domain::{
    ClassroomAssignment, Course, CourseCategory, Enrollment, EnrollmentWithCourse, InstructorNote,
    NewContactSubmission, NewEnrollment, NoteAudience, SlotCourse, StudentIdentity,
    StudentUsageNote, Term, TimetableSlot, TuitionInfo, UnknownVariant,
};
use tutoring_portal_core::ports::{DatabaseService, PortError, PortResult};
use uuid::Uuid;

// Timetable and classroom rows hold kanji weekdays; this orders them Monday first.
const DAY_ORDER_SQL: &str = "array_position(ARRAY['月','火','水','木','金','土'], day_of_week)";

const COURSE_COLUMNS: &str = "id, category_id, name, subject, description, instructor_name, \
     course_type, day_of_week, start_time::text AS start_time, end_time::text AS end_time, \
     classroom, capacity, price, target_grade, term_id, status, display_order";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn courses_by_id(&self, course_ids: &[Uuid]) -> PortResult<HashMap<Uuid, Course>> {
        if course_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let courses = self.get_courses_by_ids(course_ids).await?;
        Ok(courses.into_iter().map(|c| (c.id, c)).collect())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn parse_column<T>(value: &str) -> PortResult<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    value
        .parse()
        .map_err(|e: UnknownVariant| PortError::Unexpected(e.to_string()))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct TermRecord {
    id: Uuid,
    name: String,
    slug: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    enrollment_start: Option<NaiveDate>,
    enrollment_end: Option<NaiveDate>,
    is_active: bool,
    display_order: i32,
}
impl TermRecord {
    fn to_domain(self) -> Term {
        Term {
            id: self.id,
            name: self.name,
            slug: self.slug,
            start_date: self.start_date,
            end_date: self.end_date,
            enrollment_start: self.enrollment_start,
            enrollment_end: self.enrollment_end,
            is_active: self.is_active,
            display_order: self.display_order,
        }
    }
}

#[derive(FromRow)]
struct CategoryRecord {
    id: Uuid,
    name: String,
    slug: String,
    display_order: i32,
    description: Option<String>,
}
impl CategoryRecord {
    fn to_domain(self) -> CourseCategory {
        CourseCategory {
            id: self.id,
            name: self.name,
            slug: self.slug,
            display_order: self.display_order,
            description: self.description,
        }
    }
}

#[derive(FromRow)]
struct CourseRecord {
    id: Uuid,
    category_id: Uuid,
    name: String,
    subject: String,
    description: String,
    instructor_name: Option<String>,
    course_type: String,
    day_of_week: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    classroom: Option<String>,
    capacity: i32,
    price: i64,
    target_grade: Option<String>,
    term_id: Option<Uuid>,
    status: String,
    display_order: i32,
}
impl CourseRecord {
    fn to_domain(self) -> PortResult<Course> {
        Ok(Course {
            id: self.id,
            category_id: self.category_id,
            name: self.name,
            subject: self.subject,
            description: self.description,
            instructor_name: self.instructor_name,
            course_type: parse_column(&self.course_type)?,
            day_of_week: self.day_of_week,
            start_time: self.start_time,
            end_time: self.end_time,
            classroom: self.classroom,
            capacity: self.capacity,
            price: self.price,
            target_grade: self.target_grade,
            term_id: self.term_id,
            status: parse_column(&self.status)?,
            display_order: self.display_order,
        })
    }
}

#[derive(FromRow)]
struct SlotRecord {
    id: Uuid,
    course_id: Uuid,
    day_of_week: String,
    period: i32,
    start_time: String,
    end_time: String,
    classroom: String,
}
impl SlotRecord {
    fn to_domain(self, course: Option<&Course>) -> TimetableSlot {
        TimetableSlot {
            id: self.id,
            course_id: self.course_id,
            day_of_week: self.day_of_week,
            period: self.period,
            start_time: self.start_time,
            end_time: self.end_time,
            classroom: self.classroom,
            course: course.map(|c| SlotCourse {
                name: c.name.clone(),
                instructor_name: c.instructor_name.clone(),
                target_grade: c.target_grade.clone(),
                subject: c.subject.clone(),
                course_type: c.course_type,
                category_id: c.category_id,
                price: c.price,
                status: c.status,
                term_id: c.term_id,
            }),
        }
    }
}

#[derive(FromRow)]
struct TuitionRecord {
    id: Uuid,
    category_id: Option<Uuid>,
    course_type: String,
    label: String,
    price: i64,
    unit: String,
    notes: Option<String>,
    display_order: i32,
}
impl TuitionRecord {
    fn to_domain(self) -> TuitionInfo {
        TuitionInfo {
            id: self.id,
            category_id: self.category_id,
            course_type: self.course_type,
            label: self.label,
            price: self.price,
            unit: self.unit,
            notes: self.notes,
            display_order: self.display_order,
        }
    }
}

#[derive(FromRow)]
struct EnrollmentRecord {
    id: Uuid,
    student_id: Uuid,
    course_id: Option<Uuid>,
    term_id: Option<Uuid>,
    status: String,
    payment_method: Option<String>,
    payment_status: String,
    payment_amount: i64,
    payment_due_date: Option<NaiveDate>,
    enrolled_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    notes: Option<String>,
}
impl EnrollmentRecord {
    fn to_domain(self) -> PortResult<Enrollment> {
        Ok(Enrollment {
            id: self.id,
            student_id: self.student_id,
            course_id: self.course_id,
            term_id: self.term_id,
            status: parse_column(&self.status)?,
            payment_method: self
                .payment_method
                .as_deref()
                .map(parse_column)
                .transpose()?,
            payment_status: parse_column(&self.payment_status)?,
            payment_amount: self.payment_amount,
            payment_due_date: self.payment_due_date,
            enrolled_at: self.enrolled_at,
            confirmed_at: self.confirmed_at,
            notes: self.notes,
        })
    }
}

#[derive(FromRow)]
struct AssignmentRecord {
    id: Uuid,
    course_id: Uuid,
    classroom: String,
    day_of_week: String,
    start_time: String,
    end_time: String,
    effective_date: Option<NaiveDate>,
    notes: Option<String>,
}
impl AssignmentRecord {
    fn to_domain(self, course: Option<Course>) -> ClassroomAssignment {
        ClassroomAssignment {
            id: self.id,
            course_id: self.course_id,
            classroom: self.classroom,
            day_of_week: self.day_of_week,
            start_time: self.start_time,
            end_time: self.end_time,
            effective_date: self.effective_date,
            notes: self.notes,
            course,
        }
    }
}

#[derive(FromRow)]
struct InstructorNoteRecord {
    id: Uuid,
    instructor_id: Uuid,
    course_id: Uuid,
    target_audience: String,
    title: String,
    content: String,
    created_at: DateTime<Utc>,
}
impl InstructorNoteRecord {
    fn to_domain(self) -> PortResult<InstructorNote> {
        Ok(InstructorNote {
            id: self.id,
            instructor_id: self.instructor_id,
            course_id: self.course_id,
            target_audience: parse_column(&self.target_audience)?,
            title: self.title,
            content: self.content,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct UsageNoteRecord {
    id: Uuid,
    title: String,
    content: String,
    display_order: i32,
    is_active: bool,
}
impl UsageNoteRecord {
    fn to_domain(self) -> StudentUsageNote {
        StudentUsageNote {
            id: self.id,
            title: self.title,
            content: self.content,
            display_order: self.display_order,
            is_active: self.is_active,
        }
    }
}

#[derive(FromRow)]
struct AuthSessionRecord {
    user_id: Uuid,
    email: String,
    display_name: Option<String>,
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn get_active_term(&self) -> PortResult<Option<Term>> {
        let record = sqlx::query_as::<_, TermRecord>(
            "SELECT id, name, slug, start_date, end_date, enrollment_start, enrollment_end, \
             is_active, display_order FROM terms WHERE is_active = true \
             ORDER BY display_order LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(TermRecord::to_domain))
    }

    async fn list_categories(&self) -> PortResult<Vec<CourseCategory>> {
        let records = sqlx::query_as::<_, CategoryRecord>(
            "SELECT id, name, slug, display_order, description FROM course_categories \
             ORDER BY display_order",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(CategoryRecord::to_domain).collect())
    }

    async fn list_courses(&self) -> PortResult<Vec<Course>> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY subject, name");
        let records = sqlx::query_as::<_, CourseRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        records.into_iter().map(CourseRecord::to_domain).collect()
    }

    async fn list_open_courses(&self) -> PortResult<Vec<Course>> {
        let sql = format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE status = 'open' ORDER BY display_order"
        );
        let records = sqlx::query_as::<_, CourseRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        records.into_iter().map(CourseRecord::to_domain).collect()
    }

    async fn get_courses_by_ids(&self, course_ids: &[Uuid]) -> PortResult<Vec<Course>> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ANY($1)");
        let records = sqlx::query_as::<_, CourseRecord>(&sql)
            .bind(course_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        records.into_iter().map(CourseRecord::to_domain).collect()
    }

    async fn list_timetable_slots(&self) -> PortResult<Vec<TimetableSlot>> {
        let sql = format!(
            "SELECT id, course_id, day_of_week, period, start_time::text AS start_time, \
             end_time::text AS end_time, classroom FROM timetable_slots \
             ORDER BY {DAY_ORDER_SQL}, period"
        );
        let records = sqlx::query_as::<_, SlotRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        let course_ids: Vec<Uuid> = records.iter().map(|r| r.course_id).collect();
        let courses = self.courses_by_id(&course_ids).await?;
        Ok(records
            .into_iter()
            .map(|r| {
                let course = courses.get(&r.course_id);
                r.to_domain(course)
            })
            .collect())
    }

    async fn list_tuition_info(&self) -> PortResult<Vec<TuitionInfo>> {
        let records = sqlx::query_as::<_, TuitionRecord>(
            "SELECT id, category_id, course_type, label, price, unit, notes, display_order \
             FROM tuition_info ORDER BY display_order",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(TuitionRecord::to_domain).collect())
    }

    async fn find_held_course_ids(
        &self,
        student_id: Uuid,
        course_ids: &[Uuid],
    ) -> PortResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT course_id FROM enrollments \
             WHERE student_id = $1 AND course_id = ANY($2) AND status <> 'cancelled'",
        )
        .bind(student_id)
        .bind(course_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn insert_enrollments(&self, enrollments: Vec<NewEnrollment>) -> PortResult<usize> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let count = enrollments.len();
        for row in enrollments {
            sqlx::query(
                "INSERT INTO enrollments (student_id, course_id, term_id, status, payment_method, \
                 payment_status, payment_amount, notes) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(row.student_id)
            .bind(row.course_id)
            .bind(row.term_id)
            .bind(row.status.as_str())
            .bind(row.payment_method.as_str())
            .bind(row.payment_status.as_str())
            .bind(row.payment_amount)
            .bind(row.notes)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db) = &e {
                    if db.is_unique_violation() {
                        return PortError::Conflict(db.message().to_string());
                    }
                }
                unexpected(e)
            })?;
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(count)
    }

    async fn list_enrollments_for_student(
        &self,
        student_id: Uuid,
    ) -> PortResult<Vec<EnrollmentWithCourse>> {
        let records = sqlx::query_as::<_, EnrollmentRecord>(
            "SELECT id, student_id, course_id, term_id, status, payment_method, payment_status, \
             payment_amount, payment_due_date, enrolled_at, confirmed_at, notes \
             FROM enrollments WHERE student_id = $1 ORDER BY enrolled_at DESC",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let course_ids: Vec<Uuid> = records.iter().filter_map(|r| r.course_id).collect();
        let courses = self.courses_by_id(&course_ids).await?;
        records
            .into_iter()
            .map(|r| {
                let enrollment = r.to_domain()?;
                let course = enrollment.course_id.and_then(|id| courses.get(&id).cloned());
                Ok(EnrollmentWithCourse { enrollment, course })
            })
            .collect()
    }

    async fn list_classroom_assignments(&self) -> PortResult<Vec<ClassroomAssignment>> {
        let sql = format!(
            "SELECT id, course_id, classroom, day_of_week, start_time::text AS start_time, \
             end_time::text AS end_time, effective_date, notes FROM classroom_assignments \
             ORDER BY {DAY_ORDER_SQL}, start_time"
        );
        let records = sqlx::query_as::<_, AssignmentRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        let course_ids: Vec<Uuid> = records.iter().map(|r| r.course_id).collect();
        let courses = self.courses_by_id(&course_ids).await?;
        Ok(records
            .into_iter()
            .map(|r| {
                let course = courses.get(&r.course_id).cloned();
                r.to_domain(course)
            })
            .collect())
    }

    async fn list_usage_notes(&self) -> PortResult<Vec<StudentUsageNote>> {
        let records = sqlx::query_as::<_, UsageNoteRecord>(
            "SELECT id, title, content, display_order, is_active FROM student_usage_notes \
             WHERE is_active = true ORDER BY display_order",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(UsageNoteRecord::to_domain).collect())
    }

    async fn list_instructor_notes(
        &self,
        audiences: &[NoteAudience],
    ) -> PortResult<Vec<InstructorNote>> {
        let audiences: Vec<String> = audiences.iter().map(|a| a.as_str().to_string()).collect();
        let records = sqlx::query_as::<_, InstructorNoteRecord>(
            "SELECT id, instructor_id, course_id, target_audience, title, content, created_at \
             FROM instructor_notes WHERE target_audience = ANY($1) ORDER BY created_at DESC",
        )
        .bind(&audiences)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records
            .into_iter()
            .map(InstructorNoteRecord::to_domain)
            .collect()
    }

    async fn insert_contact_submission(
        &self,
        submission: NewContactSubmission,
    ) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO contact_submissions (name, email, phone, category, subject, message, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(submission.name)
        .bind(submission.email)
        .bind(submission.phone)
        .bind(submission.category.as_str())
        .bind(submission.subject)
        .bind(submission.message)
        .bind(submission.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        identity: &StudentIdentity,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO auth_sessions (id, user_id, email, display_name, expires_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session_id)
        .bind(identity.user_id)
        .bind(&identity.email)
        .bind(&identity.display_name)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<StudentIdentity> {
        let record = sqlx::query_as::<_, AuthSessionRecord>(
            "SELECT user_id, email, display_name FROM auth_sessions \
             WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)?;

        Ok(StudentIdentity {
            user_id: record.user_id,
            email: record.email,
            display_name: record.display_name,
        })
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}
