//! In-memory stand-ins for the database and identity service, plus helpers
//! for driving the router in integration tests.
#![allow(dead_code)]

use api_lib::config::Config;
use api_lib::web::{self, state::AppState};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use tutoring_portal_core::domain::{
    ClassroomAssignment, Course, CourseCategory, CourseStatus, CourseType, Enrollment,
    EnrollmentStatus, EnrollmentWithCourse, InstructorNote, NewContactSubmission, NewEnrollment,
    NoteAudience, PaymentStatus, SlotCourse, StudentIdentity, StudentUsageNote, Term,
    TimetableSlot, TuitionInfo,
};
use tutoring_portal_core::ports::{DatabaseService, IdentityProvider, PortError, PortResult};
use uuid::Uuid;

pub const SCHOOL_DOMAIN: &str = "shukutoku.ed.jp";

//=========================================================================================
// In-Memory Database
//=========================================================================================

#[derive(Default)]
pub struct Store {
    pub term: Option<Term>,
    pub categories: Vec<CourseCategory>,
    pub courses: Vec<Course>,
    pub slots: Vec<TimetableSlot>,
    pub tuition: Vec<TuitionInfo>,
    pub enrollments: Vec<Enrollment>,
    pub assignments: Vec<ClassroomAssignment>,
    pub usage_notes: Vec<StudentUsageNote>,
    pub instructor_notes: Vec<InstructorNote>,
    pub contacts: Vec<(Uuid, NewContactSubmission)>,
    pub sessions: HashMap<String, StudentIdentity>,
    pub fail_writes: bool,
    /// Makes the held-course lookup miss existing rows, as when a concurrent
    /// submission commits between the check and the insert.
    pub stale_held_lookup: bool,
}

#[derive(Default)]
pub struct InMemoryDb {
    pub store: Mutex<Store>,
}

impl InMemoryDb {
    pub fn with(f: impl FnOnce(&mut Store)) -> Arc<Self> {
        let db = Self::default();
        f(&mut db.store.lock().unwrap());
        Arc::new(db)
    }

    pub fn enrollments(&self) -> Vec<Enrollment> {
        self.store.lock().unwrap().enrollments.clone()
    }

    pub fn contacts(&self) -> Vec<(Uuid, NewContactSubmission)> {
        self.store.lock().unwrap().contacts.clone()
    }

    pub fn has_session(&self, id: &str) -> bool {
        self.store.lock().unwrap().sessions.contains_key(id)
    }

    fn course(&self, id: Uuid) -> Option<Course> {
        self.store
            .lock()
            .unwrap()
            .courses
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }
}

fn write_failure() -> PortError {
    PortError::Unexpected("simulated write failure".to_string())
}

#[async_trait]
impl DatabaseService for InMemoryDb {
    async fn get_active_term(&self) -> PortResult<Option<Term>> {
        Ok(self.store.lock().unwrap().term.clone())
    }

    async fn list_categories(&self) -> PortResult<Vec<CourseCategory>> {
        let mut categories = self.store.lock().unwrap().categories.clone();
        categories.sort_by_key(|c| c.display_order);
        Ok(categories)
    }

    async fn list_courses(&self) -> PortResult<Vec<Course>> {
        let mut courses = self.store.lock().unwrap().courses.clone();
        courses.sort_by(|a, b| a.subject.cmp(&b.subject).then(a.name.cmp(&b.name)));
        Ok(courses)
    }

    async fn list_open_courses(&self) -> PortResult<Vec<Course>> {
        let mut courses: Vec<Course> = self
            .store
            .lock()
            .unwrap()
            .courses
            .iter()
            .filter(|c| c.is_open())
            .cloned()
            .collect();
        courses.sort_by_key(|c| c.display_order);
        Ok(courses)
    }

    async fn get_courses_by_ids(&self, course_ids: &[Uuid]) -> PortResult<Vec<Course>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .courses
            .iter()
            .filter(|c| course_ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn list_timetable_slots(&self) -> PortResult<Vec<TimetableSlot>> {
        Ok(self.store.lock().unwrap().slots.clone())
    }

    async fn list_tuition_info(&self) -> PortResult<Vec<TuitionInfo>> {
        let mut rows = self.store.lock().unwrap().tuition.clone();
        rows.sort_by_key(|t| t.display_order);
        Ok(rows)
    }

    async fn find_held_course_ids(
        &self,
        student_id: Uuid,
        course_ids: &[Uuid],
    ) -> PortResult<Vec<Uuid>> {
        let store = self.store.lock().unwrap();
        if store.stale_held_lookup {
            return Ok(Vec::new());
        }
        Ok(store
            .enrollments
            .iter()
            .filter(|e| e.student_id == student_id && e.status != EnrollmentStatus::Cancelled)
            .filter_map(|e| e.course_id)
            .filter(|id| course_ids.contains(id))
            .collect())
    }

    async fn insert_enrollments(&self, enrollments: Vec<NewEnrollment>) -> PortResult<usize> {
        let mut store = self.store.lock().unwrap();
        if store.fail_writes {
            return Err(write_failure());
        }
        let live = |student_id: Uuid, course_id: Uuid| {
            store.enrollments.iter().any(|e| {
                e.student_id == student_id
                    && e.course_id == Some(course_id)
                    && e.status != EnrollmentStatus::Cancelled
            })
        };
        if let Some(row) = enrollments
            .iter()
            .find(|row| row.course_id.is_some_and(|id| live(row.student_id, id)))
        {
            return Err(PortError::Conflict(format!(
                "student {} already holds course {:?}",
                row.student_id, row.course_id
            )));
        }
        let count = enrollments.len();
        store.enrollments.extend(enrollments.into_iter().map(|row| Enrollment {
            id: Uuid::new_v4(),
            student_id: row.student_id,
            course_id: row.course_id,
            term_id: row.term_id,
            status: row.status,
            payment_method: Some(row.payment_method),
            payment_status: row.payment_status,
            payment_amount: row.payment_amount,
            payment_due_date: None,
            enrolled_at: Utc::now(),
            confirmed_at: None,
            notes: row.notes,
        }));
        Ok(count)
    }

    async fn list_enrollments_for_student(
        &self,
        student_id: Uuid,
    ) -> PortResult<Vec<EnrollmentWithCourse>> {
        let mut rows: Vec<Enrollment> = self
            .store
            .lock()
            .unwrap()
            .enrollments
            .iter()
            .filter(|e| e.student_id == student_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));
        Ok(rows
            .into_iter()
            .map(|enrollment| EnrollmentWithCourse {
                course: enrollment.course_id.and_then(|id| self.course(id)),
                enrollment,
            })
            .collect())
    }

    async fn list_classroom_assignments(&self) -> PortResult<Vec<ClassroomAssignment>> {
        let assignments = self.store.lock().unwrap().assignments.clone();
        Ok(assignments
            .into_iter()
            .map(|mut a| {
                a.course = self.course(a.course_id);
                a
            })
            .collect())
    }

    async fn list_usage_notes(&self) -> PortResult<Vec<StudentUsageNote>> {
        let mut notes: Vec<StudentUsageNote> = self
            .store
            .lock()
            .unwrap()
            .usage_notes
            .iter()
            .filter(|n| n.is_active)
            .cloned()
            .collect();
        notes.sort_by_key(|n| n.display_order);
        Ok(notes)
    }

    async fn list_instructor_notes(
        &self,
        audiences: &[NoteAudience],
    ) -> PortResult<Vec<InstructorNote>> {
        let mut notes: Vec<InstructorNote> = self
            .store
            .lock()
            .unwrap()
            .instructor_notes
            .iter()
            .filter(|n| audiences.contains(&n.target_audience))
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }

    async fn insert_contact_submission(
        &self,
        submission: NewContactSubmission,
    ) -> PortResult<Uuid> {
        let mut store = self.store.lock().unwrap();
        if store.fail_writes {
            return Err(write_failure());
        }
        let id = Uuid::new_v4();
        store.contacts.push((id, submission));
        Ok(id)
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        identity: &StudentIdentity,
        _expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.store
            .lock()
            .unwrap()
            .sessions
            .insert(session_id.to_string(), identity.clone());
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<StudentIdentity> {
        self.store
            .lock()
            .unwrap()
            .sessions
            .get(session_id)
            .cloned()
            .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.store.lock().unwrap().sessions.remove(session_id);
        Ok(())
    }
}

//=========================================================================================
// Fake Identity Provider
//=========================================================================================

/// Accepts the codes it was seeded with; every other code fails.
#[derive(Default)]
pub struct FakeIdentity {
    pub codes: HashMap<String, StudentIdentity>,
}

impl FakeIdentity {
    pub fn with_code(code: &str, identity: StudentIdentity) -> Arc<Self> {
        let mut codes = HashMap::new();
        codes.insert(code.to_string(), identity);
        Arc::new(Self { codes })
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn exchange_code(&self, code: &str) -> PortResult<StudentIdentity> {
        self.codes.get(code).cloned().ok_or(PortError::Unauthorized)
    }
}

//=========================================================================================
// Fixtures
//=========================================================================================

pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: "postgres://unused".to_string(),
        log_level: tracing::Level::INFO,
        public_origin: "https://portal.example.jp".to_string(),
        cors_origin: "https://portal.example.jp".to_string(),
        development: false,
        allowed_email_domain: SCHOOL_DOMAIN.to_string(),
        identity_url: "https://identity.example.jp".to_string(),
        identity_api_key: "test-key".to_string(),
        run_migrations: false,
        session_ttl_days: 30,
    }
}

pub fn app_with(db: Arc<InMemoryDb>, identity: Arc<FakeIdentity>, config: Config) -> Router {
    web::router(Arc::new(AppState {
        db,
        identity,
        config: Arc::new(config),
    }))
}

pub fn app(db: Arc<InMemoryDb>) -> Router {
    app_with(db, Arc::new(FakeIdentity::default()), test_config())
}

pub fn student(local: &str) -> StudentIdentity {
    StudentIdentity {
        user_id: Uuid::new_v4(),
        email: format!("{}@{}", local, SCHOOL_DOMAIN),
        display_name: Some(local.to_string()),
    }
}

pub fn outsider() -> StudentIdentity {
    StudentIdentity {
        user_id: Uuid::new_v4(),
        email: "someone@gmail.com".to_string(),
        display_name: None,
    }
}

/// Registers a session for `identity` and returns the cookie header value.
pub fn sign_in(store: &mut Store, identity: &StudentIdentity) -> String {
    let id = Uuid::new_v4().to_string();
    store.sessions.insert(id.clone(), identity.clone());
    format!("session={}", id)
}

pub fn term() -> Term {
    Term {
        id: Uuid::new_v4(),
        name: "2025年度 夏期講習".to_string(),
        slug: "2025-summer".to_string(),
        start_date: NaiveDate::from_ymd_opt(2025, 7, 20).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2025, 8, 31).unwrap(),
        enrollment_start: None,
        enrollment_end: None,
        is_active: true,
        display_order: 1,
    }
}

pub fn category(slug: &str, display_order: i32) -> CourseCategory {
    CourseCategory {
        id: Uuid::new_v4(),
        name: slug.to_string(),
        slug: slug.to_string(),
        display_order,
        description: None,
    }
}

pub fn course(name: &str, status: CourseStatus, price: i64, term_id: Option<Uuid>) -> Course {
    Course {
        id: Uuid::new_v4(),
        category_id: Uuid::new_v4(),
        name: name.to_string(),
        subject: "英語".to_string(),
        description: String::new(),
        instructor_name: Some("佐藤".to_string()),
        course_type: CourseType::Group,
        day_of_week: Some("月".to_string()),
        start_time: Some("15:30:00".to_string()),
        end_time: Some("16:50:00".to_string()),
        classroom: Some("A".to_string()),
        capacity: 20,
        price,
        target_grade: Some("高3".to_string()),
        term_id,
        status,
        display_order: 0,
    }
}

pub fn slot_for(course: &Course, day: &str, period: i32) -> TimetableSlot {
    TimetableSlot {
        id: Uuid::new_v4(),
        course_id: course.id,
        day_of_week: day.to_string(),
        period,
        start_time: "15:30:00".to_string(),
        end_time: "16:50:00".to_string(),
        classroom: "A".to_string(),
        course: Some(SlotCourse {
            name: course.name.clone(),
            instructor_name: course.instructor_name.clone(),
            target_grade: course.target_grade.clone(),
            subject: course.subject.clone(),
            course_type: course.course_type,
            category_id: course.category_id,
            price: course.price,
            status: course.status,
            term_id: course.term_id,
        }),
    }
}

pub fn held_enrollment(student_id: Uuid, course: &Course, status: EnrollmentStatus) -> Enrollment {
    Enrollment {
        id: Uuid::new_v4(),
        student_id,
        course_id: Some(course.id),
        term_id: course.term_id,
        status,
        payment_method: None,
        payment_status: PaymentStatus::Unpaid,
        payment_amount: course.price,
        payment_due_date: None,
        enrolled_at: Utc::now(),
        confirmed_at: None,
        notes: None,
    }
}

//=========================================================================================
// Request Helpers
//=========================================================================================

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn error(&self) -> &str {
        self.body["error"].as_str().unwrap_or_default()
    }

    pub fn location(&self) -> &str {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    pub fn set_cookie(&self) -> &str {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

pub async fn send(app: Router, request: Request<Body>) -> TestResponse {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn request(method: Method, uri: &str, body: Option<String>, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .unwrap()
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    request(Method::GET, uri, None, cookie)
}

pub fn post_json(uri: &str, body: &Value, cookie: Option<&str>) -> Request<Body> {
    request(Method::POST, uri, Some(body.to_string()), cookie)
}
