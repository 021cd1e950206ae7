//! crates/tutoring_portal_core/src/catalog.rs
//!
//! Read-side shaping of catalog rows: active-term filtering, grouping by
//! category and subject, the timetable grid and the payment summary.
//! Everything here works on small in-memory lists fetched per request.

use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::{
    ClassroomAssignment, Course, CourseCategory, EnrollmentWithCourse, PaymentStatus, Term,
    TimetableSlot,
};
use crate::schedule::{
    format_schedule, Period, DAYS_OF_WEEK, SATURDAY, SATURDAY_PERIODS, WEEKDAYS, WEEKDAY_PERIODS,
};

/// Subjects in catalog display order.
pub const SUBJECTS: [&str; 5] = ["英語", "数学", "国語", "理科", "社会"];

/// Category slug used when a course's category is unknown.
pub const DEFAULT_CATEGORY_SLUG: &str = "general";

//=========================================================================================
// Active Term Filtering
//=========================================================================================

/// Keeps rows whose course belongs to the active term. Without an active term
/// nothing is filtered.
fn keep_for_term<T>(rows: Vec<T>, term: Option<&Term>, term_of: impl Fn(&T) -> Option<Uuid>) -> Vec<T> {
    match term {
        Some(term) => rows
            .into_iter()
            .filter(|row| term_of(row) == Some(term.id))
            .collect(),
        None => rows,
    }
}

pub fn slots_for_term(slots: Vec<TimetableSlot>, term: Option<&Term>) -> Vec<TimetableSlot> {
    keep_for_term(slots, term, |s| s.course.as_ref().and_then(|c| c.term_id))
}

pub fn enrollments_for_term(
    enrollments: Vec<EnrollmentWithCourse>,
    term: Option<&Term>,
) -> Vec<EnrollmentWithCourse> {
    keep_for_term(enrollments, term, |e| e.course.as_ref().and_then(|c| c.term_id))
}

pub fn assignments_for_term(
    assignments: Vec<ClassroomAssignment>,
    term: Option<&Term>,
) -> Vec<ClassroomAssignment> {
    keep_for_term(assignments, term, |a| a.course.as_ref().and_then(|c| c.term_id))
}

//=========================================================================================
// Course Catalog
//=========================================================================================

/// A course as listed on the catalog page, with its schedule rendered.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogCourse {
    #[serde(flatten)]
    pub course: Course,
    pub schedule: String,
}

impl From<&Course> for CatalogCourse {
    fn from(course: &Course) -> Self {
        CatalogCourse {
            schedule: format_schedule(
                course.day_of_week.as_deref(),
                course.start_time.as_deref(),
                course.end_time.as_deref(),
            ),
            course: course.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectGroup {
    pub subject: String,
    pub courses: Vec<CatalogCourse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryGroup {
    pub category: CourseCategory,
    pub subjects: Vec<SubjectGroup>,
}

/// Groups courses by category and then by subject. Empty groups are kept so
/// the caller can show a placeholder for them.
pub fn group_catalog(categories: &[CourseCategory], courses: &[Course]) -> Vec<CategoryGroup> {
    categories
        .iter()
        .map(|category| CategoryGroup {
            category: category.clone(),
            subjects: SUBJECTS
                .iter()
                .map(|subject| SubjectGroup {
                    subject: subject.to_string(),
                    courses: courses
                        .iter()
                        .filter(|c| c.category_id == category.id && c.subject == *subject)
                        .map(CatalogCourse::from)
                        .collect(),
                })
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenCourseGroup {
    pub category: CourseCategory,
    pub courses: Vec<Course>,
}

/// Open courses per category, for the first step of the group wizard.
pub fn group_open_courses(categories: &[CourseCategory], courses: &[Course]) -> Vec<OpenCourseGroup> {
    categories
        .iter()
        .map(|category| OpenCourseGroup {
            category: category.clone(),
            courses: courses
                .iter()
                .filter(|c| c.is_open() && c.category_id == category.id)
                .cloned()
                .collect(),
        })
        .collect()
}

//=========================================================================================
// Timetable
//=========================================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum School {
    #[default]
    Senior,
    Junior,
}

impl School {
    /// Grades shown on the tab, highest first.
    pub fn grades(&self) -> &'static [&'static str] {
        match self {
            School::Senior => &["高3", "高2", "高1"],
            School::Junior => &["中3", "中2", "中1"],
        }
    }
}

/// Category slugs shown for a grade.
pub fn categories_for_grade(school: School, grade: &str) -> &'static [&'static str] {
    match school {
        School::Junior => &["junior"],
        School::Senior => match grade {
            "高2" => &["general", "recommendation", "ryugata"],
            _ => &["general", "recommendation"],
        },
    }
}

pub fn category_label(slug: &str) -> &str {
    match slug {
        "general" => "一般",
        "recommendation" => "推薦",
        "ryugata" => "留型",
        "junior" => "中学",
        other => other,
    }
}

/// The slug of a category id, falling back to `general`.
pub fn category_slug<'a>(categories: &'a [CourseCategory], category_id: Uuid) -> &'a str {
    categories
        .iter()
        .find(|c| c.id == category_id)
        .map(|c| c.slug.as_str())
        .unwrap_or(DEFAULT_CATEGORY_SLUG)
}

/// Slots whose course targets `grade` and belongs to one of `slugs`.
pub fn filter_slots<'a>(
    slots: &'a [TimetableSlot],
    categories: &[CourseCategory],
    grade: &str,
    slugs: &[&str],
) -> Vec<&'a TimetableSlot> {
    let category_ids: Vec<Uuid> = categories
        .iter()
        .filter(|c| slugs.contains(&c.slug.as_str()))
        .map(|c| c.id)
        .collect();

    slots
        .iter()
        .filter(|slot| match &slot.course {
            Some(course) => {
                course.target_grade.as_deref() == Some(grade)
                    && category_ids.contains(&course.category_id)
            }
            None => false,
        })
        .collect()
}

pub fn slots_at<'a>(slots: &[&'a TimetableSlot], day: &str, period: i32) -> Vec<&'a TimetableSlot> {
    slots
        .iter()
        .filter(|s| s.day_of_week == day && s.period == period)
        .copied()
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct GridCell {
    pub day: String,
    pub period: u8,
    pub slots: Vec<TimetableSlot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GridRow {
    pub period: Period,
    pub cells: Vec<GridCell>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryTimetable {
    pub slug: String,
    pub label: String,
    pub weekday: Vec<GridRow>,
    pub saturday: Vec<GridRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeTimetable {
    pub grade: String,
    pub categories: Vec<CategoryTimetable>,
}

fn build_rows(slots: &[&TimetableSlot], days: &[&str], periods: &[Period]) -> Vec<GridRow> {
    periods
        .iter()
        .map(|period| GridRow {
            period: *period,
            cells: days
                .iter()
                .map(|day| GridCell {
                    day: day.to_string(),
                    period: period.number,
                    slots: slots_at(slots, day, i32::from(period.number))
                        .into_iter()
                        .cloned()
                        .collect(),
                })
                .collect(),
        })
        .collect()
}

/// Builds the weekday and Saturday grids for every grade of a school tab.
pub fn build_timetable(
    school: School,
    slots: &[TimetableSlot],
    categories: &[CourseCategory],
) -> Vec<GradeTimetable> {
    school
        .grades()
        .iter()
        .map(|grade| GradeTimetable {
            grade: grade.to_string(),
            categories: categories_for_grade(school, grade)
                .iter()
                .map(|slug| {
                    let filtered = filter_slots(slots, categories, grade, &[*slug]);
                    CategoryTimetable {
                        slug: slug.to_string(),
                        label: category_label(slug).to_string(),
                        weekday: build_rows(&filtered, &WEEKDAYS, &WEEKDAY_PERIODS),
                        saturday: build_rows(&filtered, &[SATURDAY], &SATURDAY_PERIODS),
                    }
                })
                .collect(),
        })
        .collect()
}

//=========================================================================================
// Student Area
//=========================================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DayAssignments {
    pub day: String,
    pub assignments: Vec<ClassroomAssignment>,
}

/// Groups classroom assignments by day, 月 through 土. Rows on other days are dropped.
pub fn assignments_by_day(assignments: &[ClassroomAssignment]) -> Vec<DayAssignments> {
    DAYS_OF_WEEK
        .iter()
        .map(|day| DayAssignments {
            day: day.to_string(),
            assignments: assignments
                .iter()
                .filter(|a| a.day_of_week == *day)
                .cloned()
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaymentSummary {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
}

/// Sums `payment_amount` overall and per payment status.
pub fn summarize_payments(enrollments: &[EnrollmentWithCourse]) -> PaymentSummary {
    let mut summary = PaymentSummary::default();
    for status in PaymentStatus::ALL {
        summary.by_status.insert(status.as_str().to_string(), 0);
    }
    for e in enrollments {
        summary.total += e.enrollment.payment_amount;
        *summary
            .by_status
            .entry(e.enrollment.payment_status.as_str().to_string())
            .or_default() += e.enrollment.payment_amount;
    }
    summary
}
