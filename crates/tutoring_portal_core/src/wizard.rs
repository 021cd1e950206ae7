//! crates/tutoring_portal_core/src/wizard.rs
//!
//! The enrollment wizards. Selections accumulate across steps, survive the
//! login redirect as a serialized [`WizardDraft`], and are reconciled against
//! current course availability before they are submitted.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;
use uuid::Uuid;

use crate::domain::{Course, CourseStatus, CourseType, PaymentMethod};
use crate::enrollment::EnrollPayload;
use crate::schedule::{sort_slots, IndividualSlot};

pub const STUDENT_LOGIN_PATH: &str = "/auth/student-login";

/// Builds the login URL that brings the user back to `next` afterwards.
pub fn login_url(next: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(next.as_bytes()).collect();
    format!("{STUDENT_LOGIN_PATH}?next={encoded}")
}

//=========================================================================================
// Course Selection and Reconciliation
//=========================================================================================

/// The set of course ids picked in the timetable or on the first wizard step,
/// kept in the order they were picked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSelection {
    course_ids: Vec<Uuid>,
}

impl CourseSelection {
    pub fn new(course_ids: impl IntoIterator<Item = Uuid>) -> Self {
        let mut selection = Self::default();
        for id in course_ids {
            if !selection.contains(id) {
                selection.course_ids.push(id);
            }
        }
        selection
    }

    /// Decodes the `courses=a,b` query value. Blank or malformed ids are dropped.
    pub fn from_query(raw: &str) -> Self {
        Self::new(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|s| Uuid::parse_str(s).ok()),
        )
    }

    pub fn to_query(&self) -> String {
        self.course_ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Adds the course if absent, removes it otherwise.
    pub fn toggle(&mut self, course_id: Uuid) {
        if let Some(pos) = self.course_ids.iter().position(|id| *id == course_id) {
            self.course_ids.remove(pos);
        } else {
            self.course_ids.push(course_id);
        }
    }

    pub fn contains(&self, course_id: Uuid) -> bool {
        self.course_ids.contains(&course_id)
    }

    pub fn is_empty(&self) -> bool {
        self.course_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.course_ids.len()
    }

    pub fn ids(&self) -> &[Uuid] {
        &self.course_ids
    }

    /// Drops ids that reconciliation found unavailable.
    pub fn retain_available(&mut self, reconciliation: &Reconciliation) {
        self.course_ids
            .retain(|id| reconciliation.available.iter().any(|c| c.id == *id));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    Missing,
    Draft,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableCourse {
    pub course_id: Uuid,
    pub reason: UnavailableReason,
}

/// A selection checked against the course rows currently on the server.
#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub available: Vec<Course>,
    pub unavailable: Vec<UnavailableCourse>,
    pub total_price: i64,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.unavailable.is_empty()
    }
}

/// Splits the selection into courses that can still be booked and those that
/// have disappeared or are no longer open.
pub fn reconcile(selection: &CourseSelection, courses: &[Course]) -> Reconciliation {
    let mut available = Vec::new();
    let mut unavailable = Vec::new();

    for id in selection.ids() {
        let reason = match courses.iter().find(|c| c.id == *id) {
            Some(course) if course.is_open() => {
                available.push(course.clone());
                continue;
            }
            Some(course) if course.status == CourseStatus::Draft => UnavailableReason::Draft,
            Some(_) => UnavailableReason::Closed,
            None => UnavailableReason::Missing,
        };
        unavailable.push(UnavailableCourse {
            course_id: *id,
            reason,
        });
    }

    let total_price = available.iter().map(|c| c.price).sum();
    Reconciliation {
        available,
        unavailable,
        total_price,
    }
}

//=========================================================================================
// Drafts
//=========================================================================================

/// Wizard state persisted across the login redirect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WizardDraft {
    Group {
        course_ids: Vec<Uuid>,
        #[serde(default)]
        payment_method: PaymentMethod,
    },
    Individual {
        slots: Vec<IndividualSlot>,
        subjects: Vec<String>,
        format: CourseType,
        #[serde(default)]
        friend_names: [String; 2],
        #[serde(default)]
        payment_method: PaymentMethod,
    },
}

impl WizardDraft {
    /// Where the wizard resumes once the user has signed in.
    pub fn restore_path(&self) -> String {
        match self {
            WizardDraft::Group {
                course_ids,
                payment_method,
            } => {
                let selection = CourseSelection::new(course_ids.iter().copied());
                let query: String = form_urlencoded::Serializer::new(String::new())
                    .append_pair("courses", &selection.to_query())
                    .append_pair("payment", payment_method.as_str())
                    .finish();
                format!("/apply/payment?{query}")
            }
            WizardDraft::Individual { .. } => "/apply/individual?restore=true".to_string(),
        }
    }

    pub fn login_url(&self) -> String {
        login_url(&self.restore_path())
    }
}

/// Result of asking a wizard to move forward.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance<S> {
    Moved(S),
    /// The current step is incomplete.
    Blocked,
    /// The next step needs a signed-in user; persist the draft and send the
    /// user to `login_url`.
    LoginRequired { draft: WizardDraft, login_url: String },
}

//=========================================================================================
// Group Wizard
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStep {
    Courses,
    Payment,
    Confirm,
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupWizard {
    pub step: GroupStep,
    pub selection: CourseSelection,
    pub payment_method: PaymentMethod,
}

impl Default for GroupWizard {
    fn default() -> Self {
        Self::new(CourseSelection::default())
    }
}

impl GroupWizard {
    pub fn new(selection: CourseSelection) -> Self {
        Self {
            step: GroupStep::Courses,
            selection,
            payment_method: PaymentMethod::default(),
        }
    }

    pub fn can_proceed(&self) -> bool {
        match self.step {
            GroupStep::Courses => !self.selection.is_empty(),
            GroupStep::Payment => true,
            GroupStep::Confirm | GroupStep::Complete => false,
        }
    }

    pub fn draft(&self) -> WizardDraft {
        WizardDraft::Group {
            course_ids: self.selection.ids().to_vec(),
            payment_method: self.payment_method,
        }
    }

    /// Moves to the next step. Leaving course selection requires a session.
    pub fn next(&mut self, authenticated: bool) -> Advance<GroupStep> {
        if !self.can_proceed() {
            return Advance::Blocked;
        }
        let target = match self.step {
            GroupStep::Courses => GroupStep::Payment,
            GroupStep::Payment => GroupStep::Confirm,
            GroupStep::Confirm | GroupStep::Complete => return Advance::Blocked,
        };
        if target == GroupStep::Payment && !authenticated {
            let draft = self.draft();
            let login_url = draft.login_url();
            return Advance::LoginRequired { draft, login_url };
        }
        self.step = target;
        Advance::Moved(target)
    }

    pub fn back(&mut self) {
        self.step = match self.step {
            GroupStep::Courses | GroupStep::Payment => GroupStep::Courses,
            GroupStep::Confirm => GroupStep::Payment,
            GroupStep::Complete => GroupStep::Complete,
        };
    }

    /// Resumes a group draft on the payment step. Returns `None` for other drafts.
    pub fn restore(draft: &WizardDraft) -> Option<Self> {
        match draft {
            WizardDraft::Group {
                course_ids,
                payment_method,
            } => Some(Self {
                step: GroupStep::Payment,
                selection: CourseSelection::new(course_ids.iter().copied()),
                payment_method: *payment_method,
            }),
            WizardDraft::Individual { .. } => None,
        }
    }

    pub fn submission(&self) -> EnrollPayload {
        EnrollPayload {
            course_ids: Some(self.selection.ids().iter().map(Uuid::to_string).collect()),
            payment_method: Some(self.payment_method.as_str().to_string()),
            ..Default::default()
        }
    }

    pub fn complete(&mut self) {
        if self.step == GroupStep::Confirm {
            self.step = GroupStep::Complete;
        }
    }
}

//=========================================================================================
// Individual Tutoring Wizard
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndividualStep {
    TimeSlot,
    Subject,
    Format,
    Payment,
    Confirm,
    Complete,
}

impl IndividualStep {
    pub const ALL: [IndividualStep; 6] = [
        IndividualStep::TimeSlot,
        IndividualStep::Subject,
        IndividualStep::Format,
        IndividualStep::Payment,
        IndividualStep::Confirm,
        IndividualStep::Complete,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn label(&self) -> &'static str {
        match self {
            IndividualStep::TimeSlot => "時間帯",
            IndividualStep::Subject => "教科",
            IndividualStep::Format => "形態",
            IndividualStep::Payment => "支払い",
            IndividualStep::Confirm => "確認",
            IndividualStep::Complete => "完了",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndividualWizard {
    pub step: IndividualStep,
    pub slots: Vec<IndividualSlot>,
    pub subjects: Vec<String>,
    pub format: CourseType,
    pub friend_names: [String; 2],
    pub payment_method: PaymentMethod,
}

impl Default for IndividualWizard {
    fn default() -> Self {
        Self {
            step: IndividualStep::TimeSlot,
            slots: Vec::new(),
            subjects: Vec::new(),
            format: CourseType::Individual1on1,
            friend_names: Default::default(),
            payment_method: PaymentMethod::default(),
        }
    }
}

impl IndividualWizard {
    /// Starts with slots already picked in the timetable browser. Invalid
    /// slots are ignored.
    pub fn with_slots(slots: impl IntoIterator<Item = IndividualSlot>) -> Self {
        let mut wizard = Self::default();
        for slot in slots {
            if slot.validate().is_ok() && !wizard.has_slot(&slot) {
                wizard.slots.push(slot);
            }
        }
        wizard
    }

    pub fn has_slot(&self, slot: &IndividualSlot) -> bool {
        self.slots.contains(slot)
    }

    /// Selects or deselects a slot. Returns `false` if the slot does not exist.
    pub fn toggle_slot(&mut self, slot: IndividualSlot) -> bool {
        if slot.validate().is_err() {
            return false;
        }
        if let Some(pos) = self.slots.iter().position(|s| *s == slot) {
            self.slots.remove(pos);
        } else {
            self.slots.push(slot);
        }
        true
    }

    /// Selected slots in day/period order.
    pub fn sorted_slots(&self) -> Vec<IndividualSlot> {
        let mut slots = self.slots.clone();
        sort_slots(&mut slots);
        slots
    }

    pub fn toggle_subject(&mut self, subject: &str) {
        if let Some(pos) = self.subjects.iter().position(|s| s == subject) {
            self.subjects.remove(pos);
        } else {
            self.subjects.push(subject.to_string());
        }
    }

    /// Sets the tutoring format. Group courses are not a valid choice here.
    pub fn set_format(&mut self, format: CourseType) -> bool {
        if !format.is_individual() {
            return false;
        }
        self.format = format;
        true
    }

    pub fn set_friend_name(&mut self, index: usize, name: &str) {
        if let Some(slot) = self.friend_names.get_mut(index) {
            *slot = name.to_string();
        }
    }

    /// Companion names the current format actually uses, blank ones removed.
    pub fn companions(&self) -> Vec<String> {
        self.friend_names
            .iter()
            .take(self.format.companions())
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    }

    pub fn can_proceed(&self) -> bool {
        match self.step {
            IndividualStep::TimeSlot => !self.slots.is_empty(),
            IndividualStep::Subject => !self.subjects.is_empty(),
            IndividualStep::Format => self.companions().len() == self.format.companions(),
            IndividualStep::Payment => true,
            IndividualStep::Confirm | IndividualStep::Complete => false,
        }
    }

    pub fn draft(&self) -> WizardDraft {
        WizardDraft::Individual {
            slots: self.slots.clone(),
            subjects: self.subjects.clone(),
            format: self.format,
            friend_names: self.friend_names.clone(),
            payment_method: self.payment_method,
        }
    }

    /// Moves to the next step. Entering confirmation requires a session.
    pub fn next(&mut self, authenticated: bool) -> Advance<IndividualStep> {
        if !self.can_proceed() {
            return Advance::Blocked;
        }
        let target = match self.step {
            IndividualStep::TimeSlot => IndividualStep::Subject,
            IndividualStep::Subject => IndividualStep::Format,
            IndividualStep::Format => IndividualStep::Payment,
            IndividualStep::Payment => IndividualStep::Confirm,
            IndividualStep::Confirm | IndividualStep::Complete => return Advance::Blocked,
        };
        if target == IndividualStep::Confirm && !authenticated {
            let draft = self.draft();
            let login_url = draft.login_url();
            return Advance::LoginRequired { draft, login_url };
        }
        self.step = target;
        Advance::Moved(target)
    }

    pub fn back(&mut self) {
        self.step = match self.step {
            IndividualStep::TimeSlot | IndividualStep::Subject => IndividualStep::TimeSlot,
            IndividualStep::Format => IndividualStep::Subject,
            IndividualStep::Payment => IndividualStep::Format,
            IndividualStep::Confirm => IndividualStep::Payment,
            IndividualStep::Complete => IndividualStep::Complete,
        };
    }

    /// Resumes an individual draft on the confirmation step. Returns `None`
    /// for other drafts.
    pub fn restore(draft: &WizardDraft) -> Option<Self> {
        match draft {
            WizardDraft::Individual {
                slots,
                subjects,
                format,
                friend_names,
                payment_method,
            } => {
                let mut wizard = Self::with_slots(slots.iter().cloned());
                wizard.subjects = subjects.clone();
                if !wizard.set_format(*format) {
                    wizard.format = CourseType::Individual1on1;
                }
                wizard.friend_names = friend_names.clone();
                wizard.payment_method = *payment_method;
                wizard.step = IndividualStep::Confirm;
                Some(wizard)
            }
            WizardDraft::Group { .. } => None,
        }
    }

    /// The body to POST to `/api/enroll`.
    pub fn submission(&self) -> EnrollPayload {
        EnrollPayload {
            kind: Some("individual".to_string()),
            slots: Some(self.sorted_slots()),
            subjects: Some(self.subjects.clone()),
            course_count: u32::try_from(self.subjects.len()).ok(),
            format: Some(self.format.as_str().to_string()),
            friend_names: Some(self.companions()),
            payment_method: Some(self.payment_method.as_str().to_string()),
            ..Default::default()
        }
    }

    pub fn complete(&mut self) {
        if self.step == IndividualStep::Confirm {
            self.step = IndividualStep::Complete;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrollment::EnrollmentRequest;

    fn course(status: CourseStatus, price: i64) -> Course {
        Course {
            id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            name: "英語長文".to_string(),
            subject: "英語".to_string(),
            description: String::new(),
            instructor_name: None,
            course_type: CourseType::Group,
            day_of_week: Some("月".to_string()),
            start_time: None,
            end_time: None,
            classroom: None,
            capacity: 15,
            price,
            target_grade: Some("高3".to_string()),
            term_id: None,
            status,
            display_order: 0,
        }
    }

    #[test]
    fn toggling_twice_removes_the_course() {
        let id = Uuid::new_v4();
        let mut selection = CourseSelection::default();
        selection.toggle(id);
        assert!(selection.contains(id));
        selection.toggle(id);
        assert!(selection.is_empty());
    }

    #[test]
    fn query_round_trip_drops_garbage() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let selection = CourseSelection::from_query(&format!("{a},,not-a-uuid,{b},{a}"));
        assert_eq!(selection.ids(), &[a, b]);
        assert_eq!(selection.to_query(), format!("{a},{b}"));
    }

    #[test]
    fn reconciliation_flags_stale_selections() {
        let open = course(CourseStatus::Open, 11_000);
        let closed = course(CourseStatus::Closed, 11_000);
        let draft = course(CourseStatus::Draft, 11_000);
        let missing = Uuid::new_v4();
        let mut selection = CourseSelection::new([open.id, closed.id, draft.id, missing]);

        let result = reconcile(&selection, &[open.clone(), closed.clone(), draft.clone()]);
        assert!(!result.is_clean());
        assert_eq!(result.available.len(), 1);
        assert_eq!(result.total_price, 11_000);
        let reasons: Vec<_> = result.unavailable.iter().map(|u| u.reason).collect();
        assert_eq!(
            reasons,
            vec![
                UnavailableReason::Closed,
                UnavailableReason::Draft,
                UnavailableReason::Missing
            ]
        );

        selection.retain_available(&result);
        assert_eq!(selection.ids(), &[open.id]);
    }

    #[test]
    fn group_wizard_asks_for_login_after_selection() {
        let id = Uuid::new_v4();
        let mut wizard = GroupWizard::default();
        assert_eq!(wizard.next(false), Advance::Blocked);

        wizard.selection.toggle(id);
        match wizard.next(false) {
            Advance::LoginRequired { draft, login_url } => {
                assert_eq!(wizard.step, GroupStep::Courses);
                assert!(login_url.starts_with("/auth/student-login?next=%2Fapply%2Fpayment"));
                let restored = GroupWizard::restore(&draft).unwrap();
                assert_eq!(restored.step, GroupStep::Payment);
                assert_eq!(restored.selection.ids(), &[id]);
            }
            other => panic!("expected login redirect, got {other:?}"),
        }

        assert_eq!(wizard.next(true), Advance::Moved(GroupStep::Payment));
        assert_eq!(wizard.next(true), Advance::Moved(GroupStep::Confirm));
        assert_eq!(wizard.next(true), Advance::Blocked);
        wizard.complete();
        assert_eq!(wizard.step, GroupStep::Complete);
    }

    #[test]
    fn group_submission_validates() {
        let id = Uuid::new_v4();
        let mut wizard = GroupWizard::new(CourseSelection::new([id]));
        wizard.payment_method = PaymentMethod::AccountTransferInstallment;
        match wizard.submission().validate().unwrap() {
            EnrollmentRequest::Group(req) => {
                assert_eq!(req.course_ids, vec![id]);
                assert_eq!(req.payment_method, PaymentMethod::AccountTransferInstallment);
            }
            other => panic!("expected group request, got {other:?}"),
        }
    }

    #[test]
    fn individual_wizard_gates_each_step() {
        let mut wizard = IndividualWizard::default();
        assert_eq!(wizard.next(true), Advance::Blocked);

        assert!(!wizard.toggle_slot(IndividualSlot::new("水", "4限")));
        assert!(wizard.toggle_slot(IndividualSlot::new("水", "2限")));
        assert_eq!(wizard.next(true), Advance::Moved(IndividualStep::Subject));
        assert_eq!(wizard.next(true), Advance::Blocked);

        wizard.toggle_subject("数学");
        assert_eq!(wizard.next(true), Advance::Moved(IndividualStep::Format));

        assert!(!wizard.set_format(CourseType::Group));
        assert!(wizard.set_format(CourseType::Individual1on3));
        wizard.set_friend_name(0, "田中");
        assert_eq!(wizard.next(true), Advance::Blocked);
        wizard.set_friend_name(1, "高橋");
        assert_eq!(wizard.next(true), Advance::Moved(IndividualStep::Payment));

        wizard.back();
        assert_eq!(wizard.step, IndividualStep::Format);
        wizard.back();
        wizard.back();
        wizard.back();
        assert_eq!(wizard.step, IndividualStep::TimeSlot);
    }

    #[test]
    fn individual_draft_survives_login_redirect() {
        let mut wizard = IndividualWizard::with_slots([
            IndividualSlot::new("土", "4限"),
            IndividualSlot::new("月", "1限"),
        ]);
        wizard.toggle_subject("英語");
        wizard.set_format(CourseType::Individual1on2);
        wizard.set_friend_name(0, "伊藤");
        wizard.set_friend_name(1, "使われない");
        wizard.payment_method = PaymentMethod::AccountTransferLump;
        wizard.step = IndividualStep::Payment;

        let (draft, login_url) = match wizard.next(false) {
            Advance::LoginRequired { draft, login_url } => (draft, login_url),
            other => panic!("expected login redirect, got {other:?}"),
        };
        assert_eq!(
            login_url,
            "/auth/student-login?next=%2Fapply%2Findividual%3Frestore%3Dtrue"
        );

        let json = serde_json::to_string(&draft).unwrap();
        let decoded: WizardDraft = serde_json::from_str(&json).unwrap();
        let restored = IndividualWizard::restore(&decoded).unwrap();
        assert_eq!(restored.step, IndividualStep::Confirm);
        assert_eq!(restored.slots, wizard.slots);
        assert_eq!(restored.payment_method, PaymentMethod::AccountTransferLump);
        assert!(GroupWizard::restore(&decoded).is_none());

        let payload = restored.submission();
        assert_eq!(payload.friend_names, Some(vec!["伊藤".to_string()]));
        let slots = payload.slots.clone().unwrap();
        assert_eq!(slots[0], IndividualSlot::new("月", "1限"));
        match payload.validate().unwrap() {
            EnrollmentRequest::Individual(req) => assert_eq!(req.slots.len(), 2),
            other => panic!("expected individual request, got {other:?}"),
        }
    }

    #[test]
    fn step_labels_follow_wizard_order() {
        let labels: Vec<_> = IndividualStep::ALL.iter().map(IndividualStep::label).collect();
        assert_eq!(labels, vec!["時間帯", "教科", "形態", "支払い", "確認", "完了"]);
        assert_eq!(IndividualStep::Confirm.index(), 4);
    }
}
