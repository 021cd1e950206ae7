pub mod catalog;
pub mod domain;
pub mod enrollment;
pub mod ports;
pub mod schedule;
pub mod validation;
pub mod wizard;

pub use domain::{
    AuthSession, ClassroomAssignment, ContactCategory, ContactStatus, Course, CourseCategory,
    CourseStatus, CourseType, Enrollment, EnrollmentStatus, EnrollmentWithCourse, InstructorNote,
    NewContactSubmission, NewEnrollment, NoteAudience, PaymentMethod, PaymentStatus, SlotCourse,
    StudentIdentity, StudentUsageNote, Term, TimetableSlot, TuitionInfo,
};
pub use enrollment::{EnrollPayload, EnrollmentError, EnrollmentRequest};
pub use ports::{DatabaseService, IdentityProvider, PortError, PortResult};
pub use schedule::IndividualSlot;
pub use wizard::{CourseSelection, GroupWizard, IndividualWizard, WizardDraft};
