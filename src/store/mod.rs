//! Persistence for users, courses, enrollments, live sessions and attendance.
//!
//! Every operation that must not race (enrollment, first-admin claim, course revisions,
//! attendance) is a single conditional write in each backend.

use std::ops::Deref;
use std::sync::Arc;

use uuid::Uuid;

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use crate::data::attendance::{AttendanceLog, AttendanceOutcome, AttendanceRecord};
use crate::data::course::Course;
use crate::data::enrollment::{EnrollOutcome, Enrollment};
use crate::data::session::LiveSession;
use crate::data::user::{LessonProgress, User};
use crate::error::StoreError;
use crate::role::Role;

#[rocket::async_trait]
pub trait Store: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    /// Fails with [`StoreError::Conflict`] when a user with the same id exists.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn update_profile(
        &self,
        id: Uuid,
        display_name: &str,
    ) -> Result<Option<User>, StoreError>;
    async fn set_user_role(
        &self,
        id: Uuid,
        role: Role,
        changed_by: Uuid,
    ) -> Result<Option<User>, StoreError>;
    /// Removes the user together with their enrollments and attendance.
    async fn delete_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    /// Promotes `id` to admin if nobody was ever promoted this way and no admin exists.
    async fn claim_first_admin(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn set_lesson_progress(
        &self,
        user: Uuid,
        course: Uuid,
        lesson: Uuid,
        progress: LessonProgress,
    ) -> Result<Option<User>, StoreError>;

    async fn insert_course(&self, course: &Course) -> Result<(), StoreError>;
    async fn get_course(&self, id: Uuid) -> Result<Option<Course>, StoreError>;
    async fn list_courses(&self) -> Result<Vec<Course>, StoreError>;
    /// Replaces the stored course if its revision is still `expected_revision`.
    ///
    /// Returns `Ok(false)` when the course doesn't exist and [`StoreError::Conflict`] when it was
    /// modified in the meantime.
    async fn replace_course(
        &self,
        course: &Course,
        expected_revision: u64,
    ) -> Result<bool, StoreError>;
    /// Removes the course together with its enrollments, sessions and attendance.
    async fn delete_course(&self, id: Uuid) -> Result<Option<Course>, StoreError>;

    /// Stores `enrollment` unless the pair is already enrolled or the course is no longer
    /// published. Never leaves an enrollment behind for a deleted course.
    async fn enroll(&self, enrollment: &Enrollment) -> Result<EnrollOutcome, StoreError>;
    async fn get_enrollment(
        &self,
        course: Uuid,
        user: Uuid,
    ) -> Result<Option<Enrollment>, StoreError>;
    async fn list_enrollments(&self) -> Result<Vec<Enrollment>, StoreError>;
    async fn enrollments_for_course(&self, course: Uuid) -> Result<Vec<Enrollment>, StoreError>;
    async fn enrollments_for_user(&self, user: Uuid) -> Result<Vec<Enrollment>, StoreError>;

    /// Replaces the schedule, dropping attendance of sessions that are gone and recomputing the
    /// session progress of the course's students.
    async fn replace_sessions(
        &self,
        course: Uuid,
        sessions: &[LiveSession],
    ) -> Result<(), StoreError>;
    async fn sessions_for_course(&self, course: Uuid) -> Result<Vec<LiveSession>, StoreError>;

    /// Appends `record` unless the log already holds one for the same session or the session
    /// isn't scheduled, and updates the user's session progress with it.
    async fn record_attendance(
        &self,
        course: Uuid,
        user: Uuid,
        record: &AttendanceRecord,
    ) -> Result<AttendanceOutcome, StoreError>;
    async fn attendance_log(
        &self,
        course: Uuid,
        user: Uuid,
    ) -> Result<Option<AttendanceLog>, StoreError>;
    async fn attendance_for_course(&self, course: Uuid) -> Result<Vec<AttendanceLog>, StoreError>;
    async fn attendance_for_user(&self, user: Uuid) -> Result<Vec<AttendanceLog>, StoreError>;
}

pub(crate) fn sorted_by_enrollment(mut enrollments: Vec<Enrollment>) -> Vec<Enrollment> {
    enrollments.sort_by(|a, b| a.enrolled_at.cmp(&b.enrolled_at));
    enrollments
}

/// Shared store managed by Rocket.
#[derive(Clone)]
pub struct StoreHandle(Arc<dyn Store>);

impl StoreHandle {
    pub fn new(store: impl Store + 'static) -> StoreHandle {
        StoreHandle(Arc::new(store))
    }

    pub async fn enrolled_students(&self, course: Uuid) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .enrollments_for_course(course)
            .await?
            .into_iter()
            .map(|it| it.user_id)
            .collect())
    }

    pub async fn enrolled_courses(&self, user: Uuid) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .enrollments_for_user(user)
            .await?
            .into_iter()
            .map(|it| it.course_id)
            .collect())
    }

    pub async fn is_enrolled(&self, course: Uuid, user: Uuid) -> Result<bool, StoreError> {
        Ok(self.get_enrollment(course, user).await?.is_some())
    }
}

impl Deref for StoreHandle {
    type Target = dyn Store;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StoreHandle({})", self.0.backend_tag())
    }
}
