use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{sorted_by_enrollment, Store};
use crate::data::attendance::{AttendanceLog, AttendanceOutcome, AttendanceRecord};
use crate::data::course::Course;
use crate::data::enrollment::{enrollment_id, EnrollOutcome, Enrollment};
use crate::data::session::LiveSession;
use crate::data::user::{normalize_email, LessonProgress, SessionProgress, User};
use crate::error::StoreError;
use crate::role::Role;

#[derive(Default)]
struct Collections {
    users: HashMap<Uuid, User>,
    courses: HashMap<Uuid, Course>,
    enrollments: HashMap<Uuid, Enrollment>,
    sessions: HashMap<Uuid, Vec<LiveSession>>,
    attendance: HashMap<Uuid, AttendanceLog>,
    first_admin: Option<Uuid>,
}

impl Collections {
    fn apply_session_progress(&mut self, user: Uuid, course: Uuid, progress: &SessionProgress) {
        if let Some(it) = self.users.get_mut(&user) {
            it.progress
                .entry(course.to_string())
                .or_default()
                .apply_sessions(progress);
            it.last_updated = Utc::now();
        }
    }
}

/// Store keeping everything in process memory. Each operation holds the lock for its whole
/// duration.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

#[rocket::async_trait]
impl Store for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.users.contains_key(&user.id) {
            return Err(StoreError::Conflict);
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = normalize_email(email);
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|it| it.email == email)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.inner.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        display_name: &str,
    ) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.users.get_mut(&id).map(|user| {
            user.display_name = display_name.to_string();
            user.last_updated = Utc::now();
            user.clone()
        }))
    }

    async fn set_user_role(
        &self,
        id: Uuid,
        role: Role,
        changed_by: Uuid,
    ) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.users.get_mut(&id).map(|user| {
            let now = Utc::now();
            user.role = role;
            user.role_changed_by = Some(changed_by);
            user.role_changed_at = Some(now);
            user.last_updated = now;
            user.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.write().await;
        let removed = inner.users.remove(&id);
        if removed.is_some() {
            inner.enrollments.retain(|_, it| it.user_id != id);
            inner.attendance.retain(|_, it| it.user_id != id);
        }
        Ok(removed)
    }

    async fn claim_first_admin(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.write().await;
        let admin_exists = inner.users.values().any(|it| it.role == Role::Admin);
        if inner.first_admin.is_some() || admin_exists || !inner.users.contains_key(&id) {
            return Ok(None);
        }

        inner.first_admin = Some(id);
        Ok(inner.users.get_mut(&id).map(|user| {
            let now = Utc::now();
            user.role = Role::Admin;
            user.bootstrap_admin = true;
            user.role_changed_by = Some(id);
            user.role_changed_at = Some(now);
            user.last_updated = now;
            user.clone()
        }))
    }

    async fn set_lesson_progress(
        &self,
        user: Uuid,
        course: Uuid,
        lesson: Uuid,
        progress: LessonProgress,
    ) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.users.get_mut(&user).map(|it| {
            let now = Utc::now();
            let entry = it.progress.entry(course.to_string()).or_default();
            entry.lessons.insert(lesson.to_string(), progress);
            entry.last_updated = now;
            it.last_updated = now;
            it.clone()
        }))
    }

    async fn insert_course(&self, course: &Course) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.courses.contains_key(&course.id) {
            return Err(StoreError::Conflict);
        }
        inner.courses.insert(course.id, course.clone());
        Ok(())
    }

    async fn get_course(&self, id: Uuid) -> Result<Option<Course>, StoreError> {
        Ok(self.inner.read().await.courses.get(&id).cloned())
    }

    async fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        Ok(self.inner.read().await.courses.values().cloned().collect())
    }

    async fn replace_course(
        &self,
        course: &Course,
        expected_revision: u64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.courses.get_mut(&course.id) {
            None => Ok(false),
            Some(stored) if stored.revision != expected_revision => Err(StoreError::Conflict),
            Some(stored) => {
                *stored = course.clone();
                Ok(true)
            }
        }
    }

    async fn delete_course(&self, id: Uuid) -> Result<Option<Course>, StoreError> {
        let mut inner = self.inner.write().await;
        let removed = inner.courses.remove(&id);
        if removed.is_some() {
            inner.enrollments.retain(|_, it| it.course_id != id);
            inner.attendance.retain(|_, it| it.course_id != id);
            inner.sessions.remove(&id);
        }
        Ok(removed)
    }

    async fn enroll(&self, enrollment: &Enrollment) -> Result<EnrollOutcome, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.enrollments.get(&enrollment.id) {
            return Ok(EnrollOutcome::AlreadyEnrolled(existing.clone()));
        }
        let open = inner
            .courses
            .get(&enrollment.course_id)
            .map(|it| it.is_published())
            .unwrap_or(false);
        if !open {
            return Ok(EnrollOutcome::CourseUnavailable);
        }
        inner.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(EnrollOutcome::Created(enrollment.clone()))
    }

    async fn get_enrollment(
        &self,
        course: Uuid,
        user: Uuid,
    ) -> Result<Option<Enrollment>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .enrollments
            .get(&enrollment_id(course, user))
            .cloned())
    }

    async fn list_enrollments(&self) -> Result<Vec<Enrollment>, StoreError> {
        let enrollments = self.inner.read().await.enrollments.values().cloned().collect();
        Ok(sorted_by_enrollment(enrollments))
    }

    async fn enrollments_for_course(&self, course: Uuid) -> Result<Vec<Enrollment>, StoreError> {
        let enrollments = self
            .inner
            .read()
            .await
            .enrollments
            .values()
            .filter(|it| it.course_id == course)
            .cloned()
            .collect();
        Ok(sorted_by_enrollment(enrollments))
    }

    async fn enrollments_for_user(&self, user: Uuid) -> Result<Vec<Enrollment>, StoreError> {
        let enrollments = self
            .inner
            .read()
            .await
            .enrollments
            .values()
            .filter(|it| it.user_id == user)
            .cloned()
            .collect();
        Ok(sorted_by_enrollment(enrollments))
    }

    async fn replace_sessions(
        &self,
        course: Uuid,
        sessions: &[LiveSession],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let mut refreshed = Vec::new();
        for log in inner.attendance.values_mut().filter(|it| it.course_id == course) {
            log.retain_sessions(sessions);
            refreshed.push((log.user_id, log.session_progress(sessions.len(), now)));
        }
        for (user, progress) in refreshed {
            inner.apply_session_progress(user, course, &progress);
        }
        inner.sessions.insert(course, sessions.to_vec());
        Ok(())
    }

    async fn sessions_for_course(&self, course: Uuid) -> Result<Vec<LiveSession>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .sessions
            .get(&course)
            .cloned()
            .unwrap_or_default())
    }

    async fn record_attendance(
        &self,
        course: Uuid,
        user: Uuid,
        record: &AttendanceRecord,
    ) -> Result<AttendanceOutcome, StoreError> {
        let mut inner = self.inner.write().await;
        let total = match inner.sessions.get(&course) {
            Some(sessions) if sessions.iter().any(|it| it.id == record.session_id) => {
                sessions.len()
            }
            _ => return Ok(AttendanceOutcome::UnknownSession),
        };

        let log = inner
            .attendance
            .entry(enrollment_id(course, user))
            .or_insert_with(|| AttendanceLog::empty(course, user));
        if let Some(existing) = log.record_for(record.session_id) {
            return Ok(AttendanceOutcome::AlreadyRecorded(existing.clone()));
        }
        log.records.push(record.clone());
        let log = log.clone();

        inner.apply_session_progress(user, course, &log.session_progress(total, record.timestamp));
        Ok(AttendanceOutcome::Recorded(log))
    }

    async fn attendance_log(
        &self,
        course: Uuid,
        user: Uuid,
    ) -> Result<Option<AttendanceLog>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .attendance
            .get(&enrollment_id(course, user))
            .cloned())
    }

    async fn attendance_for_course(&self, course: Uuid) -> Result<Vec<AttendanceLog>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .attendance
            .values()
            .filter(|it| it.course_id == course)
            .cloned()
            .collect())
    }

    async fn attendance_for_user(&self, user: Uuid) -> Result<Vec<AttendanceLog>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .attendance
            .values()
            .filter(|it| it.user_id == user)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SessionSettings};
    use crate::data::course::fixtures::{course, module};
    use crate::data::session::generate_schedule;
    use chrono::Duration;
    use crate::data::course::{CourseLevel, CourseStatus};
    use crate::security::Security;
    use crate::store::StoreHandle;
    use std::sync::Arc;

    fn user(email: &str) -> User {
        User::new(email, "", "password123", &Security::ephemeral(&Config::testing()))
    }

    fn published() -> Course {
        course("Rust", CourseLevel::Beginner, 0.0, CourseStatus::Published)
    }

    /// Schedules two past sessions for `c`.
    async fn scheduled(store: &MemoryStore, c: &mut Course) -> Vec<LiveSession> {
        c.modules.push(module("Intro", 2));
        let starts_on = Utc::now() - Duration::days(60);
        let sessions = generate_schedule(c, starts_on, &SessionSettings::default());
        store
            .replace_sessions(c.id, &sessions)
            .await
            .expect("schedule");
        sessions
    }

    fn attended(session: &LiveSession, student: Uuid) -> AttendanceRecord {
        AttendanceRecord {
            session_id: session.id,
            attended: true,
            timestamp: Utc::now(),
            student_id: student,
        }
    }

    #[rocket::async_test]
    async fn duplicate_users_conflict() {
        let store = MemoryStore::new();
        let ada = user("ada@example.com");
        store.insert_user(&ada).await.expect("first insert");
        assert!(matches!(
            store.insert_user(&ada).await,
            Err(StoreError::Conflict)
        ));
        let found = store
            .find_user_by_email("ADA@example.com")
            .await
            .expect("query");
        assert_eq!(found.map(|it| it.id), Some(ada.id));
    }

    #[rocket::async_test]
    async fn concurrent_enrollments_are_recorded_once() {
        let store = Arc::new(MemoryStore::new());
        let c = published();
        let ada = user("ada@example.com");
        store.insert_course(&c).await.expect("course");

        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let enrollment = Enrollment::new(c.id, ada.id, None);
                tokio::spawn(async move { store.enroll(&enrollment).await })
            })
            .collect();

        let mut created = 0;
        for attempt in attempts {
            if let Ok(EnrollOutcome::Created(_)) = attempt.await.expect("task") {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(
            store.enrollments_for_course(c.id).await.expect("query").len(),
            1
        );
    }

    #[rocket::async_test]
    async fn closed_courses_take_no_enrollments() {
        let store = MemoryStore::new();
        let ada = user("ada@example.com");
        let draft = course("Rust", CourseLevel::Beginner, 0.0, CourseStatus::Draft);
        store.insert_course(&draft).await.expect("course");

        let outcome = store
            .enroll(&Enrollment::new(draft.id, ada.id, None))
            .await
            .expect("enroll");
        assert_eq!(outcome, EnrollOutcome::CourseUnavailable);

        let missing = Enrollment::new(Uuid::new_v4(), ada.id, None);
        let outcome = store.enroll(&missing).await.expect("enroll");
        assert_eq!(outcome, EnrollOutcome::CourseUnavailable);
        assert!(store.list_enrollments().await.expect("query").is_empty());
    }

    #[rocket::async_test]
    async fn first_admin_is_claimed_once() {
        let store = MemoryStore::new();
        let a = user("a@example.com");
        let b = user("b@example.com");
        store.insert_user(&a).await.expect("insert");
        store.insert_user(&b).await.expect("insert");

        let claimed = store.claim_first_admin(a.id).await.expect("claim");
        assert!(matches!(claimed, Some(ref it) if it.role == Role::Admin && it.bootstrap_admin));
        assert!(store.claim_first_admin(b.id).await.expect("claim").is_none());

        // Demoting the first admin doesn't reopen the slot.
        store
            .set_user_role(a.id, Role::Student, a.id)
            .await
            .expect("demote");
        assert!(store.claim_first_admin(b.id).await.expect("claim").is_none());
    }

    #[rocket::async_test]
    async fn stale_revisions_are_rejected() {
        let store = MemoryStore::new();
        let mut c = published();
        store.insert_course(&c).await.expect("insert");

        c.touch();
        assert!(store.replace_course(&c, 0).await.expect("replace"));
        assert!(matches!(
            store.replace_course(&c, 0).await,
            Err(StoreError::Conflict)
        ));

        let mut missing = published();
        missing.touch();
        assert!(!store.replace_course(&missing, 0).await.expect("replace"));
    }

    #[rocket::async_test]
    async fn deleting_a_course_cascades() {
        let memory = MemoryStore::new();
        let mut c = published();
        let sessions = scheduled(&memory, &mut c).await;
        let store = StoreHandle::new(memory);
        let ada = user("ada@example.com");
        store.insert_user(&ada).await.expect("user");
        store.insert_course(&c).await.expect("course");
        store
            .enroll(&Enrollment::new(c.id, ada.id, None))
            .await
            .expect("enroll");
        let outcome = store
            .record_attendance(c.id, ada.id, &attended(&sessions[0], ada.id))
            .await
            .expect("attendance");
        assert!(matches!(outcome, AttendanceOutcome::Recorded(_)));

        assert_eq!(store.enrolled_courses(ada.id).await.expect("query"), vec![c.id]);
        store.delete_course(c.id).await.expect("delete");

        assert!(store.enrolled_courses(ada.id).await.expect("query").is_empty());
        assert!(store.attendance_for_user(ada.id).await.expect("query").is_empty());
        assert!(store.sessions_for_course(c.id).await.expect("query").is_empty());
    }

    #[rocket::async_test]
    async fn attendance_is_recorded_once_per_session() {
        let store = MemoryStore::new();
        let mut c = published();
        let sessions = scheduled(&store, &mut c).await;
        let ada = user("ada@example.com");
        store.insert_user(&ada).await.expect("user");
        let record = attended(&sessions[0], ada.id);

        let first = store
            .record_attendance(c.id, ada.id, &record)
            .await
            .expect("record");
        assert!(matches!(first, AttendanceOutcome::Recorded(ref log) if log.records.len() == 1));

        let mut again = record.clone();
        again.attended = false;
        let second = store
            .record_attendance(c.id, ada.id, &again)
            .await
            .expect("record");
        assert!(matches!(second, AttendanceOutcome::AlreadyRecorded(ref it) if it.attended));

        let unscheduled = attended(&sessions[0], ada.id);
        let third = store
            .record_attendance(Uuid::new_v4(), ada.id, &unscheduled)
            .await
            .expect("record");
        assert_eq!(third, AttendanceOutcome::UnknownSession);
    }

    #[rocket::async_test]
    async fn concurrent_marks_keep_the_highest_progress() {
        let store = Arc::new(MemoryStore::new());
        let mut c = published();
        let sessions = scheduled(&store, &mut c).await;
        let ada = user("ada@example.com");
        store.insert_user(&ada).await.expect("user");

        let (course_id, ada_id) = (c.id, ada.id);
        let marks: Vec<_> = sessions
            .iter()
            .map(|session| {
                let store = store.clone();
                let record = attended(session, ada_id);
                tokio::spawn(async move { store.record_attendance(course_id, ada_id, &record).await })
            })
            .collect();
        for mark in marks {
            mark.await.expect("task").expect("record");
        }

        let stored = store.get_user(ada.id).await.expect("query").expect("user");
        let progress = &stored.progress[&c.id.to_string()];
        assert_eq!(progress.attended_sessions, 2);
        assert_eq!(progress.progress_percentage, 100);
    }

    #[rocket::async_test]
    async fn rescheduling_forgets_attendance_of_removed_sessions() {
        let store = MemoryStore::new();
        let mut c = published();
        let old = scheduled(&store, &mut c).await;
        let ada = user("ada@example.com");
        store.insert_user(&ada).await.expect("user");
        for session in &old {
            store
                .record_attendance(c.id, ada.id, &attended(session, ada.id))
                .await
                .expect("record");
        }

        let new = generate_schedule(&c, Utc::now() - Duration::days(30), &SessionSettings::default());
        store.replace_sessions(c.id, &new).await.expect("reschedule");
        for session in &new {
            store
                .record_attendance(c.id, ada.id, &attended(session, ada.id))
                .await
                .expect("record");
        }

        let log = store
            .attendance_log(c.id, ada.id)
            .await
            .expect("query")
            .expect("log");
        assert_eq!(log.summary().attended, new.len());
        let stored = store.get_user(ada.id).await.expect("query").expect("user");
        let progress = &stored.progress[&c.id.to_string()];
        assert_eq!(progress.attended_sessions, 2);
        assert_eq!(progress.total_sessions, 2);
    }
}
