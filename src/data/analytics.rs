//! Aggregates for course analytics and the role dashboards.
//!
//! Everything here is computed from already loaded records; callers fetch them from the store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::attendance::{AttendanceLog, AttendanceSummary};
use crate::data::course::{Course, CourseStatus, CourseSummary};
use crate::data::enrollment::Enrollment;
use crate::data::user::User;
use crate::role::Role;
use crate::util::percentage;

fn revenue<'a>(enrollments: impl IntoIterator<Item = &'a Enrollment>) -> f64 {
    enrollments.into_iter().map(Enrollment::amount_paid).sum()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseAnalytics {
    pub course_id: Uuid,
    pub total_students: usize,
    pub total_revenue: f64,
    /// Share of enrolled students whose progress reached 100 %.
    pub completion_rate: u32,
    /// Enrollments in the last 30 days.
    pub monthly_enrollments: usize,
    pub average_attendance_rate: u32,
}

impl CourseAnalytics {
    pub fn compute(
        course: &Course,
        enrollments: &[Enrollment],
        students: &[User],
        attendance: &[AttendanceLog],
        now: DateTime<Utc>,
    ) -> CourseAnalytics {
        let month_ago = now - Duration::days(30);
        let completed = students
            .iter()
            .filter(|it| it.progress_percentage(course.id) >= 100)
            .count();

        let rates: Vec<u32> = attendance
            .iter()
            .filter(|it| !it.records.is_empty())
            .map(|it| it.summary().rate)
            .collect();
        let average_attendance_rate = if rates.is_empty() {
            0
        } else {
            (rates.iter().map(|it| *it as f64).sum::<f64>() / rates.len() as f64).round() as u32
        };

        CourseAnalytics {
            course_id: course.id,
            total_students: enrollments.len(),
            total_revenue: revenue(enrollments),
            completion_rate: percentage(completed, enrollments.len()),
            monthly_enrollments: enrollments
                .iter()
                .filter(|it| it.enrolled_at >= month_ago)
                .count(),
            average_attendance_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrolledStudent {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub enrolled_at: DateTime<Utc>,
    pub progress: u32,
    pub last_active: DateTime<Utc>,
}

impl EnrolledStudent {
    /// Lists enrolled students, newest enrollment first. Enrollments of unknown users are skipped.
    pub fn list(course: Uuid, enrollments: &[Enrollment], users: &[User]) -> Vec<EnrolledStudent> {
        let by_id: HashMap<Uuid, &User> = users.iter().map(|it| (it.id, it)).collect();

        let mut students: Vec<EnrolledStudent> = enrollments
            .iter()
            .filter_map(|enrollment| {
                let user = by_id.get(&enrollment.user_id)?;
                let progress = user.course_progress(course);
                Some(EnrolledStudent {
                    id: user.id,
                    name: user.name().to_string(),
                    email: user.email.clone(),
                    enrolled_at: enrollment.enrolled_at,
                    progress: progress.map(|it| it.progress_percentage).unwrap_or(0),
                    last_active: progress
                        .map(|it| it.last_updated.max(enrollment.enrolled_at))
                        .unwrap_or(enrollment.enrolled_at),
                })
            })
            .collect();
        students.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));
        students
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RoleCounts {
    pub student: usize,
    pub instructor: usize,
    pub admin: usize,
}

impl RoleCounts {
    pub fn count<'a>(users: impl IntoIterator<Item = &'a User>) -> RoleCounts {
        let mut counts = RoleCounts::default();
        for user in users {
            match user.role {
                Role::Student => counts.student += 1,
                Role::Instructor => counts.instructor += 1,
                Role::Admin => counts.admin += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.student + self.instructor + self.admin
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StatusCounts {
    pub draft: usize,
    pub published: usize,
    pub archived: usize,
}

impl StatusCounts {
    pub fn count<'a>(courses: impl IntoIterator<Item = &'a Course>) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for course in courses {
            match course.status {
                CourseStatus::Draft => counts.draft += 1,
                CourseStatus::Published => counts.published += 1,
                CourseStatus::Archived => counts.archived += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StudentCourse {
    pub course: CourseSummary,
    pub enrolled_at: DateTime<Utc>,
    pub progress_percentage: u32,
    pub completed_lessons: usize,
    pub attendance: AttendanceSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StudentDashboard {
    pub courses: Vec<StudentCourse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InstructorCourse {
    pub course: CourseSummary,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InstructorDashboard {
    pub courses: Vec<InstructorCourse>,
    pub total_courses: usize,
    pub published_courses: usize,
    pub total_students: usize,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminDashboard {
    pub users: RoleCounts,
    pub courses: StatusCounts,
    pub total_users: usize,
    pub total_courses: usize,
    pub total_enrollments: usize,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Dashboard {
    Student(StudentDashboard),
    Instructor(InstructorDashboard),
    Admin(AdminDashboard),
}

impl Dashboard {
    /// `courses` are the student's enrolled courses; enrollments and logs are the student's own.
    pub fn student(
        user: &User,
        courses: &[Course],
        enrollments: &[Enrollment],
        attendance: &[AttendanceLog],
        total_students: &HashMap<Uuid, usize>,
    ) -> Dashboard {
        let mut entries: Vec<StudentCourse> = enrollments
            .iter()
            .filter_map(|enrollment| {
                let course = courses.iter().find(|it| it.id == enrollment.course_id)?;
                let summary = attendance
                    .iter()
                    .find(|it| it.course_id == course.id)
                    .map(AttendanceLog::summary)
                    .unwrap_or_else(|| AttendanceLog::empty(course.id, user.id).summary());
                Some(StudentCourse {
                    course: CourseSummary::new(
                        course,
                        total_students.get(&course.id).copied().unwrap_or(0),
                    ),
                    enrolled_at: enrollment.enrolled_at,
                    progress_percentage: user.progress_percentage(course.id),
                    completed_lessons: user
                        .course_progress(course.id)
                        .map(|it| it.completed_lessons())
                        .unwrap_or(0),
                    attendance: summary,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));

        Dashboard::Student(StudentDashboard { courses: entries })
    }

    /// `courses` are the ones taught by the instructor, `enrollments` every enrollment in them.
    pub fn instructor(courses: &[Course], enrollments: &[Enrollment]) -> Dashboard {
        let entries: Vec<InstructorCourse> = courses
            .iter()
            .map(|course| {
                let own: Vec<&Enrollment> = enrollments
                    .iter()
                    .filter(|it| it.course_id == course.id)
                    .collect();
                InstructorCourse {
                    course: CourseSummary::new(course, own.len()),
                    revenue: revenue(own),
                }
            })
            .collect();

        Dashboard::Instructor(InstructorDashboard {
            total_courses: entries.len(),
            published_courses: courses.iter().filter(|it| it.is_published()).count(),
            total_students: entries.iter().map(|it| it.course.total_students).sum(),
            total_revenue: entries.iter().map(|it| it.revenue).sum(),
            courses: entries,
        })
    }

    pub fn admin(users: &[User], courses: &[Course], enrollments: &[Enrollment]) -> Dashboard {
        let user_counts = RoleCounts::count(users);
        Dashboard::Admin(AdminDashboard {
            users: user_counts,
            courses: StatusCounts::count(courses),
            total_users: user_counts.total(),
            total_courses: courses.len(),
            total_enrollments: enrollments.len(),
            total_revenue: revenue(enrollments),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::data::attendance::AttendanceRecord;
    use crate::data::course::fixtures::course;
    use crate::data::course::CourseLevel;
    use crate::data::user::{CourseProgress, SessionProgress};
    use crate::payment::{PaymentMethod, PaymentReceipt};
    use crate::security::Security;

    fn paid(course: Uuid, user: Uuid, amount: f64) -> Enrollment {
        Enrollment::new(
            course,
            user,
            Some(PaymentReceipt {
                reference: "SIM-test".to_string(),
                amount,
                currency: "NGN".to_string(),
                method: PaymentMethod::Card,
                paid_at: Utc::now(),
            }),
        )
    }

    fn log(course: Uuid, user: Uuid, marks: &[bool]) -> AttendanceLog {
        let mut log = AttendanceLog::empty(course, user);
        log.records = marks
            .iter()
            .map(|attended| AttendanceRecord {
                session_id: Uuid::new_v4(),
                attended: *attended,
                timestamp: Utc::now(),
                student_id: user,
            })
            .collect();
        log
    }

    #[test]
    fn course_analytics() {
        let security = Security::ephemeral(&Config::testing());
        let c = course("Rust", CourseLevel::Advanced, 25000.0, CourseStatus::Published);

        let mut done = User::new("done@example.com", "Done", "password123", &security);
        let mut progress = CourseProgress::default();
        progress.apply_sessions(&SessionProgress {
            attended_sessions: 3,
            total_sessions: 3,
            progress_percentage: 100,
            last_session_attended: Utc::now(),
        });
        done.progress.insert(c.id.to_string(), progress);
        let started = User::new("started@example.com", "Started", "password123", &security);

        let mut old = paid(c.id, started.id, 25000.0);
        old.enrolled_at = Utc::now() - Duration::days(45);
        let enrollments = vec![paid(c.id, done.id, 25000.0), old];
        let logs = vec![
            log(c.id, done.id, &[true, true, true]),
            log(c.id, started.id, &[true, false]),
        ];

        let analytics =
            CourseAnalytics::compute(&c, &enrollments, &[done, started], &logs, Utc::now());
        assert_eq!(analytics.total_students, 2);
        assert_eq!(analytics.total_revenue, 50000.0);
        assert_eq!(analytics.completion_rate, 50);
        assert_eq!(analytics.monthly_enrollments, 1);
        assert_eq!(analytics.average_attendance_rate, 75);
    }

    #[test]
    fn students_are_listed_newest_first() {
        let security = Security::ephemeral(&Config::testing());
        let c = course("Rust", CourseLevel::Beginner, 0.0, CourseStatus::Published);
        let a = User::new("a@example.com", "A", "password123", &security);
        let b = User::new("b@example.com", "", "password123", &security);

        let mut first = Enrollment::new(c.id, a.id, None);
        first.enrolled_at = Utc::now() - Duration::days(2);
        let second = Enrollment::new(c.id, b.id, None);

        let students = EnrolledStudent::list(c.id, &[first, second], &[a, b]);
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].name, "b@example.com");
        assert_eq!(students[1].name, "A");
    }

    #[test]
    fn dashboards_are_tagged_by_role() {
        let security = Security::ephemeral(&Config::testing());
        let mut admin = User::new("admin@example.com", "Admin", "password123", &security);
        admin.role = Role::Admin;
        let student = User::new("s@example.com", "S", "password123", &security);

        let mut c = course("Rust", CourseLevel::Beginner, 100.0, CourseStatus::Published);
        c.instructor_id = admin.id;
        let draft = course("Go", CourseLevel::Beginner, 0.0, CourseStatus::Draft);
        let enrollments = vec![paid(c.id, student.id, 100.0)];

        let dashboard = Dashboard::admin(&[admin, student.clone()], &[c.clone(), draft], &enrollments);
        let value = serde_json::to_value(&dashboard).expect("serializable");
        assert_eq!(value["role"], "admin");
        assert_eq!(value["users"]["student"], 1);
        assert_eq!(value["courses"]["draft"], 1);
        assert_eq!(value["total_revenue"], 100.0);

        let instructor = Dashboard::instructor(std::slice::from_ref(&c), &enrollments);
        match instructor {
            Dashboard::Instructor(it) => {
                assert_eq!(it.total_students, 1);
                assert_eq!(it.total_revenue, 100.0);
                assert_eq!(it.published_courses, 1);
            }
            other => panic!("unexpected dashboard: {:?}", other),
        }

        let totals = HashMap::from([(c.id, 1)]);
        let logs = vec![log(c.id, student.id, &[true, false])];
        match Dashboard::student(&student, &[c], &enrollments, &logs, &totals) {
            Dashboard::Student(it) => {
                assert_eq!(it.courses.len(), 1);
                assert_eq!(it.courses[0].attendance.rate, 50);
                assert_eq!(it.courses[0].course.total_students, 1);
            }
            other => panic!("unexpected dashboard: {:?}", other),
        }
    }
}
