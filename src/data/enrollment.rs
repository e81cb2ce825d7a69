use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::course::CourseSummary;
use crate::payment::{PaymentMethod, PaymentReceipt};

/// One record per (course, user) pair; the only place enrollment is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Enrollment {
    pub id: Uuid,
    pub course_id: Uuid,
    pub user_id: Uuid,
    pub enrolled_at: DateTime<Utc>,
    /// Absent for free courses.
    #[serde(default)]
    pub payment: Option<PaymentReceipt>,
}

pub fn enrollment_id(course: Uuid, user: Uuid) -> Uuid {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(course.as_bytes());
    key.extend_from_slice(user.as_bytes());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, &key)
}

impl Enrollment {
    pub fn new(course: Uuid, user: Uuid, payment: Option<PaymentReceipt>) -> Enrollment {
        Enrollment {
            id: enrollment_id(course, user),
            course_id: course,
            user_id: user,
            enrolled_at: Utc::now(),
            payment,
        }
    }

    pub fn amount_paid(&self) -> f64 {
        self.payment.as_ref().map(|it| it.amount).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrollOutcome {
    Created(Enrollment),
    AlreadyEnrolled(Enrollment),
    /// The course was deleted or unpublished; nothing was stored.
    CourseUnavailable,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct EnrollRequest {
    #[serde(default)]
    pub method: PaymentMethod,
}

/// Data for the enrollment success screen.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrollmentResponse {
    pub enrollment: Enrollment,
    pub course: CourseSummary,
    /// False when the user was already enrolled; nothing was charged then.
    pub newly_enrolled: bool,
}

/// One entry of the caller's enrollment list.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrolledCourse {
    pub enrollment: Enrollment,
    pub course: CourseSummary,
}

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn not_enrollable(course: Uuid) -> Problem {
        Problem::new_untyped(Status::Conflict, "Course isn't open for enrollment.")
            .insert("course", course.to_string())
            .clone()
    }

    #[inline]
    pub fn not_enrolled(course: Uuid) -> Problem {
        Problem::new_untyped(Status::Forbidden, "User isn't enrolled in course.")
            .insert("course", course.to_string())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_stable_per_pair() {
        let course = Uuid::new_v4();
        let user = Uuid::new_v4();
        assert_eq!(enrollment_id(course, user), enrollment_id(course, user));
        assert_ne!(enrollment_id(course, user), enrollment_id(user, course));
    }

    #[test]
    fn free_enrollments_paid_nothing() {
        let enrollment = Enrollment::new(Uuid::new_v4(), Uuid::new_v4(), None);
        assert_eq!(enrollment.amount_paid(), 0.0);
    }
}
