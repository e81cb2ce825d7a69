use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::config::Config;
use crate::data::course::db::problem as course_problem;
use crate::data::course::CourseSummary;
use crate::data::enrollment::problem;
use crate::data::enrollment::{
    EnrollOutcome, EnrollRequest, EnrolledCourse, Enrollment, EnrollmentResponse,
};
use crate::feed::{ChangeEvent, ChangeFeed};
use crate::payment::{ChargeRequest, PaymentGateway};
use crate::resp::jwt::CurrentUser;
use crate::resp::problem::Problem;
use crate::route::courses::visible_course;
use crate::store::StoreHandle;

/// Enroll in a course, paying for it first if it isn't free
#[utoipa::path(
    params(("id", description = "course ID")),
    request_body(content = EnrollRequest, description = "Optional payment method, card by default"),
    responses(
        (status = 200, description = "Enrollment of the user", body = EnrollmentResponse),
        (status = 402, description = "Payment was declined", body = Problem),
        (status = 404, description = "Course doesn't exist", body = Problem),
        (status = 409, description = "Course isn't published", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/course/<id>/enroll", data = "<request>")]
#[tracing::instrument(skip(store, payments, config, feed))]
pub async fn course_enroll(
    id: Uuid,
    request: Option<Json<EnrollRequest>>,
    user: CurrentUser,
    store: &State<StoreHandle>,
    payments: &State<Box<dyn PaymentGateway>>,
    config: &State<Config>,
    feed: &State<ChangeFeed>,
) -> Result<Json<EnrollmentResponse>, Problem> {
    let course = visible_course(store, id, &user).await?;
    if !course.is_published() {
        return Err(problem::not_enrollable(id));
    }

    if let Some(existing) = store.get_enrollment(id, user.id).await? {
        tracing::debug!("{} is already enrolled in {}", user.id, id);
        let total = store.enrollments_for_course(id).await?.len();
        return Ok(Json(EnrollmentResponse {
            enrollment: existing,
            course: CourseSummary::new(&course, total),
            newly_enrolled: false,
        }));
    }

    let receipt = if course.is_free() {
        None
    } else {
        let method = request.map(|it| it.into_inner().method).unwrap_or_default();
        let charge = ChargeRequest {
            course_id: id,
            user_id: user.id,
            email: user.email.clone(),
            amount: course.price,
            currency: config.currency.clone(),
            method,
        };
        Some(payments.charge(&charge).await?)
    };

    let (enrollment, newly_enrolled) =
        match store.enroll(&Enrollment::new(id, user.id, receipt.clone())).await? {
            EnrollOutcome::Created(it) => (it, true),
            EnrollOutcome::AlreadyEnrolled(it) => {
                // A concurrent request enrolled first; undo this charge.
                if let Some(receipt) = &receipt {
                    tracing::warn!("{} enrolled concurrently in {}, refunding", user.id, id);
                    payments.refund(receipt).await?;
                }
                (it, false)
            }
            EnrollOutcome::CourseUnavailable => {
                if let Some(receipt) = &receipt {
                    tracing::warn!("{} closed while {} was paying, refunding", id, user.id);
                    payments.refund(receipt).await?;
                }
                return Err(match store.get_course(id).await? {
                    Some(_) => problem::not_enrollable(id),
                    None => course_problem::not_found(id),
                });
            }
        };

    if newly_enrolled {
        tracing::info!("{} enrolled in {}", user.id, id);
        feed.publish(ChangeEvent::Enrolled {
            course_id: id,
            user_id: user.id,
            instructor_id: course.instructor_id,
        });
    }

    let total = store.enrollments_for_course(id).await?.len();
    Ok(Json(EnrollmentResponse {
        enrollment,
        course: CourseSummary::new(&course, total),
        newly_enrolled,
    }))
}

/// Courses the signed in user is enrolled in
#[utoipa::path(
    responses(
        (status = 200, description = "Enrollments, oldest first", body = Vec<EnrolledCourse>),
        (status = 401, description = "Missing/expired token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/enrollments")]
#[tracing::instrument(skip(store))]
pub async fn enrollment_list(
    user: CurrentUser,
    store: &State<StoreHandle>,
) -> Result<Json<Vec<EnrolledCourse>>, Problem> {
    let mut result = Vec::new();
    for enrollment in store.enrollments_for_user(user.id).await? {
        let course = match store.get_course(enrollment.course_id).await? {
            Some(it) => it,
            None => {
                tracing::warn!("enrollment {} points to a missing course", enrollment.id);
                continue;
            }
        };
        let total = store.enrollments_for_course(course.id).await?.len();
        result.push(EnrolledCourse {
            course: CourseSummary::new(&course, total),
            enrollment,
        });
    }
    Ok(Json(result))
}

///////////////////////
//       TESTS
///////////////////////
