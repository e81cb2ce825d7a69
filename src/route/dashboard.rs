use std::collections::HashMap;

use rocket::serde::json::Json;
use rocket::State;

use crate::data::analytics::Dashboard;
use crate::data::course::Course;
use crate::data::enrollment::Enrollment;
use crate::resp::jwt::CurrentUser;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::store::StoreHandle;

/// Dashboard of the signed in user
///
/// The payload depends on the user's role and is tagged with it.
#[utoipa::path(
    responses(
        (status = 200, description = "Role specific dashboard", body = Dashboard),
        (status = 401, description = "Missing/expired token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/dashboard")]
#[tracing::instrument(skip(store))]
pub async fn dashboard_get(
    user: CurrentUser,
    store: &State<StoreHandle>,
) -> Result<Json<Dashboard>, Problem> {
    let dashboard = match user.role {
        Role::Student => {
            let enrollments = store.enrollments_for_user(user.id).await?;
            let mut courses = Vec::with_capacity(enrollments.len());
            let mut totals = HashMap::new();
            for enrollment in &enrollments {
                if let Some(course) = store.get_course(enrollment.course_id).await? {
                    let total = store.enrollments_for_course(course.id).await?.len();
                    totals.insert(course.id, total);
                    courses.push(course);
                }
            }
            let attendance = store.attendance_for_user(user.id).await?;

            Dashboard::student(&user, &courses, &enrollments, &attendance, &totals)
        }
        Role::Instructor => {
            let courses: Vec<Course> = store
                .list_courses()
                .await?
                .into_iter()
                .filter(|it| it.instructor_id == user.id)
                .collect();
            let mut enrollments: Vec<Enrollment> = Vec::new();
            for course in &courses {
                enrollments.extend(store.enrollments_for_course(course.id).await?);
            }

            Dashboard::instructor(&courses, &enrollments)
        }
        Role::Admin => Dashboard::admin(
            &store.list_users().await?,
            &store.list_courses().await?,
            &store.list_enrollments().await?,
        ),
    };

    Ok(Json(dashboard))
}
