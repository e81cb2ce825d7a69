use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::State;

use crate::data::course::CourseSummary;
use crate::data::sample::seed_samples;
use crate::data::user::UserCreatedResponse;
use crate::feed::{ChangeEvent, ChangeFeed};
use crate::resp::jwt::{CurrentUser, UserRoleToken};
use crate::resp::problem::{problems, Problem};
use crate::security::Security;
use crate::store::StoreHandle;

/// Become the first admin
///
/// Only succeeds while no admin exists, and only once per deployment.
#[utoipa::path(
    responses(
        (status = 200, description = "Promoted user with a refreshed token", body = UserCreatedResponse),
        (status = 409, description = "An admin already exists", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/admin/bootstrap")]
#[tracing::instrument(skip(cookies, store, security, feed))]
pub async fn admin_bootstrap(
    user: CurrentUser,
    cookies: &CookieJar<'_>,
    store: &State<StoreHandle>,
    security: &State<Security>,
    feed: &State<ChangeFeed>,
) -> Result<Json<UserCreatedResponse>, Problem> {
    let promoted = store
        .claim_first_admin(user.id)
        .await?
        .ok_or_else(|| problems::conflict("An admin was already appointed."))?;
    tracing::warn!("{} claimed the first admin slot", promoted.id);

    let token = UserRoleToken::new(&promoted, security);
    cookies.add(token.cookie(security)?);
    feed.publish(ChangeEvent::ProfileUpdated {
        user_id: promoted.id,
    });

    Ok(Json(UserCreatedResponse::new(
        &promoted,
        token.encode_jwt(security)?,
    )))
}

/// Insert the bundled sample courses
///
/// Courses whose title already exists are skipped.
#[utoipa::path(
    responses(
        (status = 200, description = "Inserted courses", body = Vec<CourseSummary>),
        (status = 403, description = "Not an admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/admin/seed")]
#[tracing::instrument(skip(store, feed))]
pub async fn admin_seed(
    user: CurrentUser,
    store: &State<StoreHandle>,
    feed: &State<ChangeFeed>,
) -> Result<Json<Vec<CourseSummary>>, Problem> {
    if !user.role.is_admin() {
        return Err(problems::forbidden("Only admins can seed sample data."));
    }

    let inserted = seed_samples(&***store).await?;
    for course in &inserted {
        feed.publish(ChangeEvent::CourseUpserted {
            course_id: course.id,
            instructor_id: course.instructor_id,
            status: course.status,
        });
    }

    Ok(Json(
        inserted.iter().map(|it| CourseSummary::new(it, 0)).collect(),
    ))
}

#[cfg(test)]
mod admin_endpoints {
    use rocket::http::Status;

    use crate::data::course::CourseSummary;
    use crate::data::user::UserCreatedResponse;
    use crate::role::Role;
    use crate::route::testing::*;

    #[rocket::async_test]
    async fn only_one_user_becomes_bootstrap_admin() {
        let client = client().await;
        let first = signup(&client, "bootstrap_first").await;
        let second = signup(&client, "bootstrap_second").await;

        let response = client
            .post("/api/v1/admin/bootstrap")
            .header(bearer(&first.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let promoted: UserCreatedResponse = response.into_json().await.expect("invalid json");
        assert_eq!(promoted.role, Role::Admin);

        let response = client
            .post("/api/v1/admin/bootstrap")
            .header(bearer(&second.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);
    }

    #[rocket::async_test]
    async fn seeding_is_admin_only_and_idempotent() {
        let client = client().await;
        let student = signup(&client, "seed_student").await;
        let admin = signup_admin(&client, "seed_admin").await;

        let response = client
            .post("/api/v1/admin/seed")
            .header(bearer(&student.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .post("/api/v1/admin/seed")
            .header(bearer(&admin.token))
            .dispatch()
            .await;
        let inserted: Vec<CourseSummary> = response.into_json().await.expect("invalid json");
        assert_eq!(inserted.len(), 3);

        let response = client
            .post("/api/v1/admin/seed")
            .header(bearer(&admin.token))
            .dispatch()
            .await;
        let inserted: Vec<CourseSummary> = response.into_json().await.expect("invalid json");
        assert!(inserted.is_empty());
    }
}
