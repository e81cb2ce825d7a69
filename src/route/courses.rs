use std::collections::HashMap;

use chrono::Utc;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::analytics::{CourseAnalytics, EnrolledStudent};
use crate::data::course::catalog::CatalogQuery;
use crate::data::course::db::problem;
use crate::data::course::db::{CourseCreateData, CourseUpdateData, ModuleData, ModuleUpdateData};
use crate::data::course::{Course, CourseResponse, CourseStatus, CourseSummary};
use crate::data::enrollment::Enrollment;
use crate::feed::{ChangeEvent, ChangeFeed};
use crate::middleware::paging::{CoursePage, PageState};
use crate::resp::jwt::CurrentUser;
use crate::resp::problem::{problems, Problem};
use crate::store::StoreHandle;

/// Loads a course the caller is allowed to see. Hidden courses look missing.
pub(crate) async fn visible_course(
    store: &StoreHandle,
    id: Uuid,
    user: &CurrentUser,
) -> Result<Course, Problem> {
    store
        .get_course(id)
        .await?
        .filter(|it| it.is_visible_to(user))
        .ok_or_else(|| problem::not_found(id))
}

/// Loads a course the caller is allowed to edit.
pub(crate) async fn managed_course(
    store: &StoreHandle,
    id: Uuid,
    user: &CurrentUser,
) -> Result<Course, Problem> {
    let course = visible_course(store, id, user).await?;
    if !course.is_managed_by(user) {
        return Err(problem::not_owned());
    }
    Ok(course)
}

/// Writes back a course read earlier, failing if someone else wrote it in between.
async fn save_course(store: &StoreHandle, mut course: Course) -> Result<Course, Problem> {
    let expected = course.revision;
    course.touch();

    if !store.replace_course(&course, expected).await? {
        return Err(problem::not_found(course.id));
    }
    Ok(course)
}

async fn course_response(store: &StoreHandle, course: Course) -> Result<CourseResponse, Problem> {
    let students = store.enrolled_students(course.id).await?;
    Ok(CourseResponse::new(course, students))
}

fn upserted(course: &Course) -> ChangeEvent {
    ChangeEvent::CourseUpserted {
        course_id: course.id,
        instructor_id: course.instructor_id,
        status: course.status,
    }
}

fn student_totals(enrollments: &[Enrollment]) -> HashMap<Uuid, usize> {
    let mut totals = HashMap::new();
    for enrollment in enrollments {
        *totals.entry(enrollment.course_id).or_insert(0) += 1;
    }
    totals
}

/// Browse the published catalog
#[utoipa::path(
    params(
        CatalogQuery,
        ("page" = Option<u32>, Query, description = "Page index, starting at 0"),
        ("len" = Option<u32>, Query, description = "Page length"),
    ),
    responses(
        (status = 200, description = "Published courses, newest first", body = CoursePage),
    )
)]
#[get("/courses?<query..>")]
#[tracing::instrument(skip(store))]
pub async fn course_list(
    query: CatalogQuery,
    paging: PageState,
    store: &State<StoreHandle>,
) -> Result<Json<CoursePage>, Problem> {
    let courses = query.apply(store.list_courses().await?);
    let totals = student_totals(&store.list_enrollments().await?);

    let summaries = courses
        .iter()
        .map(|it| CourseSummary::new(it, totals.get(&it.id).copied().unwrap_or(0)))
        .collect();
    Ok(Json(paging.apply(summaries)))
}

/// Courses taught by the signed in user
#[utoipa::path(
    responses(
        (status = 200, description = "Own courses in any status", body = Vec<CourseSummary>),
        (status = 401, description = "Missing/expired token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/courses/mine")]
#[tracing::instrument(skip(store))]
pub async fn course_mine(
    user: CurrentUser,
    store: &State<StoreHandle>,
) -> Result<Json<Vec<CourseSummary>>, Problem> {
    let mut courses: Vec<Course> = store
        .list_courses()
        .await?
        .into_iter()
        .filter(|it| it.instructor_id == user.id)
        .collect();
    courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut result = Vec::with_capacity(courses.len());
    for course in &courses {
        let total = store.enrollments_for_course(course.id).await?.len();
        result.push(CourseSummary::new(course, total));
    }
    Ok(Json(result))
}

/// Every course in any status, for moderation
#[utoipa::path(
    params(
        ("status" = Option<CourseStatus>, Query, description = "Only courses in this status"),
        ("page" = Option<u32>, Query, description = "Page index, starting at 0"),
        ("len" = Option<u32>, Query, description = "Page length"),
    ),
    responses(
        (status = 200, description = "Courses, newest first", body = CoursePage),
        (status = 403, description = "Not an admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/courses/all?<status>")]
#[tracing::instrument(skip(store))]
pub async fn course_list_all(
    status: Option<CourseStatus>,
    user: CurrentUser,
    paging: PageState,
    store: &State<StoreHandle>,
) -> Result<Json<CoursePage>, Problem> {
    if !user.role.is_admin() {
        return Err(problems::forbidden("Only admins can list every course."));
    }

    let mut courses: Vec<Course> = store
        .list_courses()
        .await?
        .into_iter()
        .filter(|it| status.map_or(true, |status| it.status == status))
        .collect();
    courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let totals = student_totals(&store.list_enrollments().await?);

    let summaries = courses
        .iter()
        .map(|it| CourseSummary::new(it, totals.get(&it.id).copied().unwrap_or(0)))
        .collect();
    Ok(Json(paging.apply(summaries)))
}

/// Get a course with its modules
#[utoipa::path(
    params(("id", description = "course ID")),
    responses(
        (status = 200, description = "Course details", body = CourseResponse),
        (status = 404, description = "Course doesn't exist or isn't visible", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/course/<id>")]
#[tracing::instrument(skip(store))]
pub async fn course_get(
    id: Uuid,
    user: CurrentUser,
    store: &State<StoreHandle>,
) -> Result<Json<CourseResponse>, Problem> {
    let course = visible_course(store, id, &user).await?;
    Ok(Json(course_response(store, course).await?))
}

/// Create a course
#[utoipa::path(
    request_body = CourseCreateData,
    responses(
        (status = 201, description = "Created course", body = CourseResponse),
        (status = 400, description = "Invalid course data", body = Problem),
        (status = 403, description = "Not an instructor or admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/course", format = "json", data = "<data>")]
#[tracing::instrument(skip(store, feed))]
pub async fn course_create(
    data: Json<CourseCreateData>,
    user: CurrentUser,
    store: &State<StoreHandle>,
    feed: &State<ChangeFeed>,
) -> Result<status::Created<Json<CourseResponse>>, Problem> {
    if !user.role.can_author() {
        return Err(problems::forbidden("Only instructors can create courses."));
    }
    data.validate()?;

    let course = data.into_inner().into_course(&user);
    store.insert_course(&course).await?;
    tracing::info!("{} created course {}", user.id, course.id);
    feed.publish(upserted(&course));

    let location = format!("/api/v1/course/{}", course.id);
    Ok(status::Created::new(location).body(Json(course_response(store, course).await?)))
}

/// Update course details
#[utoipa::path(
    params(("id", description = "course ID")),
    request_body = CourseUpdateData,
    responses(
        (status = 200, description = "Updated course", body = CourseResponse),
        (status = 403, description = "Course isn't managed by user", body = Problem),
        (status = 404, description = "Course doesn't exist", body = Problem),
        (status = 409, description = "Course was changed concurrently", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/course/<id>", format = "json", data = "<update>")]
#[tracing::instrument(skip(store, feed))]
pub async fn course_update(
    id: Uuid,
    update: Json<CourseUpdateData>,
    user: CurrentUser,
    store: &State<StoreHandle>,
    feed: &State<ChangeFeed>,
) -> Result<Json<CourseResponse>, Problem> {
    update.validate()?;

    let mut course = managed_course(store, id, &user).await?;
    update.into_inner().apply(&mut course);
    let course = save_course(store, course).await?;
    feed.publish(upserted(&course));

    Ok(Json(course_response(store, course).await?))
}

/// Delete a course with its enrollments, sessions and attendance
#[utoipa::path(
    params(("id", description = "course ID")),
    responses(
        (status = 200, description = "ID of the deleted course", body = String),
        (status = 403, description = "Course isn't managed by user", body = Problem),
        (status = 404, description = "Course doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/course/<id>")]
#[tracing::instrument(skip(store, feed))]
pub async fn course_delete(
    id: Uuid,
    user: CurrentUser,
    store: &State<StoreHandle>,
    feed: &State<ChangeFeed>,
) -> Result<String, Problem> {
    managed_course(store, id, &user).await?;

    let removed = store
        .delete_course(id)
        .await?
        .ok_or_else(|| problem::not_found(id))?;
    tracing::info!("{} deleted course {}", user.id, id);
    feed.publish(ChangeEvent::CourseDeleted { course_id: id });

    Ok(removed.id.to_string())
}

/// Add a module to a course
#[utoipa::path(
    params(("id", description = "course ID")),
    request_body = ModuleData,
    responses(
        (status = 200, description = "Course with the new module", body = CourseResponse),
        (status = 403, description = "Course isn't managed by user", body = Problem),
        (status = 409, description = "Course was changed concurrently", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/course/<id>/module", format = "json", data = "<module>")]
#[tracing::instrument(skip(store, feed))]
pub async fn module_create(
    id: Uuid,
    module: Json<ModuleData>,
    user: CurrentUser,
    store: &State<StoreHandle>,
    feed: &State<ChangeFeed>,
) -> Result<Json<CourseResponse>, Problem> {
    module.validate()?;

    let mut course = managed_course(store, id, &user).await?;
    course.modules.push(module.into_inner().into_module());
    let course = save_course(store, course).await?;
    feed.publish(upserted(&course));

    Ok(Json(course_response(store, course).await?))
}

/// Update a module
#[utoipa::path(
    params(
        ("id", description = "course ID"),
        ("module", description = "module ID"),
    ),
    request_body = ModuleUpdateData,
    responses(
        (status = 200, description = "Course with the updated module", body = CourseResponse),
        (status = 404, description = "Course or module doesn't exist", body = Problem),
        (status = 409, description = "Course was changed concurrently", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/course/<id>/module/<module>", format = "json", data = "<update>")]
#[tracing::instrument(skip(store, feed))]
pub async fn module_update(
    id: Uuid,
    module: Uuid,
    update: Json<ModuleUpdateData>,
    user: CurrentUser,
    store: &State<StoreHandle>,
    feed: &State<ChangeFeed>,
) -> Result<Json<CourseResponse>, Problem> {
    update.validate()?;

    let mut course = managed_course(store, id, &user).await?;
    let target = course
        .modules
        .iter_mut()
        .find(|it| it.id == module)
        .ok_or_else(|| problem::module_not_found(id, module))?;
    update.into_inner().apply(target);

    let course = save_course(store, course).await?;
    feed.publish(upserted(&course));

    Ok(Json(course_response(store, course).await?))
}

/// Remove a module
#[utoipa::path(
    params(
        ("id", description = "course ID"),
        ("module", description = "module ID"),
    ),
    responses(
        (status = 200, description = "Course without the module", body = CourseResponse),
        (status = 404, description = "Course or module doesn't exist", body = Problem),
        (status = 409, description = "Course was changed concurrently", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/course/<id>/module/<module>")]
#[tracing::instrument(skip(store, feed))]
pub async fn module_delete(
    id: Uuid,
    module: Uuid,
    user: CurrentUser,
    store: &State<StoreHandle>,
    feed: &State<ChangeFeed>,
) -> Result<Json<CourseResponse>, Problem> {
    let mut course = managed_course(store, id, &user).await?;
    let before = course.modules.len();
    course.modules.retain(|it| it.id != module);
    if course.modules.len() == before {
        return Err(problem::module_not_found(id, module));
    }

    let course = save_course(store, course).await?;
    feed.publish(upserted(&course));

    Ok(Json(course_response(store, course).await?))
}

async fn enrolled_users(
    store: &StoreHandle,
    enrollments: &[Enrollment],
) -> Result<Vec<crate::data::user::User>, Problem> {
    let mut users = Vec::with_capacity(enrollments.len());
    for enrollment in enrollments {
        if let Some(user) = store.get_user(enrollment.user_id).await? {
            users.push(user);
        }
    }
    Ok(users)
}

/// Course analytics
#[utoipa::path(
    params(("id", description = "course ID")),
    responses(
        (status = 200, description = "Aggregated course figures", body = CourseAnalytics),
        (status = 403, description = "Course isn't managed by user", body = Problem),
        (status = 404, description = "Course doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/course/<id>/analytics")]
#[tracing::instrument(skip(store))]
pub async fn course_analytics(
    id: Uuid,
    user: CurrentUser,
    store: &State<StoreHandle>,
) -> Result<Json<CourseAnalytics>, Problem> {
    let course = managed_course(store, id, &user).await?;
    let enrollments = store.enrollments_for_course(id).await?;
    let students = enrolled_users(store, &enrollments).await?;
    let attendance = store.attendance_for_course(id).await?;

    Ok(Json(CourseAnalytics::compute(
        &course,
        &enrollments,
        &students,
        &attendance,
        Utc::now(),
    )))
}

/// Students enrolled in a course
#[utoipa::path(
    params(("id", description = "course ID")),
    responses(
        (status = 200, description = "Enrolled students, newest enrollment first", body = Vec<EnrolledStudent>),
        (status = 403, description = "Course isn't managed by user", body = Problem),
        (status = 404, description = "Course doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/course/<id>/students")]
#[tracing::instrument(skip(store))]
pub async fn course_students(
    id: Uuid,
    user: CurrentUser,
    store: &State<StoreHandle>,
) -> Result<Json<Vec<EnrolledStudent>>, Problem> {
    managed_course(store, id, &user).await?;
    let enrollments = store.enrollments_for_course(id).await?;
    let students = enrolled_users(store, &enrollments).await?;

    Ok(Json(EnrolledStudent::list(id, &enrollments, &students)))
}

///////////////////////
//       TESTS
///////////////////////

#[cfg(test)]
mod course_endpoints {
    use rocket::http::{ContentType, Status};
    use uuid::Uuid;

    use crate::data::course::{CourseResponse, CourseStatus, CourseSummary};
    use crate::middleware::paging::Page;
    use crate::role::Role;
    use crate::route::testing::*;

    #[rocket::async_test]
    async fn students_cant_create_courses() {
        let client = client().await;
        let student = signup(&client, "course_student").await;

        let response = client
            .post("/api/v1/course")
            .header(bearer(&student.token))
            .header(ContentType::JSON)
            .body(r#"{"title":"Rust"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn admins_list_courses_in_every_status() {
        let client = client().await;
        let teacher = signup_as(&client, "course_all_teacher", Role::Instructor).await;
        let admin = signup_admin(&client, "course_all_admin").await;
        let draft = create_course(&client, &teacher.token, "Draft", 0.0, &[1], "draft").await;
        create_course(&client, &teacher.token, "Live", 0.0, &[1], "published").await;
        create_course(&client, &teacher.token, "Old", 0.0, &[1], "archived").await;

        let response = client
            .get("/api/v1/courses/all")
            .header(bearer(&teacher.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .get("/api/v1/courses/all")
            .header(bearer(&admin.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let page: Page<CourseSummary> = response.into_json().await.expect("invalid page json");
        assert_eq!(page.total, 3);

        let response = client
            .get("/api/v1/courses/all?status=draft")
            .header(bearer(&admin.token))
            .dispatch()
            .await;
        let page: Page<CourseSummary> = response.into_json().await.expect("invalid page json");
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, draft.course.id);
        assert_eq!(page.items[0].status, CourseStatus::Draft);
    }

    #[rocket::async_test]
    async fn drafts_stay_out_of_the_catalog() {
        let client = client().await;
        let teacher = signup_as(&client, "course_draft_teacher", Role::Instructor).await;
        let student = signup(&client, "course_draft_student").await;
        let draft = create_course(&client, &teacher.token, "Draft", 0.0, &[1], "draft").await;
        assert_eq!(draft.course.status, CourseStatus::Draft);

        let response = client.get("/api/v1/courses").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let page: Page<CourseSummary> = response.into_json().await.expect("invalid page json");
        assert_eq!(page.total, 0);

        let response = client
            .get(format!("/api/v1/course/{}", draft.course.id))
            .header(bearer(&student.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);

        let response = client
            .get(format!("/api/v1/course/{}", draft.course.id))
            .header(bearer(&teacher.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn catalog_combines_level_and_price_filters() {
        let client = client().await;
        let teacher = signup_as(&client, "course_filter_teacher", Role::Instructor).await;
        create_course(&client, &teacher.token, "Free Rust", 0.0, &[1], "published").await;
        create_course(&client, &teacher.token, "Paid Rust", 5000.0, &[1], "published").await;

        let response = client
            .get("/api/v1/courses?level=beginner&price=free")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let page: Page<CourseSummary> = response.into_json().await.expect("invalid page json");
        let titles: Vec<&str> = page.items.iter().map(|it| it.title.as_str()).collect();
        assert_eq!(titles, vec!["Free Rust"]);

        let response = client
            .get("/api/v1/courses?search=rust&len=1&page=1")
            .dispatch()
            .await;
        let page: Page<CourseSummary> = response.into_json().await.expect("invalid page json");
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);
    }

    #[rocket::async_test]
    async fn only_the_owner_edits_a_course() {
        let client = client().await;
        let owner = signup_as(&client, "course_edit_owner", Role::Instructor).await;
        let other = signup_as(&client, "course_edit_other", Role::Instructor).await;
        let created = create_course(&client, &owner.token, "Rust", 0.0, &[1], "published").await;
        let uri = format!("/api/v1/course/{}", created.course.id);

        let response = client
            .put(uri.clone())
            .header(bearer(&other.token))
            .header(ContentType::JSON)
            .body(r#"{"title":"Hijacked"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .put(uri)
            .header(bearer(&owner.token))
            .header(ContentType::JSON)
            .body(r#"{"title":"Rust in Practice","price":100}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let updated: CourseResponse = response.into_json().await.expect("invalid course json");
        assert_eq!(updated.course.title, "Rust in Practice");
        assert_eq!(updated.course.revision, created.course.revision + 1);
    }

    #[rocket::async_test]
    async fn modules_can_be_added_updated_and_removed() {
        let client = client().await;
        let owner = signup_as(&client, "course_modules_owner", Role::Instructor).await;
        let created = create_course(&client, &owner.token, "Rust", 0.0, &[2], "draft").await;
        let id = created.course.id;

        let response = client
            .post(format!("/api/v1/course/{}/module", id))
            .header(bearer(&owner.token))
            .header(ContentType::JSON)
            .body(r#"{"title":"Ownership","lessons":[{"title":"Borrowing","type":"text"}]}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let course: CourseResponse = response.into_json().await.expect("invalid course json");
        assert_eq!(course.course.modules.len(), 2);
        let added = course.course.modules[1].id;

        let response = client
            .put(format!("/api/v1/course/{}/module/{}", id, added))
            .header(bearer(&owner.token))
            .header(ContentType::JSON)
            .body(r#"{"title":"Ownership and Borrowing"}"#)
            .dispatch()
            .await;
        let course: CourseResponse = response.into_json().await.expect("invalid course json");
        assert_eq!(course.course.modules[1].title, "Ownership and Borrowing");
        assert_eq!(course.course.modules[1].lessons.len(), 1);

        let response = client
            .delete(format!("/api/v1/course/{}/module/{}", id, added))
            .header(bearer(&owner.token))
            .dispatch()
            .await;
        let course: CourseResponse = response.into_json().await.expect("invalid course json");
        assert_eq!(course.course.modules.len(), 1);

        let response = client
            .delete(format!("/api/v1/course/{}/module/{}", id, Uuid::new_v4()))
            .header(bearer(&owner.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn deleting_a_course_removes_it_everywhere() {
        let client = client().await;
        let owner = signup_as(&client, "course_delete_owner", Role::Instructor).await;
        let student = signup(&client, "course_delete_student").await;
        let created = create_course(&client, &owner.token, "Rust", 0.0, &[1], "published").await;
        let id = created.course.id;

        let response = client
            .post(format!("/api/v1/course/{}/enroll", id))
            .header(bearer(&student.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .delete(format!("/api/v1/course/{}", id))
            .header(bearer(&owner.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let me = store(&client)
            .enrolled_courses(student.id)
            .await
            .expect("enrollments listed");
        assert!(me.is_empty());

        let response = client.get("/api/v1/courses").dispatch().await;
        let page: Page<CourseSummary> = response.into_json().await.expect("invalid page json");
        assert!(page.items.iter().all(|it| it.id != id));
    }

    #[rocket::async_test]
    async fn mine_lists_own_courses_in_any_status() {
        let client = client().await;
        let owner = signup_as(&client, "course_mine_owner", Role::Instructor).await;
        let other = signup_as(&client, "course_mine_other", Role::Instructor).await;
        create_course(&client, &owner.token, "Draft", 0.0, &[], "draft").await;
        create_course(&client, &owner.token, "Live", 0.0, &[], "published").await;
        create_course(&client, &other.token, "Not mine", 0.0, &[], "published").await;

        let response = client
            .get("/api/v1/courses/mine")
            .header(bearer(&owner.token))
            .dispatch()
            .await;
        let mine: Vec<CourseSummary> = response.into_json().await.expect("invalid json");
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|it| it.instructor_id == owner.id));
    }

    #[rocket::async_test]
    async fn analytics_and_students_are_for_managers() {
        let client = client().await;
        let owner = signup_as(&client, "course_stats_owner", Role::Instructor).await;
        let student = signup(&client, "course_stats_student").await;
        let created =
            create_course(&client, &owner.token, "Rust", 1200.0, &[1], "published").await;
        let id = created.course.id;

        client
            .post(format!("/api/v1/course/{}/enroll", id))
            .header(bearer(&student.token))
            .dispatch()
            .await;

        let response = client
            .get(format!("/api/v1/course/{}/analytics", id))
            .header(bearer(&student.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .get(format!("/api/v1/course/{}/analytics", id))
            .header(bearer(&owner.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let analytics: crate::data::analytics::CourseAnalytics =
            response.into_json().await.expect("invalid json");
        assert_eq!(analytics.total_students, 1);
        assert_eq!(analytics.total_revenue, 1200.0);
        assert_eq!(analytics.monthly_enrollments, 1);

        let response = client
            .get(format!("/api/v1/course/{}/students", id))
            .header(bearer(&owner.token))
            .dispatch()
            .await;
        let students: Vec<crate::data::analytics::EnrolledStudent> =
            response.into_json().await.expect("invalid json");
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].id, student.id);
    }
}
