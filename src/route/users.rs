use chrono::Utc;
use rocket::form::Form;
use rocket::http::{Cookie, CookieJar, Status};
use rocket::serde::json::Json;
use rocket::State;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::data::analytics::RoleCounts;
use crate::data::course::db::problem as course_problem;
use crate::data::enrollment::problem as enrollment_problem;
use crate::data::user::db::problem as user_problem;
use crate::data::user::db::{
    LessonCompletion, ProfileUpdate, RoleChange, UserLoginData, UserQuery, UserSignupData,
};
use crate::data::user::{
    normalize_email, CourseProgress, LessonProgress, User, UserCreatedResponse, UserResponse,
};
use crate::error::StoreError;
use crate::feed::{ChangeEvent, ChangeFeed};
use crate::middleware::paging::{PageState, UserPage};
use crate::resp::jwt::{CurrentUser, UserRoleToken, AUTH_COOKIE_NAME};
use crate::resp::problem::{problems, Problem};
use crate::role::Role;
use crate::security::Security;
use crate::store::StoreHandle;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserListResponse {
    pub users: UserPage,
    /// Counts across all users, regardless of the query.
    pub roles: RoleCounts,
}

async fn user_response(store: &StoreHandle, user: User) -> Result<UserResponse, Problem> {
    let enrolled = store.enrolled_courses(user.id).await?;
    Ok(UserResponse::new(user, enrolled))
}

/// Issues a fresh token cookie and returns the response carrying the same token.
fn signed_in(
    user: &User,
    cookies: &CookieJar<'_>,
    security: &Security,
) -> Result<Json<UserCreatedResponse>, Problem> {
    let token = UserRoleToken::new(user, security);
    cookies.add(token.cookie(security)?);
    Ok(Json(UserCreatedResponse::new(
        user,
        token.encode_jwt(security)?,
    )))
}

/// Signing up again with the right password behaves like signing in.
fn existing_account(existing: User, password: &str, security: &Security) -> Result<User, Problem> {
    if existing.pw_hash.matches(password, security) {
        Ok(existing)
    } else {
        Err(user_problem::bad_email(
            existing.email,
            "An account with this e-mail already exists.",
        ))
    }
}

/// Create a user account
#[utoipa::path(
    request_body(content = UserSignupData, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Account created or signed in", body = UserCreatedResponse),
        (status = 400, description = "Invalid sign up data", body = Problem),
    )
)]
#[post("/user", data = "<signup>")]
#[tracing::instrument(skip(cookies, store, security, config, feed))]
pub async fn user_create(
    signup: Form<UserSignupData>,
    cookies: &CookieJar<'_>,
    store: &State<StoreHandle>,
    security: &State<Security>,
    config: &State<Config>,
    feed: &State<ChangeFeed>,
) -> Result<Json<UserCreatedResponse>, Problem> {
    signup.validate()?;
    let signup = signup.into_inner();

    let user = match store.get_user(signup.id()).await? {
        Some(existing) => existing_account(existing, &signup.password, security)?,
        None => {
            let mut user = User::new(
                &signup.email,
                signup.display_name.trim(),
                &signup.password,
                security,
            );
            if config
                .admin_emails
                .iter()
                .any(|it| normalize_email(it) == user.email)
            {
                user.role = Role::Admin;
            }

            match store.insert_user(&user).await {
                Ok(()) => {
                    feed.publish(ChangeEvent::ProfileUpdated { user_id: user.id });
                    user
                }
                // Lost a race against a concurrent sign up for the same e-mail.
                Err(StoreError::Conflict) => {
                    let existing = store
                        .get_user(user.id)
                        .await?
                        .ok_or_else(|| user_problem::not_found(user.id))?;
                    existing_account(existing, &signup.password, security)?
                }
                Err(other) => return Err(other.into()),
            }
        }
    };

    signed_in(&user, cookies, security)
}

/// Sign in
#[utoipa::path(
    request_body(content = UserLoginData, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Signed in", body = UserCreatedResponse),
        (status = 401, description = "Bad e-mail or password", body = Problem),
    )
)]
#[post("/login", data = "<login_user>")]
#[tracing::instrument(skip(cookies, store, security))]
pub async fn login_submit(
    login_user: Form<UserLoginData>,
    cookies: &CookieJar<'_>,
    store: &State<StoreHandle>,
    security: &State<Security>,
) -> Result<Json<UserCreatedResponse>, Problem> {
    login_user.validate()?;

    // TODO: rate-limit failed logins per source address

    let user = store
        .find_user_by_email(&login_user.email)
        .await?
        .ok_or_else(user_problem::bad_login)?;

    if !user.pw_hash.matches(&login_user.password, security) {
        return Err(user_problem::bad_login());
    }

    signed_in(&user, cookies, security)
}

/// Sign out
#[utoipa::path(responses((status = 204, description = "Auth cookie removed")))]
#[post("/logout")]
pub fn logout(cookies: &CookieJar<'_>) -> Status {
    cookies.remove(Cookie::build(AUTH_COOKIE_NAME).path("/"));
    Status::NoContent
}

/// Get the signed in user
#[utoipa::path(
    responses(
        (status = 200, description = "Signed in user", body = UserResponse),
        (status = 401, description = "Missing/expired token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/user/me")]
#[tracing::instrument(skip(store))]
pub async fn user_me(
    user: CurrentUser,
    store: &State<StoreHandle>,
) -> Result<Json<UserResponse>, Problem> {
    Ok(Json(user_response(store, user.0).await?))
}

/// Update the signed in user's profile
#[utoipa::path(
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 400, description = "Invalid profile data", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/user/me", format = "json", data = "<update>")]
#[tracing::instrument(skip(store, feed))]
pub async fn user_update(
    update: Json<ProfileUpdate>,
    user: CurrentUser,
    store: &State<StoreHandle>,
    feed: &State<ChangeFeed>,
) -> Result<Json<UserResponse>, Problem> {
    update.validate()?;

    let display_name = match &update.display_name {
        Some(name) => name.trim().to_string(),
        None => user.display_name.clone(),
    };
    let updated = store
        .update_profile(user.id, &display_name)
        .await?
        .ok_or_else(|| user_problem::not_found(user.id))?;

    feed.publish(ChangeEvent::ProfileUpdated { user_id: user.id });
    Ok(Json(user_response(store, updated).await?))
}

/// Get user information
#[utoipa::path(
    params(("id", description = "user ID")),
    responses(
        (status = 200, description = "Information about existing user", body = UserResponse),
        (status = 403, description = "Not the same user or an admin", body = Problem),
        (status = 404, description = "Querried user doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/user/<id>")]
#[tracing::instrument(skip(store))]
pub async fn user_get(
    id: Uuid,
    user: CurrentUser,
    store: &State<StoreHandle>,
) -> Result<Json<UserResponse>, Problem> {
    if user.id != id && !user.role.is_admin() {
        return Err(problems::forbidden("Only admins can view other users."));
    }

    let found = store
        .get_user(id)
        .await?
        .ok_or_else(|| user_problem::not_found(id))?;
    Ok(Json(user_response(store, found).await?))
}

/// Delete a user
#[utoipa::path(
    params(("id", description = "user ID")),
    responses(
        (status = 200, description = "ID of the deleted user", body = String),
        (status = 403, description = "Not the same user or an admin", body = Problem),
        (status = 404, description = "Querried user doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/user/<id>")]
#[tracing::instrument(skip(cookies, store, feed))]
pub async fn user_delete(
    id: Uuid,
    user: CurrentUser,
    cookies: &CookieJar<'_>,
    store: &State<StoreHandle>,
    feed: &State<ChangeFeed>,
) -> Result<String, Problem> {
    if user.id != id && !user.role.is_admin() {
        return Err(problems::forbidden("Only admins can delete other users."));
    }

    let removed = store
        .delete_user(id)
        .await?
        .ok_or_else(|| user_problem::not_found(id))?;

    if user.id == id {
        cookies.remove(Cookie::build(AUTH_COOKIE_NAME).path("/"));
    }
    feed.publish(ChangeEvent::ProfileUpdated { user_id: id });
    Ok(removed.id.to_string())
}

/// List users
#[utoipa::path(
    params(
        UserQuery,
        ("page" = Option<u32>, Query, description = "Page index, starting at 0"),
        ("len" = Option<u32>, Query, description = "Page length"),
    ),
    responses(
        (status = 200, description = "Matching users", body = UserListResponse),
        (status = 403, description = "Not an admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/users?<query..>")]
#[tracing::instrument(skip(store))]
pub async fn user_list(
    query: UserQuery,
    paging: PageState,
    user: CurrentUser,
    store: &State<StoreHandle>,
) -> Result<Json<UserListResponse>, Problem> {
    if !user.role.is_admin() {
        return Err(problems::forbidden("Only admins can list users."));
    }

    let users = store.list_users().await?;
    let roles = RoleCounts::count(&users);

    let mut matching = Vec::new();
    for found in users.into_iter().filter(|it| query.matches(it)) {
        matching.push(user_response(store, found).await?);
    }

    Ok(Json(UserListResponse {
        users: paging.apply(matching),
        roles,
    }))
}

/// Change a user's role
#[utoipa::path(
    params(("id", description = "user ID")),
    request_body = RoleChange,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 403, description = "Not an admin, or changing own role", body = Problem),
        (status = 404, description = "Querried user doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/user/<id>/role", format = "json", data = "<change>")]
#[tracing::instrument(skip(store, feed))]
pub async fn user_set_role(
    id: Uuid,
    change: Json<RoleChange>,
    user: CurrentUser,
    store: &State<StoreHandle>,
    feed: &State<ChangeFeed>,
) -> Result<Json<UserResponse>, Problem> {
    if !user.role.is_admin() {
        return Err(problems::forbidden("Only admins can change roles."));
    }
    if user.id == id {
        return Err(problems::forbidden("Admins can't change their own role."));
    }

    let updated = store
        .set_user_role(id, change.role, user.id)
        .await?
        .ok_or_else(|| user_problem::not_found(id))?;
    tracing::info!("{} changed role of {} to {}", user.id, id, change.role);

    feed.publish(ChangeEvent::ProfileUpdated { user_id: id });
    Ok(Json(user_response(store, updated).await?))
}

/// Record lesson progress
#[utoipa::path(
    params(
        ("course", description = "course ID"),
        ("lesson", description = "lesson ID"),
    ),
    request_body = LessonCompletion,
    responses(
        (status = 200, description = "Progress in the course", body = CourseProgress),
        (status = 403, description = "Not enrolled in the course", body = Problem),
        (status = 404, description = "Course or lesson doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/user/me/progress/<course>/<lesson>", format = "json", data = "<completion>")]
#[tracing::instrument(skip(store, feed))]
pub async fn lesson_progress(
    course: Uuid,
    lesson: Uuid,
    completion: Json<LessonCompletion>,
    user: CurrentUser,
    store: &State<StoreHandle>,
    feed: &State<ChangeFeed>,
) -> Result<Json<CourseProgress>, Problem> {
    let found = store
        .get_course(course)
        .await?
        .filter(|it| it.is_visible_to(&user))
        .ok_or_else(|| course_problem::not_found(course))?;
    if found.find_lesson(lesson).is_none() {
        return Err(course_problem::lesson_not_found(course, lesson));
    }
    if !store.is_enrolled(course, user.id).await? {
        return Err(enrollment_problem::not_enrolled(course));
    }

    let progress = LessonProgress {
        completed: completion.completed,
        completed_at: completion.completed.then(Utc::now),
    };
    let updated = store
        .set_lesson_progress(user.id, course, lesson, progress)
        .await?
        .ok_or_else(|| user_problem::not_found(user.id))?;

    feed.publish(ChangeEvent::ProfileUpdated { user_id: user.id });
    Ok(Json(
        updated.course_progress(course).cloned().unwrap_or_default(),
    ))
}

///////////////////////
//       TESTS
///////////////////////
