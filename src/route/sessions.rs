use chrono::Utc;
use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::config::Config;
use crate::data::attendance::{
    problem as attendance_problem, AttendanceLog, AttendanceOutcome, AttendanceRecord,
    AttendanceResponse, MarkAttendance,
};
use crate::data::enrollment::problem as enrollment_problem;
use crate::data::session::{generate_schedule, problem, ScheduleRequest, SessionSchedule};
use crate::feed::{ChangeEvent, ChangeFeed};
use crate::resp::jwt::CurrentUser;
use crate::resp::problem::Problem;
use crate::route::courses::{managed_course, visible_course};
use crate::store::StoreHandle;

/// Generate the live-session schedule of a course
///
/// Replaces any schedule generated earlier. Attendance of sessions that are no longer scheduled
/// is dropped.
#[utoipa::path(
    params(("id", description = "course ID")),
    request_body(content = ScheduleRequest, description = "Optional first day, today by default"),
    responses(
        (status = 200, description = "New schedule", body = SessionSchedule),
        (status = 403, description = "Course isn't managed by user", body = Problem),
        (status = 404, description = "Course doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/course/<id>/sessions", data = "<request>")]
#[tracing::instrument(skip(store, config))]
pub async fn session_schedule(
    id: Uuid,
    request: Option<Json<ScheduleRequest>>,
    user: CurrentUser,
    store: &State<StoreHandle>,
    config: &State<Config>,
) -> Result<Json<SessionSchedule>, Problem> {
    let course = managed_course(store, id, &user).await?;

    let now = Utc::now();
    let starts_on = request.and_then(|it| it.starts_on).unwrap_or(now);
    let sessions = generate_schedule(&course, starts_on, &config.sessions);
    store.replace_sessions(id, &sessions).await?;
    tracing::info!("scheduled {} sessions for {}", sessions.len(), id);

    Ok(Json(SessionSchedule::partition(sessions, now)))
}

/// Live sessions of a course
#[utoipa::path(
    params(("id", description = "course ID")),
    responses(
        (status = 200, description = "Upcoming and past sessions", body = SessionSchedule),
        (status = 403, description = "Not enrolled in the course", body = Problem),
        (status = 404, description = "Course doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/course/<id>/sessions")]
#[tracing::instrument(skip(store))]
pub async fn session_list(
    id: Uuid,
    user: CurrentUser,
    store: &State<StoreHandle>,
) -> Result<Json<SessionSchedule>, Problem> {
    let course = visible_course(store, id, &user).await?;
    if !course.is_managed_by(&user) && !store.is_enrolled(id, user.id).await? {
        return Err(enrollment_problem::not_enrolled(id));
    }

    let sessions = store.sessions_for_course(id).await?;
    Ok(Json(SessionSchedule::partition(sessions, Utc::now())))
}

/// Mark attendance for a past session
#[utoipa::path(
    params(("id", description = "course ID")),
    request_body = MarkAttendance,
    responses(
        (status = 200, description = "Updated attendance log", body = AttendanceResponse),
        (status = 403, description = "Not enrolled in the course", body = Problem),
        (status = 404, description = "Course or session doesn't exist", body = Problem),
        (status = 409, description = "Session is upcoming or already recorded", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/course/<id>/attendance", format = "json", data = "<mark>")]
#[tracing::instrument(skip(store, feed))]
pub async fn attendance_mark(
    id: Uuid,
    mark: Json<MarkAttendance>,
    user: CurrentUser,
    store: &State<StoreHandle>,
    feed: &State<ChangeFeed>,
) -> Result<Json<AttendanceResponse>, Problem> {
    let course = visible_course(store, id, &user).await?;
    if !store.is_enrolled(id, user.id).await? {
        return Err(enrollment_problem::not_enrolled(id));
    }

    let sessions = store.sessions_for_course(id).await?;
    let session = sessions
        .iter()
        .find(|it| it.id == mark.session_id)
        .ok_or_else(|| problem::not_found(mark.session_id))?;

    let now = Utc::now();
    if !session.is_past(now) {
        return Err(problem::not_held_yet(session.id));
    }

    let record = AttendanceRecord {
        session_id: session.id,
        attended: mark.attended,
        timestamp: now,
        student_id: user.id,
    };
    let log = match store.record_attendance(id, user.id, &record).await? {
        AttendanceOutcome::Recorded(log) => log,
        AttendanceOutcome::AlreadyRecorded(_) => {
            return Err(attendance_problem::already_recorded(session.id))
        }
        // Rescheduled since the lookup above.
        AttendanceOutcome::UnknownSession => return Err(problem::not_found(session.id)),
    };
    feed.publish(ChangeEvent::AttendanceMarked {
        course_id: id,
        user_id: user.id,
        instructor_id: course.instructor_id,
        session_id: session.id,
        attended: mark.attended,
    });

    Ok(Json(log.into()))
}

/// Attendance of the signed in user in a course
#[utoipa::path(
    params(("id", description = "course ID")),
    responses(
        (status = 200, description = "Attendance log with its summary", body = AttendanceResponse),
        (status = 403, description = "Not enrolled in the course", body = Problem),
        (status = 404, description = "Course doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/course/<id>/attendance")]
#[tracing::instrument(skip(store))]
pub async fn attendance_get(
    id: Uuid,
    user: CurrentUser,
    store: &State<StoreHandle>,
) -> Result<Json<AttendanceResponse>, Problem> {
    visible_course(store, id, &user).await?;
    if !store.is_enrolled(id, user.id).await? {
        return Err(enrollment_problem::not_enrolled(id));
    }

    let log = store
        .attendance_log(id, user.id)
        .await?
        .unwrap_or_else(|| AttendanceLog::empty(id, user.id));
    Ok(Json(log.into()))
}

///////////////////////
//       TESTS
///////////////////////
