use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::SessionSettings;
use crate::data::course::Course;

/// A scheduled live session. Issued and stored by the server, so ids survive reloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LiveSession {
    pub id: Uuid,
    pub course_id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub description: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub meet_link: String,
    /// Withheld from clients until the session has taken place.
    pub recording_url: Option<String>,
    pub max_participants: u32,
}

impl LiveSession {
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at <= now
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ScheduleRequest {
    /// First day of the schedule. Defaults to today.
    pub starts_on: Option<DateTime<Utc>>,
}

/// Generates the live-session schedule for a course.
///
/// Module `m` gets `min(max(lessons, 1), per_module_cap)` sessions; session `i` of it is held
/// `m * days_between_modules + i * days_between_sessions` days after `starts_on`, at `hour_utc`.
pub fn generate_schedule(
    course: &Course,
    starts_on: DateTime<Utc>,
    settings: &SessionSettings,
) -> Vec<LiveSession> {
    let time = NaiveTime::from_hms_opt(settings.hour_utc.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let first_day = starts_on.date_naive().and_time(time).and_utc();

    let mut sessions = Vec::new();
    for (module_index, module) in course.modules.iter().enumerate() {
        let count = module.lessons.len().max(1).min(settings.per_module_cap);

        for i in 0..count {
            let offset = module_index as i64 * settings.days_between_modules
                + i as i64 * settings.days_between_sessions;
            let id = Uuid::new_v4();

            sessions.push(LiveSession {
                id,
                course_id: course.id,
                module_id: module.id,
                title: format!("{} - Session {}", module.title, i + 1),
                description: format!("Live session covering {}", module.title),
                scheduled_at: first_day + Duration::days(offset),
                duration_minutes: settings.duration_minutes,
                meet_link: format!("{}/{}", settings.meet_link_base.trim_end_matches('/'), id),
                recording_url: Some(format!(
                    "{}/{}",
                    settings.recording_base.trim_end_matches('/'),
                    id
                )),
                max_participants: settings.max_participants,
            });
        }
    }

    sessions.sort_by_key(|it| it.scheduled_at);
    sessions
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: LiveSession,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Scheduled,
    Completed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SessionSchedule {
    pub upcoming: Vec<SessionView>,
    pub past: Vec<SessionView>,
}

impl SessionSchedule {
    /// Splits sessions around `now`, both halves in chronological order.
    pub fn partition(mut sessions: Vec<LiveSession>, now: DateTime<Utc>) -> SessionSchedule {
        sessions.sort_by_key(|it| it.scheduled_at);

        let mut schedule = SessionSchedule::default();
        for mut session in sessions {
            if session.is_past(now) {
                schedule.past.push(SessionView {
                    session,
                    status: SessionStatus::Completed,
                });
            } else {
                session.recording_url = None;
                schedule.upcoming.push(SessionView {
                    session,
                    status: SessionStatus::Scheduled,
                });
            }
        }
        schedule
    }

    pub fn len(&self) -> usize {
        self.upcoming.len() + self.past.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Session doesn't exist.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn not_held_yet(id: Uuid) -> Problem {
        Problem::new_untyped(Status::Conflict, "Session hasn't taken place yet.")
            .insert("id", id.to_string())
            .clone()
    }
}
