use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::enrollment::enrollment_id;
use crate::data::session::LiveSession;
use crate::data::user::SessionProgress;
use crate::util::percentage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceRecord {
    pub session_id: Uuid,
    pub attended: bool,
    pub timestamp: DateTime<Utc>,
    pub student_id: Uuid,
}

/// All attendance records of one user in one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceLog {
    pub id: Uuid,
    pub course_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub records: Vec<AttendanceRecord>,
}

impl AttendanceLog {
    pub fn empty(course: Uuid, user: Uuid) -> AttendanceLog {
        AttendanceLog {
            id: enrollment_id(course, user),
            course_id: course,
            user_id: user,
            records: vec![],
        }
    }

    pub fn record_for(&self, session: Uuid) -> Option<&AttendanceRecord> {
        self.records.iter().find(|it| it.session_id == session)
    }

    /// Drops records of sessions that are no longer scheduled.
    pub fn retain_sessions(&mut self, sessions: &[LiveSession]) {
        self.records
            .retain(|record| sessions.iter().any(|it| it.id == record.session_id));
    }

    pub fn last_attended(&self) -> Option<DateTime<Utc>> {
        self.records
            .iter()
            .filter(|it| it.attended)
            .map(|it| it.timestamp)
            .max()
    }

    pub fn attended_count(&self) -> usize {
        self.records.iter().filter(|it| it.attended).count()
    }

    pub fn summary(&self) -> AttendanceSummary {
        let attended = self.attended_count();
        let recorded = self.records.len();
        AttendanceSummary {
            attended,
            missed: recorded - attended,
            recorded,
            rate: percentage(attended, recorded),
        }
    }

    /// Course progress measured against the full schedule. Expects a log already pruned to
    /// that schedule.
    pub fn session_progress(&self, total_sessions: usize, now: DateTime<Utc>) -> SessionProgress {
        let attended = self.attended_count().min(total_sessions);
        SessionProgress {
            attended_sessions: attended as u32,
            total_sessions: total_sessions as u32,
            progress_percentage: percentage(attended, total_sessions),
            last_session_attended: self.last_attended().unwrap_or(now),
        }
    }
}

/// `rate` is attended over recorded sessions, not over every scheduled session.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceSummary {
    pub attended: usize,
    pub missed: usize,
    pub recorded: usize,
    pub rate: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttendanceOutcome {
    Recorded(AttendanceLog),
    AlreadyRecorded(AttendanceRecord),
    /// The session isn't part of the course's current schedule.
    UnknownSession,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MarkAttendance {
    pub session_id: Uuid,
    #[serde(default = "attended_default")]
    pub attended: bool,
}

fn attended_default() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AttendanceResponse {
    pub log: AttendanceLog,
    pub summary: AttendanceSummary,
}

impl From<AttendanceLog> for AttendanceResponse {
    fn from(log: AttendanceLog) -> Self {
        AttendanceResponse {
            summary: log.summary(),
            log,
        }
    }
}

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn already_recorded(session: Uuid) -> Problem {
        Problem::new_untyped(Status::Conflict, "Attendance already recorded.")
            .insert("session", session.to_string())
            .clone()
    }
}
