//! Server-side publish/subscribe hub for data change notifications.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::course::CourseStatus;
use crate::role::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    CourseUpserted {
        course_id: Uuid,
        instructor_id: Uuid,
        status: CourseStatus,
    },
    CourseDeleted {
        course_id: Uuid,
    },
    ProfileUpdated {
        user_id: Uuid,
    },
    Enrolled {
        course_id: Uuid,
        user_id: Uuid,
        instructor_id: Uuid,
    },
    AttendanceMarked {
        course_id: Uuid,
        user_id: Uuid,
        instructor_id: Uuid,
        session_id: Uuid,
        attended: bool,
    },
}

impl ChangeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChangeEvent::CourseUpserted { .. } => "course_upserted",
            ChangeEvent::CourseDeleted { .. } => "course_deleted",
            ChangeEvent::ProfileUpdated { .. } => "profile_updated",
            ChangeEvent::Enrolled { .. } => "enrolled",
            ChangeEvent::AttendanceMarked { .. } => "attendance_marked",
        }
    }

    pub fn is_visible_to(&self, user: Uuid, role: Role) -> bool {
        if role.is_admin() {
            return true;
        }
        match self {
            ChangeEvent::CourseUpserted { .. } | ChangeEvent::CourseDeleted { .. } => true,
            ChangeEvent::ProfileUpdated { user_id } => *user_id == user,
            ChangeEvent::Enrolled {
                user_id,
                instructor_id,
                ..
            }
            | ChangeEvent::AttendanceMarked {
                user_id,
                instructor_id,
                ..
            } => *user_id == user || *instructor_id == user,
        }
    }
}

/// Owned by the server and shared with every handler that writes data.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> ChangeFeed {
        let (sender, _) = broadcast::channel(capacity.max(1));
        ChangeFeed { sender }
    }

    pub fn publish(&self, event: ChangeEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => tracing::trace!("published {} to {} subscribers", name, receivers),
            Err(_) => tracing::trace!("no subscribers for {}", name),
        }
    }

    pub fn subscribe(&self, user: Uuid, role: Role) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            user,
            role,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Events visible to one user. Dropping it unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<ChangeEvent>,
    user: Uuid,
    role: Role,
}

impl Subscription {
    /// Applies to every event received after the call.
    pub fn set_role(&mut self, role: Role) {
        if role != self.role {
            tracing::debug!("feed subscriber {} is now {}", self.user, role);
        }
        self.role = role;
    }

    /// Next visible event, or `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.is_visible_to(self.user, self.role) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("feed subscriber {} skipped {} events", self.user, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
