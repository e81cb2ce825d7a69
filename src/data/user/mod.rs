use chrono::{DateTime, Utc};
use crypto::bcrypt::bcrypt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

use crate::role::Role;
use crate::security::Security;

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PasswordHash(Vec<u8>);

impl PasswordHash {
    pub fn new(password: impl AsRef<str>, security: &Security) -> PasswordHash {
        let mut pw_hash: [u8; 24] = [0; 24];

        let mut sha = Sha256::new();
        sha2::Digest::update(&mut sha, password.as_ref().as_bytes());

        bcrypt(
            security.password_cost,
            &security.salt,
            sha.finalize().as_slice(),
            &mut pw_hash,
        );

        PasswordHash(pw_hash.to_vec())
    }

    pub fn matches(&self, password: impl AsRef<str>, security: &Security) -> bool {
        *self == PasswordHash::new(password, security)
    }
}

/// Account id derived from the e-mail, so an account's profile can only be created once.
pub fn user_id_for(email: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, normalize_email(email).as_bytes())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LessonProgress {
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CourseProgress {
    /// Keyed by lesson id.
    #[serde(default)]
    pub lessons: BTreeMap<String, LessonProgress>,
    #[serde(default)]
    pub attended_sessions: u32,
    #[serde(default)]
    pub total_sessions: u32,
    #[serde(default)]
    pub progress_percentage: u32,
    #[serde(default)]
    pub last_session_attended: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl Default for CourseProgress {
    fn default() -> Self {
        CourseProgress {
            lessons: BTreeMap::new(),
            attended_sessions: 0,
            total_sessions: 0,
            progress_percentage: 0,
            last_session_attended: None,
            last_updated: Utc::now(),
        }
    }
}

/// Session progress written after attendance is marked. Lesson progress is tracked separately.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionProgress {
    pub attended_sessions: u32,
    pub total_sessions: u32,
    pub progress_percentage: u32,
    pub last_session_attended: DateTime<Utc>,
}

impl CourseProgress {
    pub fn apply_sessions(&mut self, update: &SessionProgress) {
        self.attended_sessions = update.attended_sessions;
        self.total_sessions = update.total_sessions;
        self.progress_percentage = update.progress_percentage;
        self.last_session_attended = Some(update.last_session_attended);
        self.last_updated = Utc::now();
    }

    pub fn completed_lessons(&self) -> usize {
        self.lessons.values().filter(|it| it.completed).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    pub pw_hash: PasswordHash,
    #[serde(default)]
    pub role: Role,
    /// Keyed by course id.
    #[serde(default)]
    pub progress: BTreeMap<String, CourseProgress>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,

    #[serde(default)]
    pub bootstrap_admin: bool,
    #[serde(default)]
    pub role_changed_by: Option<Uuid>,
    #[serde(default)]
    pub role_changed_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(
        email: impl AsRef<str>,
        display_name: impl ToString,
        password: impl AsRef<str>,
        security: &Security,
    ) -> User {
        let email = normalize_email(email.as_ref());
        let id = user_id_for(&email);
        tracing::info!("Creating a new user with UUID: {}", id);

        let now = Utc::now();
        User {
            id,
            email,
            display_name: display_name.to_string(),
            pw_hash: PasswordHash::new(password, security),
            role: Role::Student,
            progress: BTreeMap::new(),
            created_at: now,
            last_updated: now,
            bootstrap_admin: false,
            role_changed_by: None,
            role_changed_at: None,
        }
    }

    /// Name shown to other users, falling back to the e-mail.
    pub fn name(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.email
        } else {
            &self.display_name
        }
    }

    pub fn course_progress(&self, course: Uuid) -> Option<&CourseProgress> {
        self.progress.get(&course.to_string())
    }

    /// Share of the course schedule the user attended, as last recorded.
    pub fn progress_percentage(&self, course: Uuid) -> u32 {
        self.course_progress(course)
            .map(|it| it.progress_percentage)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub enrolled_courses: Vec<Uuid>,
    pub progress: BTreeMap<String, CourseProgress>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub bootstrap_admin: bool,
}

impl UserResponse {
    pub fn new(user: User, enrolled_courses: Vec<Uuid>) -> UserResponse {
        UserResponse {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            role: user.role,
            enrolled_courses,
            progress: user.progress,
            created_at: user.created_at,
            last_updated: user.last_updated,
            bootstrap_admin: user.bootstrap_admin,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserCreatedResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    /// Same token as the `jwt_auth` cookie, for clients sending bearer tokens.
    pub token: String,
}

impl UserCreatedResponse {
    pub fn new(user: &User, token: String) -> UserCreatedResponse {
        UserCreatedResponse {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
            token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn ids_ignore_email_case_and_whitespace() {
        assert_eq!(user_id_for("Ada@Example.com "), user_id_for("ada@example.com"));
        assert_ne!(user_id_for("ada@example.com"), user_id_for("bob@example.com"));
    }

    #[test]
    fn password_hash_depends_on_salt() {
        let config = Config::testing();
        let a = Security::ephemeral(&config);
        let b = Security::ephemeral(&config);

        let hash = PasswordHash::new("correct horse", &a);
        assert!(hash.matches("correct horse", &a));
        assert!(!hash.matches("wrong horse", &a));
        assert!(!hash.matches("correct horse", &b));
    }

    #[test]
    fn name_falls_back_to_email() {
        let security = Security::ephemeral(&Config::testing());
        let mut user = User::new("ada@example.com", "", "password123", &security);
        assert_eq!(user.name(), "ada@example.com");
        user.display_name = "Ada".to_string();
        assert_eq!(user.name(), "Ada");
    }
}
