use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod catalog;
pub mod db;

use crate::data::user::User;
use crate::role::Role;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl Default for CourseLevel {
    fn default() -> Self {
        CourseLevel::Beginner
    }
}

#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, FromFormField, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    #[field(value = "draft")]
    Draft,
    #[field(value = "published")]
    Published,
    #[field(value = "archived")]
    Archived,
}

impl CourseStatus {
    pub const ALL: [CourseStatus; 3] = [
        CourseStatus::Draft,
        CourseStatus::Published,
        CourseStatus::Archived,
    ];
}

impl Default for CourseStatus {
    fn default() -> Self {
        CourseStatus::Draft
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LessonType {
    Video,
    Text,
    Quiz,
    Assignment,
}

impl Default for LessonType {
    fn default() -> Self {
        LessonType::Video
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Lesson {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub title: String,
    #[serde(default, rename = "type")]
    pub lesson_type: LessonType,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Module {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Module {
    pub fn has_lesson(&self, lesson: Uuid) -> bool {
        self.lessons.iter().any(|it| it.id == lesson)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Zero for free courses.
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub level: CourseLevel,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub instructor_id: Uuid,
    pub instructor_name: String,
    #[serde(default)]
    pub status: CourseStatus,
    #[serde(default)]
    pub modules: Vec<Module>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Incremented on every write; used to reject concurrent read-modify-write updates.
    #[serde(default)]
    pub revision: u64,
}

impl Course {
    pub fn is_free(&self) -> bool {
        self.price <= 0.0
    }

    pub fn is_published(&self) -> bool {
        self.status == CourseStatus::Published
    }

    pub fn is_managed_by(&self, user: &User) -> bool {
        user.role == Role::Admin || (user.role.can_author() && self.instructor_id == user.id)
    }

    /// Published courses are visible to everyone, the rest only to the people managing them.
    pub fn is_visible_to(&self, user: &User) -> bool {
        self.is_published() || self.is_managed_by(user)
    }

    pub fn find_lesson(&self, lesson: Uuid) -> Option<&Lesson> {
        self.modules
            .iter()
            .flat_map(|it| it.lessons.iter())
            .find(|it| it.id == lesson)
    }

    pub fn lesson_count(&self) -> usize {
        self.modules.iter().map(|it| it.lessons.len()).sum()
    }

    /// Marks the course as written, bumping the revision.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.revision += 1;
    }
}

/// A course together with its derived enrollment data.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseResponse {
    #[serde(flatten)]
    pub course: Course,
    pub enrolled_students: Vec<Uuid>,
    pub total_students: usize,
}

impl CourseResponse {
    pub fn new(course: Course, enrolled_students: Vec<Uuid>) -> CourseResponse {
        CourseResponse {
            total_students: enrolled_students.len(),
            course,
            enrolled_students,
        }
    }
}

/// Catalog entry without module content.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseSummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub level: CourseLevel,
    pub duration: String,
    pub tags: Vec<String>,
    pub instructor_id: Uuid,
    pub instructor_name: String,
    pub status: CourseStatus,
    pub module_count: usize,
    pub lesson_count: usize,
    pub total_students: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CourseSummary {
    pub fn new(course: &Course, total_students: usize) -> CourseSummary {
        CourseSummary {
            id: course.id,
            title: course.title.clone(),
            description: course.description.clone(),
            price: course.price,
            level: course.level,
            duration: course.duration.clone(),
            tags: course.tags.clone(),
            instructor_id: course.instructor_id,
            instructor_name: course.instructor_name.clone(),
            status: course.status,
            module_count: course.modules.len(),
            lesson_count: course.lesson_count(),
            total_students,
            created_at: course.created_at,
            updated_at: course.updated_at,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn course(title: &str, level: CourseLevel, price: f64, status: CourseStatus) -> Course {
        let now = Utc::now();
        Course {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: format!("All about {}", title),
            price,
            level,
            duration: "4 weeks".to_string(),
            tags: vec![],
            instructor_id: Uuid::new_v4(),
            instructor_name: "Instructor".to_string(),
            status,
            modules: vec![],
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn module(title: &str, lessons: usize) -> Module {
        Module {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: String::new(),
            lessons: (0..lessons)
                .map(|i| Lesson {
                    id: Uuid::new_v4(),
                    title: format!("{} lesson {}", title, i + 1),
                    lesson_type: LessonType::Video,
                    duration: "30 minutes".to_string(),
                    content: String::new(),
                })
                .collect(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::config::Config;
    use crate::security::Security;

    #[test]
    fn drafts_are_only_visible_to_their_managers() {
        let security = Security::ephemeral(&Config::testing());
        let mut owner = User::new("owner@example.com", "Owner", "password123", &security);
        owner.role = Role::Instructor;
        let mut other = User::new("other@example.com", "Other", "password123", &security);
        other.role = Role::Instructor;
        let mut admin = User::new("admin@example.com", "Admin", "password123", &security);
        admin.role = Role::Admin;

        let mut draft = course("Rust", CourseLevel::Beginner, 0.0, CourseStatus::Draft);
        draft.instructor_id = owner.id;

        assert!(draft.is_visible_to(&owner));
        assert!(draft.is_visible_to(&admin));
        assert!(!draft.is_visible_to(&other));

        draft.status = CourseStatus::Published;
        assert!(draft.is_visible_to(&other));
        assert!(!draft.is_managed_by(&other));
    }

    #[test]
    fn demoted_instructor_no_longer_manages_course() {
        let security = Security::ephemeral(&Config::testing());
        let mut owner = User::new("owner@example.com", "Owner", "password123", &security);
        let mut draft = course("Rust", CourseLevel::Beginner, 0.0, CourseStatus::Draft);
        draft.instructor_id = owner.id;

        owner.role = Role::Student;
        assert!(!draft.is_managed_by(&owner));
    }

    #[test]
    fn total_students_matches_enrolled_list() {
        let c = course("Rust", CourseLevel::Beginner, 0.0, CourseStatus::Published);
        let response = CourseResponse::new(c, vec![Uuid::new_v4(), Uuid::new_v4()]);
        assert_eq!(response.total_students, response.enrolled_students.len());
    }

    #[test]
    fn lesson_type_uses_type_key() {
        let lesson: Lesson =
            serde_json::from_str(r#"{"title":"Intro","type":"quiz"}"#).expect("valid lesson");
        assert_eq!(lesson.lesson_type, LessonType::Quiz);
    }
}
