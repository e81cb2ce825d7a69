use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Course, CourseLevel, CourseStatus, Lesson, Module};
use crate::data::user::User;
use crate::resp::problem::Problem;

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Course doesn't exist.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn module_not_found(course: Uuid, module: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Module doesn't exist.")
            .insert("course", course.to_string())
            .insert("module", module.to_string())
            .clone()
    }

    #[inline]
    pub fn lesson_not_found(course: Uuid, lesson: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Lesson doesn't exist.")
            .insert("course", course.to_string())
            .insert("lesson", lesson.to_string())
            .clone()
    }

    #[inline]
    pub fn bad_course(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad course data.")
            .detail(detail)
            .clone()
    }

    #[inline]
    pub fn not_owned() -> Problem {
        crate::resp::problem::problems::forbidden("Course isn't managed by user.")
    }
}

fn validate_title(title: &str) -> Result<(), Problem> {
    if title.trim().is_empty() {
        return Err(problem::bad_course("Title can't be empty."));
    }
    if title.len() > 200 {
        return Err(problem::bad_course(
            "Title can't be longer than 200 characters (bytes).",
        ));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<(), Problem> {
    if !price.is_finite() || price < 0.0 {
        return Err(problem::bad_course("Price must be a non-negative number."));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CourseCreateData {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub level: CourseLevel,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: Option<CourseStatus>,
    #[serde(default)]
    pub modules: Vec<ModuleData>,
}

impl CourseCreateData {
    pub fn validate(&self) -> Result<(), Problem> {
        validate_title(&self.title)?;
        validate_price(self.price)?;
        self.modules.iter().try_for_each(ModuleData::validate)
    }

    /// Builds the course owned by `instructor`.
    pub fn into_course(self, instructor: &User) -> Course {
        let now = Utc::now();
        Course {
            id: Uuid::new_v4(),
            title: self.title.trim().to_string(),
            description: self.description,
            price: self.price,
            level: self.level,
            duration: self.duration,
            tags: self.tags,
            instructor_id: instructor.id,
            instructor_name: instructor.name().to_string(),
            status: self.status.unwrap_or_default(),
            modules: self.modules.into_iter().map(ModuleData::into_module).collect(),
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }
}

/// Partial course update. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CourseUpdateData {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub level: Option<CourseLevel>,
    pub duration: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<CourseStatus>,
}

impl CourseUpdateData {
    pub fn validate(&self) -> Result<(), Problem> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        Ok(())
    }

    pub fn apply(self, course: &mut Course) {
        if let Some(title) = self.title {
            course.title = title.trim().to_string();
        }
        if let Some(description) = self.description {
            course.description = description;
        }
        if let Some(price) = self.price {
            course.price = price;
        }
        if let Some(level) = self.level {
            course.level = level;
        }
        if let Some(duration) = self.duration {
            course.duration = duration;
        }
        if let Some(tags) = self.tags {
            course.tags = tags;
        }
        if let Some(status) = self.status {
            course.status = status;
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ModuleData {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

impl ModuleData {
    pub fn validate(&self) -> Result<(), Problem> {
        if self.title.trim().is_empty() {
            return Err(problem::bad_course("Module title can't be empty."));
        }
        if self.lessons.iter().any(|it| it.title.trim().is_empty()) {
            return Err(problem::bad_course("Lesson title can't be empty."));
        }
        Ok(())
    }

    pub fn into_module(self) -> Module {
        Module {
            id: Uuid::new_v4(),
            title: self.title.trim().to_string(),
            description: self.description,
            lessons: self.lessons,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Partial module update. Given lessons replace the existing list.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ModuleUpdateData {
    pub title: Option<String>,
    pub description: Option<String>,
    pub lessons: Option<Vec<Lesson>>,
}

impl ModuleUpdateData {
    pub fn validate(&self) -> Result<(), Problem> {
        if matches!(&self.title, Some(title) if title.trim().is_empty()) {
            return Err(problem::bad_course("Module title can't be empty."));
        }
        if let Some(lessons) = &self.lessons {
            if lessons.iter().any(|it| it.title.trim().is_empty()) {
                return Err(problem::bad_course("Lesson title can't be empty."));
            }
        }
        Ok(())
    }

    pub fn apply(self, module: &mut Module) {
        if let Some(title) = self.title {
            module.title = title.trim().to_string();
        }
        if let Some(description) = self.description {
            module.description = description;
        }
        if let Some(lessons) = self.lessons {
            module.lessons = lessons;
        }
        module.updated_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::role::Role;
    use crate::security::Security;

    fn create_data(title: &str, price: f64) -> CourseCreateData {
        CourseCreateData {
            title: title.to_string(),
            description: String::new(),
            price,
            level: CourseLevel::Beginner,
            duration: String::new(),
            tags: vec![],
            status: None,
            modules: vec![],
        }
    }

    #[test]
    fn new_courses_are_drafts_owned_by_the_author() {
        let security = Security::ephemeral(&Config::testing());
        let mut author = User::new("jo@example.com", "", "password123", &security);
        author.role = Role::Instructor;

        let course = create_data("  Rust  ", 0.0).into_course(&author);
        assert_eq!(course.title, "Rust");
        assert_eq!(course.status, CourseStatus::Draft);
        assert_eq!(course.instructor_id, author.id);
        assert_eq!(course.instructor_name, "jo@example.com");
    }

    #[test]
    fn rejects_negative_prices_and_blank_titles() {
        assert!(create_data("Rust", -1.0).validate().is_err());
        assert!(create_data("  ", 0.0).validate().is_err());
        assert!(create_data("Rust", f64::NAN).validate().is_err());
        assert!(create_data("Rust", 100.0).validate().is_ok());
    }

    #[test]
    fn update_keeps_absent_fields() {
        let mut course = crate::data::course::fixtures::course(
            "Rust",
            CourseLevel::Beginner,
            0.0,
            CourseStatus::Draft,
        );
        CourseUpdateData {
            status: Some(CourseStatus::Published),
            ..Default::default()
        }
        .apply(&mut course);

        assert_eq!(course.title, "Rust");
        assert_eq!(course.status, CourseStatus::Published);
    }
}
