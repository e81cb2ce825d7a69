use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::data::course::db::ModuleData;
use crate::data::course::{Course, CourseLevel, CourseStatus};
use crate::data::user::user_id_for;
use crate::error::BackendError;
use crate::store::Store;

const SAMPLE_CATALOG: &str = include_str!("../../resources/samples.yaml");

#[derive(Debug, Clone, Deserialize)]
struct SampleCourse {
    title: String,
    description: String,
    price: f64,
    level: CourseLevel,
    duration: String,
    instructor_email: String,
    instructor_name: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    modules: Vec<ModuleData>,
}

impl SampleCourse {
    fn into_course(self) -> Course {
        let now = Utc::now();
        Course {
            id: Uuid::new_v4(),
            title: self.title,
            description: self.description,
            price: self.price,
            level: self.level,
            duration: self.duration,
            tags: self.tags,
            // Owned by whoever signs up with the instructor's e-mail.
            instructor_id: user_id_for(&self.instructor_email),
            instructor_name: self.instructor_name,
            status: CourseStatus::Published,
            modules: self.modules.into_iter().map(ModuleData::into_module).collect(),
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }
}

/// Published sample courses whose titles aren't in `existing_titles` yet.
pub fn sample_courses<S: AsRef<str>>(existing_titles: &[S]) -> Result<Vec<Course>, BackendError> {
    let samples: Vec<SampleCourse> = serde_yaml::from_str(SAMPLE_CATALOG)?;

    Ok(samples
        .into_iter()
        .filter(|sample| {
            !existing_titles
                .iter()
                .any(|it| it.as_ref().eq_ignore_ascii_case(&sample.title))
        })
        .map(SampleCourse::into_course)
        .collect())
}

/// Inserts the sample courses missing from the store and returns them.
pub async fn seed_samples(store: &dyn Store) -> Result<Vec<Course>, BackendError> {
    let existing: Vec<String> = store
        .list_courses()
        .await?
        .into_iter()
        .map(|it| it.title)
        .collect();

    let courses = sample_courses(&existing)?;
    for course in &courses {
        store.insert_course(course).await?;
    }
    tracing::info!("Seeded {} sample courses", courses.len());
    Ok(courses)
}
