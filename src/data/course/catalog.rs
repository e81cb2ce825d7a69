use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{Course, CourseLevel};

#[derive(Debug, Clone, Copy, Eq, PartialEq, FromFormField, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LevelFilter {
    #[field(value = "all")]
    All,
    #[field(value = "beginner")]
    Beginner,
    #[field(value = "intermediate")]
    Intermediate,
    #[field(value = "advanced")]
    Advanced,
}

impl LevelFilter {
    fn level(self) -> Option<CourseLevel> {
        match self {
            LevelFilter::All => None,
            LevelFilter::Beginner => Some(CourseLevel::Beginner),
            LevelFilter::Intermediate => Some(CourseLevel::Intermediate),
            LevelFilter::Advanced => Some(CourseLevel::Advanced),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, FromFormField, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PriceFilter {
    #[field(value = "all")]
    All,
    #[field(value = "free")]
    Free,
    #[field(value = "paid")]
    Paid,
}

/// Catalog filters. All given predicates must hold.
#[derive(Debug, Clone, Default, FromForm, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CatalogQuery {
    /// Matched against title, description and tags, case-insensitively.
    pub search: Option<String>,
    pub level: Option<LevelFilter>,
    pub price: Option<PriceFilter>,
}

impl CatalogQuery {
    pub fn matches(&self, course: &Course) -> bool {
        if !course.is_published() {
            return false;
        }

        if let Some(level) = self.level.and_then(LevelFilter::level) {
            if course.level != level {
                return false;
            }
        }

        match self.price.unwrap_or(PriceFilter::All) {
            PriceFilter::Free if !course.is_free() => return false,
            PriceFilter::Paid if course.is_free() => return false,
            _ => {}
        }

        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                course.title.to_lowercase().contains(&term)
                    || course.description.to_lowercase().contains(&term)
                    || course
                        .tags
                        .iter()
                        .any(|tag| tag.to_lowercase().contains(&term))
            }
            _ => true,
        }
    }

    /// Filters the catalog, newest courses first.
    pub fn apply(&self, courses: Vec<Course>) -> Vec<Course> {
        let mut result: Vec<Course> = courses.into_iter().filter(|it| self.matches(it)).collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result
    }
}
