use std::convert::Infallible;

use rocket::request::{FromRequest, Outcome, Request};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_PAGE_LENGTH: u32 = 20;
pub const MAX_PAGE_LENGTH: u32 = 100;

/// Paging read from the `len`/`l` and `page`/`p` query parameters. Pages start at 0.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PageState {
    pub page_length: u32,
    pub page: u32,
}

impl Default for PageState {
    fn default() -> Self {
        PageState {
            page_length: DEFAULT_PAGE_LENGTH,
            page: 0,
        }
    }
}

impl PageState {
    pub fn new(page: u32, page_length: u32) -> PageState {
        PageState {
            page_length: page_length.clamp(1, MAX_PAGE_LENGTH),
            page,
        }
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len();
        let start = (self.page as usize).saturating_mul(self.page_length as usize);
        let items = items
            .into_iter()
            .skip(start)
            .take(self.page_length as usize)
            .collect();

        Page {
            items,
            page: self.page,
            page_length: self.page_length,
            total,
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PageState {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let length: Option<u32> = request
            .query_value("len")
            .and_then(|it| it.ok())
            .or_else(|| request.query_value("l").and_then(|it| it.ok()));

        let page: Option<u32> = request
            .query_value("page")
            .and_then(|it| it.ok())
            .or_else(|| request.query_value("p").and_then(|it| it.ok()));

        Outcome::Success(PageState::new(
            page.unwrap_or(0),
            length.unwrap_or(DEFAULT_PAGE_LENGTH),
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[aliases(CoursePage = Page<crate::data::course::CourseSummary>, UserPage = Page<crate::data::user::UserResponse>)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_length: u32,
    /// Number of items across all pages.
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_slice_items() {
        let page = PageState::new(1, 2).apply((0..5).collect::<Vec<_>>());
        assert_eq!(page.items, vec![2, 3]);
        assert_eq!(page.total, 5);

        let past_end = PageState::new(9, 2).apply((0..5).collect::<Vec<_>>());
        assert!(past_end.items.is_empty());
    }

    #[test]
    fn page_length_is_bounded() {
        assert_eq!(PageState::new(0, 0).page_length, 1);
        assert_eq!(PageState::new(0, 5000).page_length, MAX_PAGE_LENGTH);
    }
}
