pub mod paging;

pub use paging::{Page, PageState};
