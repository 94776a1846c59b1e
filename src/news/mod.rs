//! News domain: data model and the repository over the remote API.
//!
//! - [`types`] - `Article`, `Source`, `League`, `Filter`, `Page`
//! - [`repository`] - typed fetch operations with first-page caching

mod repository;
mod types;

pub use repository::{FeedQuery, NewsRepository, NewsSource, DEFAULT_PAGE_LIMIT};
pub use types::{Article, Filter, FilterKind, League, Page, Source};
