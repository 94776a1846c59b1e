//! Utility functions for common operations.
//!
//! - **URL validation**: base-URL policy for the news API client
//! - **Task supervision**: panic capture for spawned background work

mod task;
mod url_validator;

pub use task::catch_task_panic;
pub use url_validator::{validate_base_url, UrlValidationError};

/// Maximum accepted search query length; longer input is truncated before dispatch.
pub const MAX_SEARCH_QUERY_LENGTH: usize = 256;
