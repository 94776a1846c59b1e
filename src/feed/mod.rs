//! The news feed session.
//!
//! - [`controller`] - owns pagination, filters, debounced search and
//!   auto-translation; background results are applied by generation
//! - [`state`] - the observable state the presentation layer renders
//!
//! # Example
//!
//! ```ignore
//! let mut feed = FeedController::new(repo, translator, prefs, FeedSettings::from_config(&config));
//! feed.load_first_page();
//! feed.settle().await;
//! for article in &feed.state().articles {
//!     println!("{}", article.display_title());
//! }
//! ```

mod controller;
mod state;

pub use controller::{FeedController, FeedSettings};
pub use state::{FeedError, FeedState, FeedStatus};
