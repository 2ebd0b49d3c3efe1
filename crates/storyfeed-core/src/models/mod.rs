//! Data models for feed entities.
//!
//! - `Story`: a single feed item as returned by the stories endpoint
//! - `StoriesResponse`: the envelope the endpoint wraps a page in
//! - `NewStory`, `StatusResponse`: upload request and its reply
//! - `Cursor`: next/previous page bookkeeping stored alongside the cache

pub mod cursor;
pub mod story;

pub use cursor::Cursor;
pub use story::{NewStory, StatusResponse, StoriesResponse, Story};
