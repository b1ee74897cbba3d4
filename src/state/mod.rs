// State module
// File-backed interim storage of raw note events between runs

pub mod cache;

pub use cache::{calculate_sha256, CacheError, CacheResult, CachedSource, NoteEventCache};
