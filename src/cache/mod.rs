//! Disk caching layer
//!
//! Keeps whole Figma documents on disk with a TTL so node lookups and depth
//! truncation can be served locally instead of hitting the API again.

pub mod errors;
pub mod file_cache;

pub use errors::CacheError;
pub use file_cache::{CacheLookup, CachedFile, Clock, FileCache, MissReason, SystemClock};
