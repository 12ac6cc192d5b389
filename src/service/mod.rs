//! Query service over the Figma API and the disk cache

pub mod download;
pub mod errors;
pub mod query;
pub mod tree;

#[cfg(test)]
mod testing;

pub use download::{ImageRequest, ImageSource};
pub use errors::ServiceError;
pub use query::{CacheInfo, FigmaService, Fetched, RenderOptions};
