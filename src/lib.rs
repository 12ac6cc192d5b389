//! Figma file cache
//!
//! Disk-backed TTL cache and query layer for Figma design files. Whole files
//! are cached once and node lookups and depth-limited views are derived from
//! them locally.

pub mod cache;
pub mod config;
pub mod figma;
pub mod images;
pub mod service;

pub use cache::{CacheError, FileCache};
pub use config::{Config, ConfigError};
pub use figma::{FigmaClient, FigmaError, FigmaTransport};
pub use images::{HttpImageDownloader, ImageProcessor};
pub use service::{FigmaService, ImageRequest, RenderOptions, ServiceError};
