//! Errors surfaced at the query service boundary

use std::path::PathBuf;

use crate::cache::CacheError;
use crate::figma::FigmaError;
use crate::images::ImageError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Failed to create Figma API client: {0}")]
    ClientSetup(#[source] FigmaError),

    #[error("Failed to make request to Figma API endpoint '{endpoint}': {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: FigmaError,
    },

    #[error("No valid node IDs provided")]
    NoNodeIds,

    /// A requested node is absent from the cached document; the whole
    /// request fails rather than returning the nodes that were found
    #[error("Node {node_id} not found in cached file")]
    NodeNotFound { node_id: String },

    #[error("Invalid path specified: {}. Directory traversal is not allowed.", path.display())]
    PathTraversal { path: PathBuf },

    #[error("Cannot resolve working directory: {0}")]
    WorkingDir(#[source] std::io::Error),

    #[error("Failed to process image {file_name}: {source}")]
    Image {
        file_name: String,
        #[source]
        source: ImageError,
    },
}
