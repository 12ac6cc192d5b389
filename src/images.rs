//! Image download and post-processing
//!
//! The query service resolves export URLs and hands each one to an
//! [`ImageProcessor`]. The default [`HttpImageDownloader`] saves the bytes as-is;
//! cropping and dimension probing are left to richer implementations.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::figma::{FigmaClient, FigmaError};

/// 2x3 affine transform, as used by Figma image paints
pub type Transform = [[f64; 3]; 2];

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Invalid image file name: {0:?}")]
    InvalidFileName(String),

    #[error("Failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: FigmaError,
    },

    #[error("Failed to write image {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One image to fetch and store
#[derive(Debug, Clone, PartialEq)]
pub struct ImageJob {
    /// Target file name inside `dest_dir`
    pub file_name: String,
    pub dest_dir: PathBuf,
    /// Resolved export URL
    pub url: String,
    pub needs_cropping: bool,
    pub crop_transform: Option<Transform>,
    pub requires_dimensions: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Outcome for one stored image
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProcessingResult {
    pub file_path: PathBuf,
    pub was_cropped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_dimensions: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_dimensions: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css_variables: Option<String>,
}

impl ImageProcessingResult {
    /// Result for an image stored without any processing
    pub fn stored(file_path: PathBuf) -> Self {
        Self {
            file_path,
            was_cropped: false,
            original_dimensions: None,
            final_dimensions: None,
            css_variables: None,
        }
    }
}

/// Downloads an image and applies the requested post-processing
#[async_trait]
pub trait ImageProcessor: Send + Sync {
    async fn process(&self, job: ImageJob) -> Result<ImageProcessingResult, ImageError>;
}

/// Saves images exactly as exported
pub struct HttpImageDownloader {
    client: FigmaClient,
}

impl HttpImageDownloader {
    pub fn new(client: FigmaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageProcessor for HttpImageDownloader {
    async fn process(&self, job: ImageJob) -> Result<ImageProcessingResult, ImageError> {
        validate_file_name(&job.file_name)?;

        if job.needs_cropping || job.requires_dimensions {
            debug!(
                file = %job.file_name,
                needs_cropping = job.needs_cropping,
                requires_dimensions = job.requires_dimensions,
                "Post-processing not supported, saving image as exported"
            );
        }

        let bytes = self
            .client
            .download(&job.url)
            .await
            .map_err(|source| ImageError::Download {
                url: job.url.clone(),
                source,
            })?;

        let dest_dir = job.dest_dir.clone();
        let file_name = job.file_name.clone();
        let size = bytes.len();
        let file_path = tokio::task::spawn_blocking(move || {
            write_atomically(&dest_dir, &file_name, &bytes)
        })
        .await
        .map_err(|e| ImageError::Io {
            path: job.dest_dir.join(&job.file_name),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })??;

        info!(file = %file_path.display(), size = size, "Saved image");
        Ok(ImageProcessingResult::stored(file_path))
    }
}

/// Reject names that would land outside the destination directory
pub fn validate_file_name(file_name: &str) -> Result<(), ImageError> {
    let invalid = file_name.is_empty()
        || file_name == "."
        || file_name == ".."
        || file_name.contains('/')
        || file_name.contains('\\');
    if invalid {
        return Err(ImageError::InvalidFileName(file_name.to_string()));
    }
    Ok(())
}

/// Write bytes to `dest_dir/file_name` via a temp file in the same directory
fn write_atomically(dest_dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ImageError> {
    let path = dest_dir.join(file_name);
    let io_err = |source| ImageError::Io {
        path: path.clone(),
        source,
    };

    std::fs::create_dir_all(dest_dir).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dest_dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.persist(&path).map_err(|e| io_err(e.error))?;

    Ok(path)
}
