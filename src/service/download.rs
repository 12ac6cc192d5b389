//! Batch image downloads
//!
//! Items are split into image fills, PNG renders and SVG renders. Each
//! non-empty group resolves its URLs with a single API call, then every item
//! with a URL is handed to the image processor.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use futures::future::try_join_all;
use tracing::{debug, info};

use super::errors::ServiceError;
use super::query::{FigmaService, RenderOptions};
use crate::figma::ImageFormat;
use crate::images::{ImageJob, ImageProcessingResult, Transform};

/// Where an image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Image paint referenced by `imageRef`
    Fill { image_ref: String },
    /// Node rendered by the export endpoint
    Render { node_id: String },
}

/// One image to download into the destination directory
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub source: ImageSource,
    /// Target file name; a `.svg` extension selects SVG export for renders
    pub file_name: String,
    pub needs_cropping: bool,
    pub crop_transform: Option<Transform>,
    pub requires_dimensions: bool,
}

impl ImageRequest {
    pub fn fill(image_ref: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self::new(
            ImageSource::Fill {
                image_ref: image_ref.into(),
            },
            file_name.into(),
        )
    }

    pub fn render(node_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self::new(
            ImageSource::Render {
                node_id: node_id.into(),
            },
            file_name.into(),
        )
    }

    fn new(source: ImageSource, file_name: String) -> Self {
        Self {
            source,
            file_name,
            needs_cropping: false,
            crop_transform: None,
            requires_dimensions: false,
        }
    }

    /// Ask the processor to crop using an image paint transform
    pub fn with_crop(mut self, transform: Transform) -> Self {
        self.needs_cropping = true;
        self.crop_transform = Some(transform);
        self
    }

    /// Ask the processor to report pixel dimensions
    pub fn with_dimensions(mut self) -> Self {
        self.requires_dimensions = true;
        self
    }

    /// Image ref or node ID, whichever this item uses
    fn source_id(&self) -> &str {
        match &self.source {
            ImageSource::Fill { image_ref } => image_ref,
            ImageSource::Render { node_id } => node_id,
        }
    }

    fn job(&self, dest_dir: &Path, url: &str) -> ImageJob {
        ImageJob {
            file_name: self.file_name.clone(),
            dest_dir: dest_dir.to_path_buf(),
            url: url.to_string(),
            needs_cropping: self.needs_cropping,
            crop_transform: self.crop_transform,
            requires_dimensions: self.requires_dimensions,
        }
    }
}

/// Resolve `.` and `..` without touching the filesystem
///
/// `..` at the root of an absolute path is dropped. Leading `..` in a
/// relative path is kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `dest` against `root`, rejecting anything that lands outside it
pub fn resolve_destination(root: &Path, dest: &Path) -> Result<PathBuf, ServiceError> {
    let root = normalize_path(root);
    let resolved = normalize_path(&root.join(dest));
    if !resolved.starts_with(&root) {
        return Err(ServiceError::PathTraversal {
            path: dest.to_path_buf(),
        });
    }
    Ok(resolved)
}

impl FigmaService {
    /// Download images into `dest_dir`
    ///
    /// An empty batch returns nothing without looking at `dest_dir`.
    /// Otherwise the destination is checked before any request is made. Items whose
    /// URL cannot be resolved are skipped. Results come back grouped as
    /// fills, then PNG renders, then SVG renders. The first failed download
    /// fails the whole batch.
    pub async fn download_images(
        &self,
        file_key: &str,
        dest_dir: &Path,
        items: &[ImageRequest],
        options: &RenderOptions,
    ) -> Result<Vec<ImageProcessingResult>, ServiceError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let root = match &self.download_root {
            Some(root) => root.clone(),
            None => std::env::current_dir().map_err(ServiceError::WorkingDir)?,
        };
        let dest = resolve_destination(&root, dest_dir)?;

        let mut fills = Vec::new();
        let mut pngs = Vec::new();
        let mut svgs = Vec::new();
        for item in items {
            match &item.source {
                ImageSource::Fill { .. } => fills.push(item),
                ImageSource::Render { .. } => match ImageFormat::from_file_name(&item.file_name) {
                    ImageFormat::Png => pngs.push(item),
                    ImageFormat::Svg => svgs.push(item),
                },
            }
        }

        info!(
            file_key = file_key,
            dest = %dest.display(),
            fills = fills.len(),
            pngs = pngs.len(),
            svgs = svgs.len(),
            "Downloading images"
        );

        let (fill_results, png_results, svg_results) = futures::try_join!(
            self.download_fills(file_key, &dest, &fills),
            self.download_renders(file_key, &dest, &pngs, ImageFormat::Png, options),
            self.download_renders(file_key, &dest, &svgs, ImageFormat::Svg, options),
        )?;

        let mut results = fill_results;
        results.extend(png_results);
        results.extend(svg_results);
        Ok(results)
    }

    async fn download_fills(
        &self,
        file_key: &str,
        dest: &Path,
        items: &[&ImageRequest],
    ) -> Result<Vec<ImageProcessingResult>, ServiceError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let urls = self.get_image_fill_urls(file_key).await?;
        self.process_resolved(dest, items, &urls).await
    }

    async fn download_renders(
        &self,
        file_key: &str,
        dest: &Path,
        items: &[&ImageRequest],
        format: ImageFormat,
        options: &RenderOptions,
    ) -> Result<Vec<ImageProcessingResult>, ServiceError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut node_ids: Vec<String> = Vec::with_capacity(items.len());
        for item in items {
            let id = item.source_id();
            if !node_ids.iter().any(|existing| existing == id) {
                node_ids.push(id.to_string());
            }
        }

        let urls = self
            .get_node_render_urls(file_key, &node_ids, format, options)
            .await?;
        self.process_resolved(dest, items, &urls).await
    }

    /// Hand every item with a URL to the processor, concurrently
    async fn process_resolved(
        &self,
        dest: &Path,
        items: &[&ImageRequest],
        urls: &HashMap<String, String>,
    ) -> Result<Vec<ImageProcessingResult>, ServiceError> {
        let jobs = items.iter().filter_map(|item| match urls.get(item.source_id()) {
            Some(url) => Some(item.job(dest, url)),
            None => {
                debug!(
                    id = item.source_id(),
                    file = %item.file_name,
                    "No image URL resolved, skipping"
                );
                None
            }
        });

        try_join_all(jobs.map(|job| async move {
            let file_name = job.file_name.clone();
            self.image_processor
                .process(job)
                .await
                .map_err(|source| ServiceError::Image { file_name, source })
        }))
        .await
    }
}
