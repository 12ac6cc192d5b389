//! Figma query service
//!
//! Decides between the disk cache and the API, and derives node-scoped and
//! depth-limited views locally from a cached full document.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::errors::ServiceError;
use super::tree;
use crate::cache::{CachedFile, FileCache};
use crate::config::Config;
use crate::figma::{
    filter_valid_urls, FigmaClient, FigmaTransport, FileDocument, FileNodesResponse, ImageFormat,
    NodeEntry, RenderRequest, SvgOptions,
};
use crate::images::{HttpImageDownloader, ImageProcessor};

/// Separator between node IDs in a node request
pub const NODE_ID_SEPARATOR: char = ';';

/// PNG export scale when none is given
pub const DEFAULT_PNG_SCALE: f64 = 2.0;

/// Where a returned view came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub used_cache: bool,
    /// Fetch time of the cached document, epoch milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

impl CacheInfo {
    /// Served straight from the API
    pub fn fresh() -> Self {
        Self::default()
    }

    fn from_entry(entry: &CachedFile) -> Self {
        Self {
            used_cache: true,
            cached_at: Some(entry.cached_at),
            ttl_ms: Some(entry.ttl_ms),
        }
    }

    /// Human-readable note for cached responses
    pub fn notice(&self, now_ms: u64) -> Option<String> {
        let (cached_at, ttl_ms) = match (self.used_cache, self.cached_at, self.ttl_ms) {
            (true, Some(cached_at), Some(ttl_ms)) => (cached_at, ttl_ms),
            _ => return None,
        };
        let age = now_ms.saturating_sub(cached_at);
        let remaining = ttl_ms.saturating_sub(age);
        Some(format!(
            "Note: Using cached Figma data (fetched {} ago, expires in {}).",
            format_duration(age),
            format_duration(remaining)
        ))
    }
}

fn format_duration(ms: u64) -> String {
    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

/// A view plus its cache provenance
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub data: T,
    pub cache_info: CacheInfo,
}

/// Export settings for rendered nodes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderOptions {
    /// PNG scale factor, `DEFAULT_PNG_SCALE` when unset
    pub png_scale: Option<f64>,
    /// SVG flags, `SvgOptions::default()` when unset
    pub svg_options: Option<SvgOptions>,
}

impl RenderOptions {
    fn render_request(&self, format: ImageFormat) -> RenderRequest {
        match format {
            ImageFormat::Png => RenderRequest::Png {
                scale: self
                    .png_scale
                    .filter(|scale| *scale > 0.0)
                    .unwrap_or(DEFAULT_PNG_SCALE),
            },
            ImageFormat::Svg => RenderRequest::Svg(self.svg_options.unwrap_or_default()),
        }
    }
}

/// Query layer over the Figma API with an optional disk cache
///
/// Without a cache every call goes to the API and no disk I/O happens.
/// With a cache the full, untruncated file is the unit of caching and every
/// narrower view is derived from it.
pub struct FigmaService {
    /// Remote API
    pub(super) transport: Arc<dyn FigmaTransport>,
    /// Disk cache, `None` in pass-through mode
    file_cache: Option<FileCache>,
    /// Downloads and post-processes resolved images
    pub(super) image_processor: Arc<dyn ImageProcessor>,
    /// Root that image destinations must stay within (working directory when unset)
    pub(super) download_root: Option<PathBuf>,
}

impl FigmaService {
    /// Create a service from its parts
    pub fn new(
        transport: Arc<dyn FigmaTransport>,
        file_cache: Option<FileCache>,
        image_processor: Arc<dyn ImageProcessor>,
    ) -> Self {
        Self {
            transport,
            file_cache,
            image_processor,
            download_root: None,
        }
    }

    /// Build the HTTP client, image downloader and cache from configuration
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let mut client =
            FigmaClient::new(config.auth.clone()).map_err(ServiceError::ClientSetup)?;
        if let Some(base_url) = &config.api_base_url {
            client = client.with_base_url(base_url.clone());
        }

        let file_cache = config.caching.clone().map(FileCache::new);
        match &file_cache {
            Some(cache) => info!(
                cache_dir = %cache.cache_dir().display(),
                ttl_ms = cache.ttl().as_millis() as u64,
                "Figma file caching enabled"
            ),
            None => debug!("Figma file caching disabled"),
        }

        let downloader = HttpImageDownloader::new(client.clone());
        Ok(Self::new(Arc::new(client), file_cache, Arc::new(downloader)))
    }

    /// Confine image downloads to `root` instead of the working directory
    pub fn with_download_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.download_root = Some(root.into());
        self
    }

    /// Whether responses go through the disk cache
    pub fn is_caching(&self) -> bool {
        self.file_cache.is_some()
    }

    /// Get a whole file, optionally truncated to `depth` levels
    pub async fn get_file(
        &self,
        file_key: &str,
        depth: Option<u32>,
    ) -> Result<Fetched<FileDocument>, ServiceError> {
        info!(file_key = file_key, depth = ?depth, "Retrieving Figma file");

        match &self.file_cache {
            Some(cache) => {
                let loaded = self.load_file(cache, file_key).await?;
                Ok(Fetched {
                    data: tree::truncate_file(loaded.data, depth),
                    cache_info: loaded.cache_info,
                })
            }
            None => {
                let data = self.fetch_file(file_key, remote_depth(depth)).await?;
                Ok(Fetched {
                    data,
                    cache_info: CacheInfo::fresh(),
                })
            }
        }
    }

    /// Get one or more nodes of a file
    ///
    /// `node_id_list` holds one or more IDs separated by `;`. With caching
    /// enabled the response is built from the cached full file and has the
    /// same shape as the API's node endpoint.
    pub async fn get_node(
        &self,
        file_key: &str,
        node_id_list: &str,
        depth: Option<u32>,
    ) -> Result<Fetched<FileNodesResponse>, ServiceError> {
        let node_ids = parse_node_ids(node_id_list)?;
        info!(
            file_key = file_key,
            nodes = ?node_ids,
            depth = ?depth,
            "Retrieving Figma nodes"
        );

        match &self.file_cache {
            Some(cache) => {
                let loaded = self.load_file(cache, file_key).await?;
                let data = build_node_response(&loaded.data, &node_ids, depth)?;
                Ok(Fetched {
                    data,
                    cache_info: loaded.cache_info,
                })
            }
            None => {
                let depth = remote_depth(depth);
                let data = self
                    .transport
                    .fetch_nodes(file_key, &node_ids, depth)
                    .await
                    .map_err(|source| ServiceError::Transport {
                        endpoint: format!("/files/{}/nodes?ids={}", file_key, node_ids.join(",")),
                        source,
                    })?;
                Ok(Fetched {
                    data,
                    cache_info: CacheInfo::fresh(),
                })
            }
        }
    }

    /// Download URLs for every image fill in a file, keyed by image ref
    pub async fn get_image_fill_urls(
        &self,
        file_key: &str,
    ) -> Result<HashMap<String, String>, ServiceError> {
        let response = self
            .transport
            .fetch_image_fills(file_key)
            .await
            .map_err(|source| ServiceError::Transport {
                endpoint: format!("/files/{}/images", file_key),
                source,
            })?;
        Ok(filter_valid_urls(response.meta.images))
    }

    /// Export URLs for rendered nodes, keyed by node ID
    pub async fn get_node_render_urls(
        &self,
        file_key: &str,
        node_ids: &[String],
        format: ImageFormat,
        options: &RenderOptions,
    ) -> Result<HashMap<String, String>, ServiceError> {
        if node_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let render = options.render_request(format);
        let response = self
            .transport
            .fetch_images(file_key, node_ids, render)
            .await
            .map_err(|source| ServiceError::Transport {
                endpoint: format!("/images/{}", file_key),
                source,
            })?;

        if let Some(err) = &response.err {
            warn!(file_key = file_key, error = %err, "Figma reported render errors");
        }
        Ok(filter_valid_urls(response.images))
    }

    /// Reuse a live cache entry or fetch and store the full file
    async fn load_file(
        &self,
        cache: &FileCache,
        file_key: &str,
    ) -> Result<Fetched<FileDocument>, ServiceError> {
        if let Some(entry) = cache.get(file_key).await?.hit() {
            return Ok(Fetched {
                cache_info: CacheInfo::from_entry(&entry),
                data: entry.data,
            });
        }

        let fresh = self.fetch_file(file_key, None).await?;
        cache.set(file_key, &fresh).await?;
        Ok(Fetched {
            data: fresh,
            cache_info: CacheInfo::fresh(),
        })
    }

    async fn fetch_file(
        &self,
        file_key: &str,
        depth: Option<u32>,
    ) -> Result<FileDocument, ServiceError> {
        info!(
            file_key = file_key,
            depth = ?depth,
            "Fetching Figma file from API"
        );
        self.transport
            .fetch_file(file_key, depth)
            .await
            .map_err(|source| ServiceError::Transport {
                endpoint: match depth {
                    Some(d) => format!("/files/{}?depth={}", file_key, d),
                    None => format!("/files/{}", file_key),
                },
                source,
            })
    }
}

/// The API rejects `depth=0`, so only positive depths are sent
fn remote_depth(depth: Option<u32>) -> Option<u32> {
    depth.filter(|d| *d > 0)
}

/// Split a `;`-separated node ID list, dropping empty segments
pub fn parse_node_ids(list: &str) -> Result<Vec<String>, ServiceError> {
    let ids: Vec<String> = list
        .split(NODE_ID_SEPARATOR)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();
    if ids.is_empty() {
        return Err(ServiceError::NoNodeIds);
    }
    Ok(ids)
}

/// Rebuild a node endpoint response from a full file
fn build_node_response(
    file: &FileDocument,
    node_ids: &[String],
    depth: Option<u32>,
) -> Result<FileNodesResponse, ServiceError> {
    let wanted: HashSet<&str> = node_ids.iter().map(String::as_str).collect();
    let found = tree::find_by_ids(&file.document, &wanted);

    let mut nodes = IndexMap::with_capacity(node_ids.len());
    for id in node_ids {
        let node = found
            .get(id.as_str())
            .ok_or_else(|| ServiceError::NodeNotFound {
                node_id: id.clone(),
            })?;
        nodes.insert(
            id.clone(),
            Some(NodeEntry {
                document: tree::clone_with_depth(node, depth),
                components: file.components.clone(),
                component_sets: file.component_sets.clone(),
                styles: file.styles.clone(),
                schema_version: file.schema_version,
            }),
        );
    }

    Ok(FileNodesResponse {
        name: file.name.clone(),
        last_modified: file.last_modified.clone(),
        thumbnail_url: file.thumbnail_url.clone().unwrap_or_default(),
        version: file.version.clone().unwrap_or_default(),
        role: file.role.clone().unwrap_or_else(|| "viewer".to_string()),
        editor_type: file
            .editor_type
            .clone()
            .unwrap_or_else(|| "figma".to_string()),
        nodes,
    })
}
