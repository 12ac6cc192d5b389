//! Figma REST API Client
//!
//! Provides authenticated, retrying access to the file, node and image endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::errors::FigmaError;
use super::types::{
    FileDocument, FileNodesResponse, ImageFillsResponse, ImagesResponse, RenderRequest,
};
use crate::config::AuthOptions;

/// Default Figma API base URL
pub const FIGMA_API_URL: &str = "https://api.figma.com/v1";

/// HTTP client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of retries for retryable errors
const MAX_RETRIES: u32 = 3;

/// Backoff between attempts, indexed by attempt number
const BACKOFF_MS: [u64; 3] = [500, 1000, 2000];

/// Remote operations the query layer consumes.
///
/// Every call is an idempotent read. Implementations own their retry and
/// timeout policy; callers treat each call as a single fallible operation.
#[async_trait]
pub trait FigmaTransport: Send + Sync {
    /// Fetch a whole file, optionally limited to `depth` levels
    async fn fetch_file(
        &self,
        file_key: &str,
        depth: Option<u32>,
    ) -> Result<FileDocument, FigmaError>;

    /// Fetch specific nodes of a file
    async fn fetch_nodes(
        &self,
        file_key: &str,
        node_ids: &[String],
        depth: Option<u32>,
    ) -> Result<FileNodesResponse, FigmaError>;

    /// Fetch download URLs for every image fill in a file
    async fn fetch_image_fills(&self, file_key: &str) -> Result<ImageFillsResponse, FigmaError>;

    /// Render nodes and fetch their export URLs
    async fn fetch_images(
        &self,
        file_key: &str,
        node_ids: &[String],
        render: RenderRequest,
    ) -> Result<ImagesResponse, FigmaError>;
}

/// Figma API client for making authenticated requests
#[derive(Clone)]
pub struct FigmaClient {
    /// HTTP client for making requests
    http_client: Client,
    /// API base URL (no trailing slash)
    base_url: String,
    /// Credentials used for every API request
    auth: AuthOptions,
}

impl FigmaClient {
    /// Create a client against the public Figma API
    pub fn new(auth: AuthOptions) -> Result<Self, FigmaError> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FigmaError::Request(format!("Failed to create HTTP client: {}", e)))?;

        if auth.use_oauth {
            debug!(token = %auth.masked(), "Using OAuth Bearer token for authentication");
        } else {
            debug!(key = %auth.masked(), "Using Personal Access Token for authentication");
        }

        Ok(Self {
            http_client,
            base_url: FIGMA_API_URL.to_string(),
            auth,
        })
    }

    /// Point the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Full URL for an API endpoint
    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Execute an operation with retry logic and exponential backoff
    async fn with_retry<F, Fut, T>(&self, operation: &str, f: F) -> Result<T, FigmaError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, FigmaError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    let delay = BACKOFF_MS
                        .get(attempt as usize)
                        .copied()
                        .unwrap_or(2000);
                    attempt += 1;
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        max = MAX_RETRIES,
                        delay_ms = delay,
                        error = %e,
                        "Retrying Figma request"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// GET an API endpoint and decode the JSON body
    async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, FigmaError> {
        info!(endpoint = endpoint, "Calling Figma API");
        self.with_retry(endpoint, || self.request_once(endpoint, query))
            .await
    }

    async fn request_once<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, FigmaError> {
        let (header, value) = self.auth.header();
        let response = self
            .http_client
            .get(self.endpoint_url(endpoint))
            .header(header, value)
            .query(query)
            .send()
            .await
            .map_err(FigmaError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FigmaError::from_status(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FigmaError::Decode(e.to_string()))
    }

    /// Download raw bytes from an export URL
    ///
    /// Export URLs are pre-signed, so no auth header is sent.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, FigmaError> {
        self.with_retry("download", || async {
            let response = self
                .http_client
                .get(url)
                .send()
                .await
                .map_err(FigmaError::from_reqwest)?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(FigmaError::from_status(status, &body));
            }

            let bytes = response.bytes().await.map_err(FigmaError::from_reqwest)?;
            debug!(url = url, size = bytes.len(), "Downloaded image");
            Ok(bytes.to_vec())
        })
        .await
    }
}

fn file_endpoint(file_key: &str) -> String {
    format!("/files/{}", urlencoding::encode(file_key))
}

fn depth_param(depth: Option<u32>) -> Option<(&'static str, String)> {
    depth.map(|d| ("depth", d.to_string()))
}

#[async_trait]
impl FigmaTransport for FigmaClient {
    async fn fetch_file(
        &self,
        file_key: &str,
        depth: Option<u32>,
    ) -> Result<FileDocument, FigmaError> {
        let query: Vec<_> = depth_param(depth).into_iter().collect();
        self.request(&file_endpoint(file_key), &query).await
    }

    async fn fetch_nodes(
        &self,
        file_key: &str,
        node_ids: &[String],
        depth: Option<u32>,
    ) -> Result<FileNodesResponse, FigmaError> {
        let mut query = vec![("ids", node_ids.join(","))];
        query.extend(depth_param(depth));
        let endpoint = format!("{}/nodes", file_endpoint(file_key));
        self.request(&endpoint, &query).await
    }

    async fn fetch_image_fills(&self, file_key: &str) -> Result<ImageFillsResponse, FigmaError> {
        let endpoint = format!("{}/images", file_endpoint(file_key));
        self.request(&endpoint, &[]).await
    }

    async fn fetch_images(
        &self,
        file_key: &str,
        node_ids: &[String],
        render: RenderRequest,
    ) -> Result<ImagesResponse, FigmaError> {
        let mut query = vec![("ids", node_ids.join(","))];
        query.extend(render.query_params());
        let endpoint = format!("/images/{}", urlencoding::encode(file_key));
        self.request(&endpoint, &query).await
    }
}
