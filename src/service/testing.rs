//! In-memory fakes for service tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::figma::{
    FigmaError, FigmaTransport, FileDocument, FileNodesResponse, ImageFillsMeta,
    ImageFillsResponse, ImagesResponse, RenderRequest,
};
use crate::images::{ImageError, ImageJob, ImageProcessingResult, ImageProcessor};

/// DOCUMENT 0:0 -> CANVAS 10:20 -> FRAME 11:22 -> TEXT 12:1
pub fn sample_file() -> FileDocument {
    serde_json::from_value(json!({
        "name": "Sample",
        "lastModified": "2024-05-01T12:00:00Z",
        "version": "42",
        "document": {
            "id": "0:0", "type": "DOCUMENT", "name": "Document",
            "children": [{
                "id": "10:20", "type": "CANVAS", "name": "Page 1",
                "children": [{
                    "id": "11:22", "type": "FRAME", "name": "Hero",
                    "children": [{"id": "12:1", "type": "TEXT", "characters": "Hi"}]
                }]
            }]
        },
        "components": {"C:1": {"name": "Button"}},
        "styles": {"S:1": {"name": "Primary", "styleType": "FILL"}},
        "schemaVersion": 0
    }))
    .unwrap()
}

/// A remote call seen by [`FakeTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    File { depth: Option<u32> },
    Nodes { ids: Vec<String>, depth: Option<u32> },
    Fills,
    Images { ids: Vec<String>, render: RenderRequest },
}

/// Transport serving canned responses and recording every call
#[derive(Default)]
pub struct FakeTransport {
    /// Served by `fetch_file`; `None` answers 404
    pub file: Option<FileDocument>,
    pub fill_urls: HashMap<String, Option<String>>,
    /// Render URLs by node ID, shared by both formats
    pub render_urls: HashMap<String, Option<String>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeTransport {
    pub fn with_file(file: FileDocument) -> Self {
        Self {
            file: Some(file),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl FigmaTransport for FakeTransport {
    async fn fetch_file(
        &self,
        file_key: &str,
        depth: Option<u32>,
    ) -> Result<FileDocument, FigmaError> {
        self.record(Call::File { depth });
        self.file
            .clone()
            .ok_or_else(|| FigmaError::NotFound(file_key.to_string()))
    }

    async fn fetch_nodes(
        &self,
        file_key: &str,
        node_ids: &[String],
        depth: Option<u32>,
    ) -> Result<FileNodesResponse, FigmaError> {
        self.record(Call::Nodes {
            ids: node_ids.to_vec(),
            depth,
        });
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| FigmaError::NotFound(file_key.to_string()))?;
        Ok(FileNodesResponse {
            name: file.name.clone(),
            last_modified: file.last_modified.clone(),
            thumbnail_url: String::new(),
            version: String::new(),
            role: "viewer".to_string(),
            editor_type: "figma".to_string(),
            nodes: node_ids.iter().map(|id| (id.clone(), None)).collect(),
        })
    }

    async fn fetch_image_fills(&self, _file_key: &str) -> Result<ImageFillsResponse, FigmaError> {
        self.record(Call::Fills);
        Ok(ImageFillsResponse {
            meta: ImageFillsMeta {
                images: self.fill_urls.clone(),
            },
        })
    }

    async fn fetch_images(
        &self,
        _file_key: &str,
        node_ids: &[String],
        render: RenderRequest,
    ) -> Result<ImagesResponse, FigmaError> {
        self.record(Call::Images {
            ids: node_ids.to_vec(),
            render,
        });
        let images = node_ids
            .iter()
            .filter_map(|id| self.render_urls.get(id).map(|url| (id.clone(), url.clone())))
            .collect();
        Ok(ImagesResponse { err: None, images })
    }
}

/// Processor that records jobs instead of downloading
#[derive(Default)]
pub struct RecordingProcessor {
    /// Jobs for this file name fail
    pub fail_on: Option<String>,
    jobs: Mutex<Vec<ImageJob>>,
}

impl RecordingProcessor {
    pub fn failing_on(file_name: &str) -> Self {
        Self {
            fail_on: Some(file_name.to_string()),
            ..Default::default()
        }
    }

    pub fn jobs(&self) -> Vec<ImageJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageProcessor for RecordingProcessor {
    async fn process(&self, job: ImageJob) -> Result<ImageProcessingResult, ImageError> {
        self.jobs.lock().unwrap().push(job.clone());
        if self.fail_on.as_deref() == Some(job.file_name.as_str()) {
            return Err(ImageError::Download {
                url: job.url,
                source: FigmaError::Timeout,
            });
        }
        Ok(ImageProcessingResult::stored(job.dest_dir.join(&job.file_name)))
    }
}
