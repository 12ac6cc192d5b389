//! Figma API types
//!
//! Defines the response schemas this crate relies on. Only the fields the
//! cache and query layers need are typed; everything else is carried along
//! verbatim in flattened maps so re-serialized documents keep their API shape.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A node in the document tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node ID, unique within a file (e.g. "10:20")
    pub id: String,
    /// Node type tag ("DOCUMENT", "CANVAS", "FRAME", ...)
    #[serde(rename = "type")]
    pub node_type: String,
    /// Child nodes, absent for leaf types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Node>>,
    /// Every other property of the node, untouched
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Node {
    /// Children of this node, empty for leaves
    pub fn child_nodes(&self) -> &[Node] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Whether this node has at least one child
    pub fn has_children(&self) -> bool {
        !self.child_nodes().is_empty()
    }

    /// Display name of the node, if present
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(Value::as_str)
    }
}

/// Response from `GET /v1/files/:key`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDocument {
    pub name: String,
    #[serde(default)]
    pub last_modified: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_type: Option<String>,
    /// Root DOCUMENT node
    pub document: Node,
    #[serde(default)]
    pub components: Map<String, Value>,
    #[serde(default)]
    pub component_sets: Map<String, Value>,
    #[serde(default)]
    pub styles: Map<String, Value>,
    #[serde(default)]
    pub schema_version: u32,
    /// Remaining top-level fields (branches, mainFileKey, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of a node-scoped response, wrapped with the file's shared tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEntry {
    pub document: Node,
    #[serde(default)]
    pub components: Map<String, Value>,
    #[serde(default)]
    pub component_sets: Map<String, Value>,
    #[serde(default)]
    pub styles: Map<String, Value>,
    #[serde(default)]
    pub schema_version: u32,
}

/// Response from `GET /v1/files/:key/nodes`
///
/// The API answers `null` for IDs it could not find, hence the `Option`.
/// Entries keep the order the IDs were requested in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNodesResponse {
    pub name: String,
    #[serde(default)]
    pub last_modified: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub editor_type: String,
    pub nodes: IndexMap<String, Option<NodeEntry>>,
}

/// Response from `GET /v1/images/:key`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagesResponse {
    #[serde(default)]
    pub err: Option<String>,
    #[serde(default)]
    pub images: HashMap<String, Option<String>>,
}

/// Response from `GET /v1/files/:key/images`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageFillsResponse {
    #[serde(default)]
    pub meta: ImageFillsMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageFillsMeta {
    #[serde(default)]
    pub images: HashMap<String, Option<String>>,
}

/// Drop entries the API returned without a usable URL
pub fn filter_valid_urls(images: HashMap<String, Option<String>>) -> HashMap<String, String> {
    images
        .into_iter()
        .filter_map(|(id, url)| match url {
            Some(url) if !url.is_empty() => Some((id, url)),
            _ => None,
        })
        .collect()
}

/// Export format for rendered nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Svg,
}

impl ImageFormat {
    /// Pick the export format from a target file name
    pub fn from_file_name(file_name: &str) -> Self {
        if file_name.to_ascii_lowercase().ends_with(".svg") {
            ImageFormat::Svg
        } else {
            ImageFormat::Png
        }
    }
}

/// SVG export flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvgOptions {
    pub outline_text: bool,
    pub include_id: bool,
    pub simplify_stroke: bool,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            outline_text: true,
            include_id: false,
            simplify_stroke: true,
        }
    }
}

/// Render parameters for a single `GET /v1/images/:key` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderRequest {
    Png { scale: f64 },
    Svg(SvgOptions),
}

impl RenderRequest {
    /// Query parameters for this render, excluding `ids`
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        match self {
            RenderRequest::Png { scale } => vec![
                ("format", "png".to_string()),
                ("scale", scale.to_string()),
            ],
            RenderRequest::Svg(svg) => vec![
                ("format", "svg".to_string()),
                ("svg_outline_text", svg.outline_text.to_string()),
                ("svg_include_id", svg.include_id.to_string()),
                ("svg_simplify_stroke", svg.simplify_stroke.to_string()),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_node_keeps_properties() {
        let json = r#"{
            "id": "1:2",
            "name": "Button",
            "type": "FRAME",
            "absoluteBoundingBox": {"x": 0, "y": 0, "width": 120, "height": 40},
            "children": [
                {"id": "1:3", "name": "Label", "type": "TEXT", "characters": "OK"}
            ]
        }"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node.id, "1:2");
        assert_eq!(node.node_type, "FRAME");
        assert_eq!(node.name(), Some("Button"));
        assert!(node.properties.contains_key("absoluteBoundingBox"));
        assert_eq!(node.child_nodes().len(), 1);
        assert_eq!(node.child_nodes()[0].properties["characters"], "OK");

        let back = serde_json::to_value(&node).unwrap();
        assert_eq!(back["type"], "FRAME");
        assert_eq!(back["absoluteBoundingBox"]["width"], 120);
        assert!(back["children"][0].get("children").is_none());
    }

    #[test]
    fn test_deserialize_file_document_with_extra_fields() {
        let json = r#"{
            "name": "Design System",
            "lastModified": "2024-01-01T00:00:00Z",
            "thumbnailUrl": "https://example.com/thumb.png",
            "version": "42",
            "role": "owner",
            "editorType": "figma",
            "mainFileKey": "abc",
            "document": {"id": "0:0", "name": "Document", "type": "DOCUMENT", "children": []},
            "components": {"1:5": {"key": "k", "name": "Icon"}},
            "styles": {},
            "schemaVersion": 0
        }"#;
        let file: FileDocument = serde_json::from_str(json).unwrap();
        assert_eq!(file.name, "Design System");
        assert_eq!(file.version.as_deref(), Some("42"));
        assert_eq!(file.extra["mainFileKey"], "abc");
        assert!(file.component_sets.is_empty());
        assert!(!file.document.has_children());

        let back = serde_json::to_value(&file).unwrap();
        assert_eq!(back["mainFileKey"], "abc");
        assert_eq!(back["components"]["1:5"]["name"], "Icon");
    }

    #[test]
    fn test_file_document_requires_document() {
        let json = r#"{"name": "No tree", "lastModified": "2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<FileDocument>(json).is_err());
    }

    #[test]
    fn test_deserialize_nodes_response_with_missing_node() {
        let json = r#"{
            "name": "File",
            "lastModified": "2024-01-01T00:00:00Z",
            "thumbnailUrl": "",
            "version": "1",
            "role": "viewer",
            "editorType": "figma",
            "nodes": {
                "1:2": {"document": {"id": "1:2", "type": "FRAME"}, "components": {}, "styles": {}, "schemaVersion": 0},
                "9:9": null
            }
        }"#;
        let resp: FileNodesResponse = serde_json::from_str(json).unwrap();
        assert!(resp.nodes["1:2"].is_some());
        assert!(resp.nodes["9:9"].is_none());
    }

    #[test]
    fn test_filter_valid_urls() {
        let mut images = HashMap::new();
        images.insert("a".to_string(), Some("https://img/a.png".to_string()));
        images.insert("b".to_string(), None);
        images.insert("c".to_string(), Some(String::new()));
        let valid = filter_valid_urls(images);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid["a"], "https://img/a.png");
    }

    #[test]
    fn test_image_format_from_file_name() {
        assert_eq!(ImageFormat::from_file_name("icon.svg"), ImageFormat::Svg);
        assert_eq!(ImageFormat::from_file_name("ICON.SVG"), ImageFormat::Svg);
        assert_eq!(ImageFormat::from_file_name("hero.png"), ImageFormat::Png);
        assert_eq!(ImageFormat::from_file_name("photo"), ImageFormat::Png);
    }

    #[test]
    fn test_render_query_params() {
        let png = RenderRequest::Png { scale: 2.0 }.query_params();
        assert_eq!(png, vec![("format", "png".to_string()), ("scale", "2".to_string())]);

        let svg = RenderRequest::Svg(SvgOptions::default()).query_params();
        assert!(svg.contains(&("svg_outline_text", "true".to_string())));
        assert!(svg.contains(&("svg_include_id", "false".to_string())));
        assert!(svg.contains(&("svg_simplify_stroke", "true".to_string())));
    }
}
