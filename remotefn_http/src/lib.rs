// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

pub mod result;

pub use result::{NodeRef, ResultNode, XmlElement};

use remotefn_api::config::RestMethod;

/// One concrete request produced by the renderer for one batch.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RenderedRequest {
    pub method: RestMethod,
    /// Full target URL, including the rendered query string for GET.
    pub url: String,
    pub body: RenderedBody,
    /// Extra headers, e.g. the configured authentication header.
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RenderedBody {
    /// GET requests carry everything in the query string.
    None,
    /// One JSON entity.
    Json(serde_json::Value),
    /// One JSON-encoded multipart part per top-level field of the document,
    /// named after the field.
    MultipartJson(Vec<(String, serde_json::Value)>),
}

/// The response body formats the invoker can classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Json,
    Xml,
    Text,
}

/// Classify a response by its Content-Type header; anything that is neither
/// JSON nor XML is treated as plain text.
pub fn classify_content_type(content_type: Option<&str>) -> BodyFormat {
    match content_type {
        Some(value) if value.contains("json") => BodyFormat::Json,
        Some(value) if value.contains("xml") => BodyFormat::Xml,
        _ => BodyFormat::Text,
    }
}

/// Parse a response body into the uniform result representation.
pub fn parse_body(format: BodyFormat, bytes: &[u8]) -> anyhow::Result<ResultNode> {
    match format {
        BodyFormat::Json => Ok(ResultNode::Json(serde_json::from_slice(bytes)?)),
        BodyFormat::Xml => Ok(ResultNode::Xml(result::parse_xml(bytes)?)),
        BodyFormat::Text => Ok(ResultNode::Text(String::from_utf8(bytes.to_vec())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_content_type() {
        assert_eq!(classify_content_type(Some("application/json")), BodyFormat::Json);
        assert_eq!(
            classify_content_type(Some("application/json; charset=utf-8")),
            BodyFormat::Json
        );
        assert_eq!(classify_content_type(Some("text/xml")), BodyFormat::Xml);
        assert_eq!(classify_content_type(Some("text/plain")), BodyFormat::Text);
        assert_eq!(classify_content_type(None), BodyFormat::Text);
    }

    #[test]
    fn test_parse_body_json() {
        let node = parse_body(BodyFormat::Json, b"{\"a\": [1, 2]}").unwrap();
        match node {
            ResultNode::Json(value) => assert_eq!(value["a"][1], serde_json::json!(2)),
            _ => panic!("expected a json node"),
        }
    }

    #[test]
    fn test_parse_body_text_passthrough() {
        let node = parse_body(BodyFormat::Text, b"it worked").unwrap();
        assert_eq!(node, ResultNode::Text("it worked".to_string()));
    }
}
