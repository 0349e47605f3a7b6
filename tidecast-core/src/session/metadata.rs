//! Content metadata resolution.
//!
//! Metadata is fetched best-effort as a JSON descriptor per content id.
//! An unreachable metadata source is a recoverable condition: the session
//! synthesizes a default descriptor and keeps going.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Describes one piece of playable content.
///
/// Immutable for the lifetime of a session; owned by the session that
/// resolved it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDescriptor {
    pub content_id: String,
    pub title: String,
    /// Total duration in seconds, 0 when unknown
    #[serde(default)]
    pub duration_secs: u64,
    /// Quality label to source locator
    #[serde(default)]
    pub sources: HashMap<String, String>,
    /// Raw locator used when no per-quality mapping exists
    #[serde(default)]
    pub default_source: Option<String>,
}

impl ContentDescriptor {
    /// Synthesizes a default descriptor for when the metadata source is
    /// unavailable. The content id doubles as the raw source locator.
    pub fn synthesized(content_id: &str) -> Self {
        Self {
            content_id: content_id.to_string(),
            title: format!("Content {content_id}"),
            duration_secs: 0,
            sources: HashMap::new(),
            default_source: Some(content_id.to_string()),
        }
    }
}

/// A metadata fetch that could not be completed.
#[derive(Debug, thiserror::Error)]
#[error("metadata unavailable for {content_id}: {reason}")]
pub struct MetadataError {
    pub content_id: String,
    pub reason: String,
}

/// Best-effort source of content descriptors.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetches the descriptor for `content_id`.
    ///
    /// # Errors
    ///
    /// - `MetadataError` - Descriptor missing or the source is unreachable;
    ///   callers recover by synthesizing defaults
    async fn fetch(&self, content_id: &str) -> Result<ContentDescriptor, MetadataError>;
}

/// Fetches JSON descriptors over HTTP from a metadata base locator.
pub struct HttpMetadataSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMetadataSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn fetch(&self, content_id: &str) -> Result<ContentDescriptor, MetadataError> {
        let url = format!(
            "{}/{}.json",
            self.base_url.trim_end_matches('/'),
            content_id
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MetadataError {
                content_id: content_id.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(MetadataError {
                content_id: content_id.to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        response
            .json::<ContentDescriptor>()
            .await
            .map_err(|e| MetadataError {
                content_id: content_id.to_string(),
                reason: e.to_string(),
            })
    }
}

/// In-memory descriptor store for tests and the demo CLI.
#[derive(Default)]
pub struct StaticMetadataSource {
    descriptors: Mutex<HashMap<String, ContentDescriptor>>,
}

impl StaticMetadataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, descriptor: ContentDescriptor) {
        self.descriptors
            .lock()
            .insert(descriptor.content_id.clone(), descriptor);
    }
}

#[async_trait]
impl MetadataSource for StaticMetadataSource {
    async fn fetch(&self, content_id: &str) -> Result<ContentDescriptor, MetadataError> {
        self.descriptors
            .lock()
            .get(content_id)
            .cloned()
            .ok_or_else(|| MetadataError {
                content_id: content_id.to_string(),
                reason: "no descriptor registered".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesized_descriptor_uses_content_id_as_raw_source() {
        let descriptor = ContentDescriptor::synthesized("content_001");

        assert_eq!(descriptor.content_id, "content_001");
        assert_eq!(descriptor.default_source.as_deref(), Some("content_001"));
        assert!(descriptor.sources.is_empty());
    }

    #[test]
    fn test_descriptor_deserializes_with_missing_optional_fields() {
        let descriptor: ContentDescriptor =
            serde_json::from_str(r#"{"content_id": "content_001", "title": "Tide Pool"}"#)
                .unwrap();

        assert_eq!(descriptor.title, "Tide Pool");
        assert_eq!(descriptor.duration_secs, 0);
        assert!(descriptor.sources.is_empty());
        assert!(descriptor.default_source.is_none());
    }

    #[tokio::test]
    async fn test_static_source_round_trip() {
        let source = StaticMetadataSource::new();
        source.insert(ContentDescriptor::synthesized("content_001"));

        let descriptor = source.fetch("content_001").await.unwrap();
        assert_eq!(descriptor.content_id, "content_001");

        let missing = source.fetch("content_404").await;
        assert!(missing.is_err());
    }
}
