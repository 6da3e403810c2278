//! Source documents, tiers and product identity.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AttributionError, Result};

/// Ordinal reliability class of a source.
///
/// Ordering follows reliability: `TierOne < TierTwo`, so sorting ascending
/// puts the most trusted evidence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceTier {
    /// Manufacturer pages and API feeds
    #[serde(rename = "tier_1", alias = "Tier_1", alias = "tier_one", alias = "1")]
    TierOne,

    /// General web
    #[serde(rename = "tier_2", alias = "Tier_2", alias = "tier_two", alias = "2")]
    TierTwo,
}

impl SourceTier {
    pub fn is_more_reliable_than(self, other: SourceTier) -> bool {
        self < other
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TierOne => "tier_1",
            Self::TierTwo => "tier_2",
        }
    }
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of payload a retrieval collaborator hands over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Html,
    Image,
}

/// Raw payload of a source document.
#[derive(Clone, PartialEq)]
pub enum SourceContent {
    Text(String),
    Html(String),
    Image { bytes: Vec<u8>, mime_type: String },
    /// Payload that could not be decoded at retrieval time
    Unreadable { kind: ContentKind, reason: String },
}

impl SourceContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Text(_) => ContentKind::Text,
            Self::Html(_) => ContentKind::Html,
            Self::Image { .. } => ContentKind::Image,
            Self::Unreadable { kind, .. } => *kind,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) | Self::Html(s) => s.trim().is_empty(),
            Self::Image { bytes, .. } => bytes.is_empty(),
            Self::Unreadable { .. } => true,
        }
    }
}

impl fmt::Debug for SourceContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "Text({} bytes)", s.len()),
            Self::Html(s) => write!(f, "Html({} bytes)", s.len()),
            Self::Image { bytes, mime_type } => {
                write!(f, "Image({} bytes, {})", bytes.len(), mime_type)
            }
            Self::Unreadable { kind, reason } => write!(f, "Unreadable({kind:?}: {reason})"),
        }
    }
}

/// Metadata attached to a source by the retrieval collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

/// One unit of scraped evidence for a product. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub url: String,
    pub content: SourceContent,
    pub tier: SourceTier,
    pub metadata: SourceMetadata,
}

impl SourceDocument {
    pub fn new(url: impl Into<String>, tier: SourceTier, content: SourceContent) -> Self {
        Self {
            url: url.into(),
            content,
            tier,
            metadata: SourceMetadata::default(),
        }
    }

    pub fn text(url: impl Into<String>, tier: SourceTier, body: impl Into<String>) -> Self {
        Self::new(url, tier, SourceContent::Text(body.into()))
    }

    pub fn html(url: impl Into<String>, tier: SourceTier, body: impl Into<String>) -> Self {
        Self::new(url, tier, SourceContent::Html(body.into()))
    }

    pub fn image(
        url: impl Into<String>,
        tier: SourceTier,
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self::new(
            url,
            tier,
            SourceContent::Image {
                bytes,
                mime_type: mime_type.into(),
            },
        )
    }

    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Wire form of a retrieved source, keyed by URL in [`RetrievedSources`].
///
/// Image payloads travel base64 encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedSource {
    pub content: String,
    pub content_kind: ContentKind,
    pub tier: SourceTier,
    #[serde(default)]
    pub metadata: SourceMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// URL to retrieved content, as produced by the retrieval collaborator.
pub type RetrievedSources = IndexMap<String, RetrievedSource>;

impl RetrievedSource {
    /// Decode into a [`SourceDocument`].
    pub fn into_document(self, url: String) -> Result<SourceDocument> {
        let (tier, metadata) = (self.tier, self.metadata.clone());
        let content = self.decode(&url).map_err(|reason| AttributionError::InvalidSource {
            url: url.clone(),
            reason,
        })?;
        Ok(SourceDocument {
            url,
            content,
            tier,
            metadata,
        })
    }

    /// Decode into a [`SourceDocument`], keeping a payload that fails to
    /// decode as [`SourceContent::Unreadable`] so extraction can report it
    /// as a skipped source.
    pub fn into_document_or_unreadable(self, url: String) -> SourceDocument {
        let (kind, tier, metadata) = (self.content_kind, self.tier, self.metadata.clone());
        let content = self
            .decode(&url)
            .unwrap_or_else(|reason| SourceContent::Unreadable { kind, reason });
        SourceDocument {
            url,
            content,
            tier,
            metadata,
        }
    }

    fn decode(self, url: &str) -> std::result::Result<SourceContent, String> {
        let content = match self.content_kind {
            ContentKind::Text => SourceContent::Text(self.content),
            ContentKind::Html => SourceContent::Html(self.content),
            ContentKind::Image => {
                let bytes = BASE64
                    .decode(self.content.trim())
                    .map_err(|e| format!("image payload is not base64: {e}"))?;
                let mime_type = self
                    .mime_type
                    .unwrap_or_else(|| guess_image_mime(url).to_string());
                SourceContent::Image { bytes, mime_type }
            }
        };
        Ok(content)
    }
}

/// Decode every retrieved source, preserving map order.
pub fn into_documents(sources: RetrievedSources) -> Result<Vec<SourceDocument>> {
    sources
        .into_iter()
        .map(|(url, source)| source.into_document(url))
        .collect()
}

fn guess_image_mime(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".jpg") || path.ends_with(".jpeg") {
        "image/jpeg"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else {
        "image/png"
    }
}

/// Known identity of the product being attributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductContext {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

impl ProductContext {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            manufacturer: None,
            size: None,
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }
}
