//! Core domain types for harvested documentation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// SourceKind
// ---------------------------------------------------------------------------

/// Which kind of content source produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Web,
    Github,
    Gitlab,
    Local,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "web" => Ok(Self::Web),
            "github" => Ok(Self::Github),
            "gitlab" => Ok(Self::Gitlab),
            "local" => Ok(Self::Local),
            other => Err(format!(
                "unknown source '{other}': expected web, github, gitlab, or local"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Section
// ---------------------------------------------------------------------------

/// One heading of a page outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Heading level (1–3).
    pub level: u8,
    /// Whitespace-collapsed heading text.
    pub text: String,
}

impl Section {
    pub fn new(level: u8, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// A single harvested page or file, keyed by URL or repository-relative path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Unique key: page URL (web) or full relative path (repositories, local).
    pub key: String,
    /// Source that produced the entry.
    pub source: SourceKind,
    /// Raw text content (empty when `error` is set).
    pub content: String,
    /// Extracted title; empty when absent.
    #[serde(default)]
    pub title: String,
    /// Heading outline in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outline: Vec<Section>,
    /// Outbound same-origin links (web pages only).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub links: BTreeSet<String>,
    /// In-band failure message if the fetch or read failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// SHA-256 hash of `content`.
    pub content_hash: String,
    /// When the entry was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl Entry {
    /// A successfully read entry with plain content and no metadata.
    pub fn text(key: impl Into<String>, source: SourceKind, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            key: key.into(),
            source,
            content_hash: content_hash(&content),
            content,
            title: String::new(),
            outline: Vec::new(),
            links: BTreeSet::new(),
            error: None,
            fetched_at: Utc::now(),
        }
    }

    /// An entry recording a failed fetch or read.
    pub fn failed(key: impl Into<String>, source: SourceKind, error: impl Into<String>) -> Self {
        let mut entry = Self::text(key, source, "");
        entry.error = Some(error.into());
        entry
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_outline(mut self, outline: Vec<Section>) -> Self {
        self.outline = outline;
        self
    }

    pub fn with_links(mut self, links: impl IntoIterator<Item = String>) -> Self {
        self.links = links.into_iter().collect();
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Text written to the flat JSON dump: the content, or the error message.
    pub fn flat_text(&self) -> &str {
        self.error.as_deref().unwrap_or(&self.content)
    }
}

/// Compute the SHA-256 hex digest of a text body.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
