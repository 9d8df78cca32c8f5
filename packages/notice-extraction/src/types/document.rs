//! Ingested documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Declared kind of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Periodic government gazette body holding many notices
    Gazette,
    /// A single court registry filing
    CaseFiling,
    /// A news article
    Article,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gazette => "gazette",
            Self::CaseFiling => "case_filing",
            Self::Article => "article",
        }
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "gazette" => Ok(Self::Gazette),
            "case_filing" | "filing" => Ok(Self::CaseFiling),
            "article" | "news" => Ok(Self::Article),
            other => Err(format!("unknown document kind: {other}")),
        }
    }
}

/// A raw document handed to the pipeline.
///
/// Immutable once created; the trigger that built it owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Opaque identifier chosen by the caller
    pub id: String,

    /// Declared kind
    pub kind: DocumentKind,

    /// Full raw text
    pub text: String,

    /// Headline (articles) or caption (filings), if known up front
    pub title: Option<String>,

    /// Where the document came from
    pub source_url: Option<String>,

    /// Publication or received timestamp
    pub published_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document published now.
    pub fn new(id: impl Into<String>, kind: DocumentKind, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            text: text.into(),
            title: None,
            source_url: None,
            published_at: Utc::now(),
        }
    }

    /// Create a document whose id is the SHA256 of its text.
    pub fn from_text(kind: DocumentKind, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let id = hex::encode(hasher.finalize());
        Self::new(id, kind, text)
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the source URL.
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Set the publication timestamp.
    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = published_at;
        self
    }

    /// The first `max_chars` characters of the body.
    pub fn excerpt(&self, max_chars: usize) -> &str {
        match self.text.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.text[..idx],
            None => &self.text,
        }
    }
}
