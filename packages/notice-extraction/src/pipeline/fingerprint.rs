//! Record identity and duplicate suppression.
//!
//! Two independent checks run before anything is persisted:
//! - exact: SHA256 of the canonical natural key
//! - near-duplicate: normalized Levenshtein similarity of article titles
//!
//! The storage layer's atomic insert is the final word; these checks only
//! avoid wasted work.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::StoreResult;
use crate::traits::store::RecordStore;
use crate::types::record::{Record, RecordKind};

/// Separator between canonical key fields.
pub const KEY_SEPARATOR: &str = "|";

/// Slack for floating point error at the similarity threshold.
const SIMILARITY_EPSILON: f64 = 1e-9;

/// Natural-key fields of a record in their fixed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalKey {
    kind: RecordKind,
    fields: Vec<String>,
}

impl NaturalKey {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    /// Append the next key field.
    pub fn field(mut self, value: impl AsRef<str>) -> Self {
        self.fields.push(value.as_ref().to_string());
        self
    }

    /// Canonical form: kind, then each field trimmed, whitespace-collapsed
    /// and lowercased, joined by `KEY_SEPARATOR`.
    pub fn canonical(&self) -> String {
        std::iter::once(self.kind.as_str().to_string())
            .chain(self.fields.iter().map(|f| canonical_field(f)))
            .collect::<Vec<_>>()
            .join(KEY_SEPARATOR)
    }
}

fn canonical_field(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Hex SHA256 of the canonical natural key.
///
/// Depends only on the key fields; never on run, machine or clock.
pub fn fingerprint(key: &NaturalKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.canonical().as_bytes());
    hex::encode(hasher.finalize())
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Similarity in `[0, 1]`: one minus the normalized Levenshtein distance of
/// the normalized titles.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&normalize_title(a), &normalize_title(b))
}

/// Whether two titles are at least `threshold` similar.
pub fn is_near_duplicate(a: &str, b: &str, threshold: f64) -> bool {
    title_similarity(a, b) + SIMILARITY_EPSILON >= threshold
}

/// Outcome of a duplicate check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum DedupVerdict {
    Unique,
    /// Same fingerprint already stored or seen this run
    Exact,
    /// Title within the similarity threshold of an existing one
    NearDuplicate { matched: String },
}

impl DedupVerdict {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Self::Unique)
    }
}

/// Per-run duplicate tracker backed by a record store.
///
/// Shared across concurrently processed documents; fingerprints and titles
/// registered here are visible to every later check in the same run.
pub struct Deduplicator {
    seen: Mutex<HashSet<String>>,
    /// Titles registered during this run
    run_titles: Mutex<HashMap<RecordKind, Vec<String>>>,
    /// Stored titles, loaded once per kind
    stored_titles: Mutex<HashMap<RecordKind, Vec<String>>>,
    threshold: f64,
    window: usize,
}

impl Deduplicator {
    /// `window` bounds how many stored titles are compared per kind.
    pub fn new(threshold: f64, window: usize) -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            run_titles: Mutex::new(HashMap::new()),
            stored_titles: Mutex::new(HashMap::new()),
            threshold,
            window,
        }
    }

    /// Whether a fingerprint was registered this run or is already stored.
    pub async fn is_duplicate<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        fingerprint: &str,
    ) -> StoreResult<bool> {
        if self.seen.lock().await.contains(fingerprint) {
            return Ok(true);
        }
        store.contains_fingerprint(fingerprint).await
    }

    /// Remember a fingerprint (and title) for the rest of the run.
    pub async fn register(&self, fingerprint: &str, kind: RecordKind, title: Option<&str>) {
        self.seen.lock().await.insert(fingerprint.to_string());
        if let Some(title) = title {
            self.run_titles
                .lock()
                .await
                .entry(kind)
                .or_default()
                .push(title.to_string());
        }
    }

    /// First known title of `kind` within the threshold of `title`.
    pub async fn near_duplicate<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        kind: RecordKind,
        title: &str,
    ) -> StoreResult<Option<String>> {
        let matches = |known: Option<&Vec<String>>| {
            known.and_then(|titles| {
                titles
                    .iter()
                    .find(|t| is_near_duplicate(t, title, self.threshold))
                    .cloned()
            })
        };

        if let Some(matched) = matches(self.run_titles.lock().await.get(&kind)) {
            return Ok(Some(matched));
        }

        let mut stored = self.stored_titles.lock().await;
        if !stored.contains_key(&kind) {
            let recent = store.recent_titles(kind, self.window).await?;
            stored.insert(kind, recent);
        }
        Ok(matches(stored.get(&kind)))
    }

    /// Run both checks for a record.
    pub async fn check<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        record: &Record,
    ) -> StoreResult<DedupVerdict> {
        if self.is_duplicate(store, &record.fingerprint).await? {
            return Ok(DedupVerdict::Exact);
        }
        if let Some(title) = record.body.near_duplicate_title() {
            if let Some(matched) = self.near_duplicate(store, record.kind(), title).await? {
                return Ok(DedupVerdict::NearDuplicate { matched });
            }
        }
        Ok(DedupVerdict::Unique)
    }

    /// Register a record that was just persisted.
    pub async fn register_record(&self, record: &Record) {
        self.register(
            &record.fingerprint,
            record.kind(),
            record.body.near_duplicate_title(),
        )
        .await;
    }
}
