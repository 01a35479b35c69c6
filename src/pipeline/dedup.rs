use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{CanonicalEvent, ClassifiedEvent, DedupDecision};

/// Stable dedup key over normalized title, city and date. Case and
/// punctuation differences collapse; materially different titles do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(title: &str, city: &str, date: NaiveDate) -> Self {
        let canonical = format!("{}|{}|{}", fold(title), fold(city), date.format("%Y-%m-%d"));
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn of(event: &ClassifiedEvent) -> Self {
        Self::compute(&event.event.title, &event.event.city, event.event.date)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Case-fold, strip punctuation, collapse whitespace. "Climate March!"
/// and "climate  march" fold to the same key component.
fn fold(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Per-run fingerprint index. Built fresh from a store snapshot at the
/// start of every run so externally-interleaved writes are reconciled
/// rather than assumed away.
#[derive(Debug, Default)]
pub struct FingerprintIndex {
    entries: HashMap<String, IndexEntry>,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    id: Uuid,
    sources: Vec<String>,
}

impl FingerprintIndex {
    /// Index a snapshot of the canonical store.
    pub fn from_snapshot(events: &[CanonicalEvent]) -> Self {
        let mut entries = HashMap::with_capacity(events.len());
        for event in events {
            entries.insert(
                event.fingerprint.clone(),
                IndexEntry {
                    id: event.id,
                    sources: event.sources.clone(),
                },
            );
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decide whether a classified event is new, refines an existing row,
    /// or is a full duplicate. Exact fingerprint match only.
    pub fn resolve(&self, event: &ClassifiedEvent) -> DedupDecision {
        let fingerprint = Fingerprint::of(event);
        match self.entries.get(fingerprint.as_str()) {
            None => DedupDecision::New,
            Some(entry) if entry.sources.iter().any(|s| s == &event.event.source_id) => {
                DedupDecision::Duplicate(entry.id)
            }
            Some(entry) => DedupDecision::Update(entry.id),
        }
    }

    /// Record a row the writer just inserted so later records in the same
    /// run dedup against it. The single-writer sequence makes this safe.
    pub fn insert(&mut self, event: &CanonicalEvent) {
        self.entries.insert(
            event.fingerprint.clone(),
            IndexEntry {
                id: event.id,
                sources: event.sources.clone(),
            },
        );
    }
}
