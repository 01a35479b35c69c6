use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A listing exactly as one source reported it. Loosely typed on purpose:
/// dates, times and locations are free text until normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawListing {
    pub source_id: String,
    pub external_id: Option<String>,
    pub title: String,
    pub raw_date: String,
    pub raw_time: Option<String>,
    pub raw_location: String,
    pub description: Option<String>,
    pub url: Option<String>,
}

/// Canonical shape of a listing after field normalization. `time` is
/// `None` when the source did not state one ("time unknown"), which is
/// not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub title: String,
    pub city: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub url: Option<String>,
    pub source_id: String,
    pub description: Option<String>,
}

/// Closed category taxonomy. Classification never produces a null:
/// anything the keyword rules miss falls back to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Protest,
    Strike,
    Vigil,
    March,
    Rally,
    Demonstration,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Protest => "protest",
            Category::Strike => "strike",
            Category::Vigil => "vigil",
            Category::March => "march",
            Category::Rally => "rally",
            Category::Demonstration => "demonstration",
            Category::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized event with country and category assigned. Both fields are
/// always concrete values so downstream country filters never silently
/// drop a row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    #[serde(flatten)]
    pub event: NormalizedEvent,
    pub country_code: String,
    pub category: Category,
    pub event_type: String,
}

/// A row in the canonical store: the reconciled event plus identity,
/// lifecycle timestamps and the provenance list of every source that has
/// independently reported it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub id: Uuid,
    pub fingerprint: String,
    pub title: String,
    pub city: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub country_code: String,
    pub category: Category,
    pub event_type: String,
    pub sources: Vec<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// Three-way dedup outcome for one classified event against the
/// fingerprint index of the current store snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupDecision {
    /// No existing row shares the fingerprint.
    New,
    /// An existing row shares the fingerprint; merge refinements in.
    Update(Uuid),
    /// The existing row already lists this source; nothing to write.
    Duplicate(Uuid),
}

/// Result classification of a single upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Skipped,
}

/// Terminal state of one source's branch within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Succeeded { fetched: usize, duration_ms: u64 },
    Failed { reason: String },
    Skipped { reason: String },
}

impl SourceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SourceOutcome::Succeeded { .. })
    }
}

/// Structured per-run summary, serialized as JSON for logging/alerting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub reference_date: NaiveDate,
    pub sources: std::collections::BTreeMap<String, SourceOutcome>,
    pub fetched: usize,
    pub normalized: usize,
    pub normalization_dropped: usize,
    pub classified_other: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub write_failed: usize,
    pub success: bool,
}

impl RunReport {
    pub fn new(reference_date: NaiveDate) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            reference_date,
            sources: std::collections::BTreeMap::new(),
            fetched: 0,
            normalized: 0,
            normalization_dropped: 0,
            classified_other: 0,
            inserted: 0,
            updated: 0,
            skipped: 0,
            write_failed: 0,
            success: false,
        }
    }

    /// A run counts as successful when at least one source succeeded.
    pub fn any_source_succeeded(&self) -> bool {
        self.sources.values().any(|o| o.is_success())
    }

    pub fn complete(&mut self) {
        self.finished_at = Some(Utc::now());
        let any_failed = self
            .sources
            .values()
            .any(|o| matches!(o, SourceOutcome::Failed { .. }));
        // At least one success, or nothing actually failed (e.g. every
        // source was cadence-skipped): the run stands. All-failed runs
        // are the hard-failure case.
        self.success = self.any_source_succeeded() || !any_failed;
    }
}
