use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::dedup::Fingerprint;
use super::normalize::format_event_datetime;
use crate::common::error::WriteError;
use crate::connectors::fetch::RetryPolicy;
use crate::domain::{CanonicalEvent, ClassifiedEvent, DedupDecision, UpsertOutcome};
use crate::observability::metrics;
use crate::storage::EventStore;

/// Sole writer of canonical rows. Upserts are individually idempotent:
/// replaying the same input against an unchanged store yields the same
/// outcome classification and no duplicate rows.
pub struct CanonicalWriter {
    store: Arc<dyn EventStore>,
    policy: RetryPolicy,
}

impl CanonicalWriter {
    pub fn new(store: Arc<dyn EventStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Apply one dedup decision. Connectivity failures retry a bounded
    /// number of times; a record that still fails is reported to the
    /// caller, which counts it and moves on (per-record isolation).
    pub async fn upsert(
        &self,
        event: &ClassifiedEvent,
        decision: &DedupDecision,
    ) -> Result<(UpsertOutcome, Option<CanonicalEvent>), WriteError> {
        match decision {
            DedupDecision::New => {
                let row = build_row(event);
                self.with_retry(|| self.store.insert_event(&row)).await?;
                metrics::writer::inserted();
                debug!(
                    "inserted '{}' ({}) in {}",
                    row.title,
                    format_event_datetime(row.date, row.time),
                    row.city
                );
                Ok((UpsertOutcome::Inserted, Some(row)))
            }
            DedupDecision::Update(id) => {
                let existing = self
                    .with_retry(|| self.store.get_event(*id))
                    .await?
                    .ok_or(WriteError::MissingRow(*id))?;
                let merged = merge_row(existing, event);
                self.with_retry(|| self.store.update_event(&merged)).await?;
                metrics::writer::updated();
                Ok((UpsertOutcome::Updated, Some(merged)))
            }
            DedupDecision::Duplicate(id) => {
                debug!(event = %event.event.title, row = %id, "duplicate sighting, skipping");
                metrics::writer::skipped();
                Ok((UpsertOutcome::Skipped, None))
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, WriteError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, WriteError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(WriteError::Connectivity(reason)) if attempt + 1 < self.policy.max_attempts => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(reason = %reason, attempt, "store write failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn build_row(event: &ClassifiedEvent) -> CanonicalEvent {
    let now = Utc::now();
    CanonicalEvent {
        id: Uuid::new_v4(),
        fingerprint: Fingerprint::of(event).into_string(),
        title: event.event.title.clone(),
        city: event.event.city.clone(),
        date: event.event.date,
        time: event.event.time,
        url: event.event.url.clone(),
        description: event.event.description.clone(),
        country_code: event.country_code.clone(),
        category: event.category,
        event_type: event.event_type.clone(),
        sources: vec![event.event.source_id.clone()],
        first_seen_at: now,
        last_updated_at: now,
    }
}

/// Merge a later sighting into the existing row. Only fields the row is
/// missing are filled in; a populated field is never overwritten with an
/// absent one. Provenance gains the new source exactly once.
fn merge_row(mut existing: CanonicalEvent, event: &ClassifiedEvent) -> CanonicalEvent {
    if existing.time.is_none() {
        existing.time = event.event.time;
    }
    if existing.url.is_none() {
        existing.url = event.event.url.clone();
    }
    if existing.description.is_none() {
        existing.description = event.event.description.clone();
    }
    if !existing.sources.iter().any(|s| s == &event.event.source_id) {
        existing.sources.push(event.event.source_id.clone());
    }
    existing.last_updated_at = Utc::now();
    existing
}
