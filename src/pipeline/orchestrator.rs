use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::classify::classify;
use super::dedup::FingerprintIndex;
use super::ingest_meta::IngestMeta;
use super::normalize::normalize;
use super::writer::CanonicalWriter;
use crate::common::error::{PipelineError, Result, SourceError};
use crate::config::Settings;
use crate::connectors::{create_connector, SourceConnector};
use crate::domain::{Category, DedupDecision, RawListing, RunReport, SourceOutcome, UpsertOutcome};
use crate::observability::metrics;
use crate::registry::SourceRegistry;
use crate::storage::EventStore;

/// Options for a single pipeline run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Restrict the run to these source ids; `None` runs every enabled
    /// source.
    pub sources: Option<Vec<String>>,
    /// Reference date for relative-date resolution ("Today", "Next ...").
    pub reference_date: NaiveDate,
    /// Fetch even when the cadence guard says a source was fetched
    /// recently.
    pub bypass_cadence: bool,
}

impl RunOptions {
    pub fn for_today() -> Self {
        Self {
            sources: None,
            reference_date: chrono::Utc::now().date_naive(),
            bypass_cadence: false,
        }
    }
}

/// Drives a full ingestion run: bounded-parallel connector fetches, then
/// normalization, classification, dedup and the canonical write path.
///
/// Fetches run concurrently under a semaphore; everything from dedup
/// onward runs on a single writer sequence so two sightings of the same
/// fingerprint cannot race into two rows.
pub struct PipelineOrchestrator {
    registry: SourceRegistry,
    store: Arc<dyn EventStore>,
    settings: Settings,
    connectors: HashMap<String, Arc<dyn SourceConnector>>,
}

impl PipelineOrchestrator {
    pub fn new(registry: SourceRegistry, store: Arc<dyn EventStore>, settings: Settings) -> Self {
        let mut connectors: HashMap<String, Arc<dyn SourceConnector>> = HashMap::new();
        for config in registry.all() {
            connectors.insert(
                config.source_id.clone(),
                Arc::from(create_connector(config, settings.retry)),
            );
        }
        Self {
            registry,
            store,
            settings,
            connectors,
        }
    }

    /// Replace the connector for one source. Tests use this to feed stub
    /// listings through the real pipeline.
    pub fn set_connector(&mut self, connector: Arc<dyn SourceConnector>) {
        self.connectors
            .insert(connector.source_id().to_string(), connector);
    }

    pub async fn run(&self, options: RunOptions) -> Result<RunReport> {
        let run_t0 = Instant::now();
        let mut report = RunReport::new(options.reference_date);
        info!(
            reference_date = %options.reference_date,
            "starting ingestion run"
        );

        // Fresh dedup index from the current store state. Rebuilding per
        // run reconciles any external writes since the last run.
        let snapshot = self.store.all_events().await.map_err(PipelineError::Write)?;
        let mut index = FingerprintIndex::from_snapshot(&snapshot);
        info!(rows = snapshot.len(), "built fingerprint index from store snapshot");

        let fetches = self.fetch_all(&options, &mut report).await;

        let writer = CanonicalWriter::new(self.store.clone(), self.settings.retry.into());
        for (source_id, listings) in fetches {
            self.process_source(&source_id, listings, &options, &mut index, &writer, &mut report)
                .await;
        }

        report.complete();
        metrics::pipeline::run_duration(run_t0.elapsed().as_secs_f64());
        if report.success {
            metrics::pipeline::run_completed();
        } else {
            metrics::pipeline::run_failed();
        }

        match serde_json::to_string(&report) {
            Ok(json) => info!(report = %json, "ingestion run finished"),
            Err(e) => warn!("failed to serialize run report: {e}"),
        }

        if !report.success {
            error!("every source failed; reporting run-level failure");
            return Err(PipelineError::AllSourcesFailed);
        }
        Ok(report)
    }

    /// Fetch every selected source with bounded parallelism and a shared
    /// run deadline. Each source lands in a terminal per-branch outcome;
    /// a failed branch never cancels its siblings.
    async fn fetch_all(
        &self,
        options: &RunOptions,
        report: &mut RunReport,
    ) -> Vec<(String, Vec<RawListing>)> {
        let source_ids = match &options.sources {
            Some(ids) => ids.clone(),
            None => self.registry.enabled_sources(),
        };

        let deadline = tokio::time::Instant::now()
            + std::time::Duration::from_secs(self.settings.pipeline.run_deadline_secs);
        let semaphore = Arc::new(Semaphore::new(self.settings.pipeline.max_concurrency.max(1)));
        let mut join_set: JoinSet<(String, Result<Vec<RawListing>, SourceError>, u64)> =
            JoinSet::new();

        for source_id in source_ids {
            if let Some(outcome) = self.branch_precheck(&source_id, options) {
                if let SourceOutcome::Skipped { reason } = &outcome {
                    info!(source_id = %source_id, reason = %reason, "source skipped");
                    metrics::sources::fetch_skipped(&source_id);
                }
                report.sources.insert(source_id, outcome);
                continue;
            }

            let connector = self.connectors[&source_id].clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let t0 = Instant::now();
                let result = match tokio::time::timeout_at(deadline, connector.fetch()).await {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::DeadlineExceeded),
                };
                (source_id, result, t0.elapsed().as_millis() as u64)
            });
        }

        let mut fetches = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (source_id, result, duration_ms) = match joined {
                Ok(branch) => branch,
                Err(e) => {
                    warn!("fetch task aborted: {e}");
                    continue;
                }
            };
            match result {
                Ok(listings) => {
                    info!(source_id = %source_id, fetched = listings.len(), duration_ms, "source fetch succeeded");
                    metrics::sources::fetch_success(&source_id);
                    report.fetched += listings.len();
                    report.sources.insert(
                        source_id.clone(),
                        SourceOutcome::Succeeded {
                            fetched: listings.len(),
                            duration_ms,
                        },
                    );
                    self.mark_fetched(&source_id);
                    fetches.push((source_id, listings));
                }
                Err(e) => {
                    warn!(source_id = %source_id, error = %e, "source fetch failed");
                    metrics::sources::fetch_failed(&source_id);
                    report.sources.insert(
                        source_id,
                        SourceOutcome::Failed {
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }

        // Deterministic processing order regardless of completion order.
        fetches.sort_by(|a, b| a.0.cmp(&b.0));
        fetches
    }

    /// Registry and cadence checks that resolve a branch before any
    /// network call. `None` means the branch should fetch.
    fn branch_precheck(&self, source_id: &str, options: &RunOptions) -> Option<SourceOutcome> {
        let Some(config) = self.registry.get(source_id) else {
            return Some(SourceOutcome::Failed {
                reason: SourceError::UnknownSource(source_id.to_string()).to_string(),
            });
        };
        if !config.enabled {
            return Some(SourceOutcome::Skipped {
                reason: "disabled in registry".to_string(),
            });
        }
        if !self.connectors.contains_key(source_id) {
            return Some(SourceOutcome::Failed {
                reason: "no connector registered".to_string(),
            });
        }

        if !options.bypass_cadence {
            let now = chrono::Utc::now().timestamp();
            let min_interval = self.settings.pipeline.min_fetch_interval_secs;
            match IngestMeta::open_at_root(&self.settings.pipeline.data_dir)
                .and_then(|meta| meta.within_cadence(source_id, now, min_interval))
            {
                Ok(true) => {
                    return Some(SourceOutcome::Skipped {
                        reason: format!("fetched within the last {min_interval}s"),
                    })
                }
                Ok(false) => {}
                Err(e) => warn!(source_id = %source_id, "cadence check failed: {e}"),
            }
        }
        None
    }

    fn mark_fetched(&self, source_id: &str) {
        let now = chrono::Utc::now().timestamp();
        if let Err(e) = IngestMeta::open_at_root(&self.settings.pipeline.data_dir)
            .and_then(|meta| meta.set_last_fetched_at(source_id, now))
        {
            warn!(source_id = %source_id, "failed to record fetch marker: {e}");
        }
    }

    /// Run one source's listings through normalize → classify → dedup →
    /// write. Per-record failures are counted, never fatal; the dedup
    /// index is updated as rows land so later records in the same run see
    /// them.
    async fn process_source(
        &self,
        source_id: &str,
        listings: Vec<RawListing>,
        options: &RunOptions,
        index: &mut FingerprintIndex,
        writer: &CanonicalWriter,
        report: &mut RunReport,
    ) {
        let Some(config) = self.registry.get(source_id) else {
            // Prechecked before fetch; only a stub-injected unknown source
            // can land here.
            warn!(source_id = %source_id, "no registry document for fetched source, dropping batch");
            return;
        };

        for listing in listings {
            let normalized = match normalize(&listing, options.reference_date) {
                Ok(event) => {
                    metrics::normalize::record_normalized(source_id);
                    report.normalized += 1;
                    event
                }
                Err(e) => {
                    metrics::normalize::record_dropped(&e.to_string());
                    report.normalization_dropped += 1;
                    warn!(source_id = %source_id, title = %listing.title, "dropping listing: {e}");
                    continue;
                }
            };

            let classified = classify(normalized, config);
            if classified.category == Category::Other {
                report.classified_other += 1;
            }

            let decision = index.resolve(&classified);
            match &decision {
                DedupDecision::New => metrics::dedup::resolved_new(),
                DedupDecision::Update(_) => metrics::dedup::resolved_update(),
                DedupDecision::Duplicate(_) => metrics::dedup::resolved_duplicate(),
            }

            match writer.upsert(&classified, &decision).await {
                Ok((outcome, row)) => {
                    match outcome {
                        UpsertOutcome::Inserted => report.inserted += 1,
                        UpsertOutcome::Updated => report.updated += 1,
                        UpsertOutcome::Skipped => report.skipped += 1,
                    }
                    if let Some(row) = row {
                        index.insert(&row);
                    }
                }
                Err(e) => {
                    metrics::writer::failed();
                    report.write_failed += 1;
                    warn!(source_id = %source_id, title = %classified.event.title, "upsert failed: {e}");
                }
            }
        }
    }
}
