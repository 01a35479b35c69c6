use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::fetch::{self, RetryPolicy};
use super::SourceConnector;
use crate::common::error::SourceError;
use crate::config::RetrySettings;
use crate::domain::RawListing;
use crate::registry::{ConnectorSpec, SourceConfig};

/// Actor-backed connector: delegates the scrape to a managed third-party
/// scraping actor. Starts a run, polls its status until it finishes, then
/// downloads the dataset items the run produced.
pub struct ActorConnector {
    config: SourceConfig,
    client: reqwest::Client,
    policy: RetryPolicy,
}

#[derive(Debug)]
struct ActorSpec<'a> {
    base_url: &'a str,
    actor_id: &'a str,
    token_env: &'a str,
    poll_interval: Duration,
    max_polls: u32,
}

impl ActorConnector {
    pub fn new(config: SourceConfig, retry: RetrySettings) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            policy: retry.into(),
        }
    }

    fn spec(&self) -> Result<ActorSpec<'_>, SourceError> {
        match &self.config.connector {
            ConnectorSpec::Actor {
                base_url,
                actor_id,
                token_env,
                poll_interval_secs,
                max_polls,
            } => Ok(ActorSpec {
                base_url,
                actor_id,
                token_env,
                poll_interval: Duration::from_secs(*poll_interval_secs),
                max_polls: *max_polls,
            }),
            _ => Err(SourceError::MalformedPayload(
                "actor connector built from non-actor registry document".to_string(),
            )),
        }
    }

    async fn start_run(&self, spec: &ActorSpec<'_>, token: &str) -> Result<(String, String), SourceError> {
        let url = format!(
            "{}/v2/acts/{}/runs?token={}",
            spec.base_url.trim_end_matches('/'),
            spec.actor_id,
            token
        );

        let mut attempt: u32 = 0;
        let resp = loop {
            let result = self
                .client
                .post(&url)
                .timeout(Duration::from_secs(self.config.timeout_secs))
                .send()
                .await;
            match result {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if (200..=299).contains(&status) {
                        break resp;
                    }
                    if fetch::is_transient_status(status) && attempt + 1 < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(SourceError::ActorRun(format!(
                        "run start returned status {status}"
                    )));
                }
                Err(e) if attempt + 1 < self.policy.max_attempts => {
                    tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
                    attempt += 1;
                    debug!(error = %e, attempt, "actor run start failed, retrying");
                }
                Err(e) => return Err(SourceError::Http(e)),
            }
        };

        let body: Value = resp
            .json()
            .await
            .map_err(|e| SourceError::MalformedPayload(format!("run start response: {e}")))?;

        let run_id = body["data"]["id"]
            .as_str()
            .ok_or_else(|| SourceError::MalformedPayload("run response missing data.id".into()))?
            .to_string();
        let dataset_id = body["data"]["defaultDatasetId"]
            .as_str()
            .ok_or_else(|| {
                SourceError::MalformedPayload("run response missing data.defaultDatasetId".into())
            })?
            .to_string();
        Ok((run_id, dataset_id))
    }

    /// Poll the run until it reports a terminal status. Bounded: a run
    /// still pending after `max_polls` attempts is an `ActorTimeout`.
    async fn await_run(&self, spec: &ActorSpec<'_>, token: &str, run_id: &str) -> Result<(), SourceError> {
        let url = format!(
            "{}/v2/actor-runs/{}?token={}",
            spec.base_url.trim_end_matches('/'),
            run_id,
            token
        );
        for attempt in 0..spec.max_polls {
            tokio::time::sleep(spec.poll_interval).await;

            // A flaky status request burns a poll attempt instead of
            // failing the branch; the poll budget bounds the total wait.
            let body: Value = match self
                .client
                .get(&url)
                .timeout(Duration::from_secs(self.config.timeout_secs))
                .send()
                .await
            {
                Ok(resp) => match resp.json().await {
                    Ok(body) => body,
                    Err(e) => {
                        debug!(run_id, attempt, "unreadable run status response: {e}");
                        continue;
                    }
                },
                Err(e) => {
                    debug!(run_id, attempt, "run status request failed: {e}");
                    continue;
                }
            };
            let status = body["data"]["status"].as_str().unwrap_or("UNKNOWN");
            debug!(run_id, status, attempt, "actor run status");

            match status {
                "SUCCEEDED" => return Ok(()),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(SourceError::ActorRun(format!(
                        "run {run_id} finished with status {status}"
                    )))
                }
                _ => continue,
            }
        }
        Err(SourceError::ActorTimeout {
            attempts: spec.max_polls,
        })
    }

    async fn fetch_items(&self, spec: &ActorSpec<'_>, token: &str, dataset_id: &str) -> Result<Vec<Value>, SourceError> {
        let url = format!(
            "{}/v2/datasets/{}/items?token={}&format=json",
            spec.base_url.trim_end_matches('/'),
            dataset_id,
            token
        );
        let headers = fetch::request_headers(&self.config.headers);
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let payload = fetch::fetch_bytes(&self.client, &url, &headers, timeout, &self.policy).await?;
        let items: Vec<Value> = serde_json::from_slice(&payload)
            .map_err(|e| SourceError::MalformedPayload(format!("dataset items: {e}")))?;
        Ok(items)
    }

    fn listing_from_item(&self, item: &Value) -> Option<RawListing> {
        let title = string_field(item, &["title", "name", "eventName"])?;
        let raw_date = string_field(item, &["date", "startDate", "when"]).unwrap_or_default();
        Some(RawListing {
            source_id: self.config.source_id.clone(),
            external_id: string_field(item, &["id", "eventId"]),
            title,
            raw_date,
            raw_time: string_field(item, &["time", "startTime"]),
            raw_location: string_field(item, &["location", "city", "place"]).unwrap_or_default(),
            description: string_field(item, &["description", "details"]),
            url: string_field(item, &["url", "link"]),
        })
    }
}

/// First present-and-non-empty string among the given keys. Actor datasets
/// are not schema-stable across actors, so field names vary.
fn string_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        item.get(*k)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

#[async_trait::async_trait]
impl SourceConnector for ActorConnector {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    #[instrument(skip(self), fields(source_id = %self.config.source_id))]
    async fn fetch(&self) -> Result<Vec<RawListing>, SourceError> {
        let spec = self.spec()?;
        let token = std::env::var(spec.token_env).map_err(|_| {
            SourceError::ActorRun(format!("token env var {} is not set", spec.token_env))
        })?;

        let (run_id, dataset_id) = self.start_run(&spec, &token).await?;
        debug!(run_id, dataset_id, "actor run started");
        self.await_run(&spec, &token, &run_id).await?;

        let items = self.fetch_items(&spec, &token, &dataset_id).await?;
        let listings: Vec<RawListing> = items
            .iter()
            .filter_map(|item| self.listing_from_item(item))
            .collect();

        if listings.is_empty() {
            return Err(SourceError::EmptyPayload {
                url: format!("dataset {dataset_id}"),
            });
        }
        info!(
            "fetched {} listings from actor run {}",
            listings.len(),
            run_id
        );
        Ok(listings)
    }
}
