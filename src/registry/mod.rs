use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::common::error::{PipelineError, Result};

/// CSS selectors a direct-HTTP source uses to lift listings out of its
/// page. Only `listing` and `title` are mandatory; everything else
/// degrades to an absent field that normalization deals with.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HtmlSelectors {
    pub listing: String,
    pub title: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
}

/// How a source is fetched. Direct-HTTP sources are scraped in-process;
/// actor-backed sources delegate scraping to a managed third-party run
/// that is started and polled over its API.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectorSpec {
    Html {
        endpoint: String,
        selectors: HtmlSelectors,
    },
    Actor {
        base_url: String,
        actor_id: String,
        /// Environment variable holding the actor API token.
        token_env: String,
        #[serde(default = "default_poll_interval_secs")]
        poll_interval_secs: u64,
        #[serde(default = "default_max_polls")]
        max_polls: u32,
    },
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_polls() -> u32 {
    24
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    pub source_id: String,
    pub enabled: bool,
    /// ISO-3166 alpha-2. Every source is scoped to a primary country;
    /// the classifier falls back to it when city lookup misses.
    pub default_country: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub connector: ConnectorSpec,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Registry of source configurations, loaded once at orchestrator start
/// from a directory of per-source JSON documents. The pipeline never
/// mutates it.
#[derive(Clone)]
pub struct SourceRegistry {
    sources: HashMap<String, SourceConfig>,
}

impl SourceRegistry {
    pub fn load_from_directory<P: AsRef<Path>>(registry_dir: P) -> Result<Self> {
        let dir_path = registry_dir.as_ref();
        if !dir_path.exists() {
            return Err(PipelineError::Registry(format!(
                "registry directory does not exist: {}",
                dir_path.display()
            )));
        }

        let mut sources = HashMap::new();
        let entries = fs::read_dir(dir_path).map_err(|e| {
            PipelineError::Registry(format!("failed to read registry directory: {e}"))
        })?;

        for entry in entries {
            let entry = entry
                .map_err(|e| PipelineError::Registry(format!("failed to read directory entry: {e}")))?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            let content = fs::read_to_string(&path).map_err(|e| {
                PipelineError::Registry(format!("failed to read source file {}: {e}", path.display()))
            })?;
            let config: SourceConfig = serde_json::from_str(&content).map_err(|e| {
                PipelineError::Registry(format!(
                    "failed to parse source config {}: {e}",
                    path.display()
                ))
            })?;

            sources.insert(config.source_id.clone(), config);
        }

        Ok(Self { sources })
    }

    /// Build a registry directly from configs. Used by tests and demos.
    pub fn from_configs(configs: Vec<SourceConfig>) -> Self {
        let sources = configs
            .into_iter()
            .map(|c| (c.source_id.clone(), c))
            .collect();
        Self { sources }
    }

    pub fn get(&self, source_id: &str) -> Option<&SourceConfig> {
        self.sources.get(source_id)
    }

    pub fn is_enabled(&self, source_id: &str) -> bool {
        self.sources.get(source_id).is_some_and(|s| s.enabled)
    }

    /// All enabled source ids, sorted for deterministic run ordering.
    pub fn enabled_sources(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sources
            .values()
            .filter(|s| s.enabled)
            .map(|s| s.source_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn all(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.values()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
