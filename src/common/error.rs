use thiserror::Error;

/// Failure at a single external source. A source branch that exhausts its
/// retries is marked failed in the run report without aborting siblings.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("empty payload from {url}")]
    EmptyPayload { url: String },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("actor run failed: {0}")]
    ActorRun(String),

    #[error("actor run did not finish within {attempts} polls")]
    ActorTimeout { attempts: u32 },

    #[error("source {0} is disabled in the registry")]
    Disabled(String),

    #[error("source not found in registry: {0}")]
    UnknownSource(String),

    #[error("fetch skipped: {0}")]
    CadenceSkip(String),

    #[error("run deadline expired while fetch was in flight")]
    DeadlineExceeded,
}

/// A single record that cannot be resolved to a valid title and date.
/// The record is dropped and counted, never the whole batch.
#[derive(Error, Debug)]
pub enum NormalizationError {
    #[error("listing has no usable title")]
    MissingTitle,

    #[error("unresolvable date string: '{0}'")]
    UnresolvableDate(String),

    #[error("listing has no usable location")]
    MissingLocation,
}

/// Store-level failure on a single upsert.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("store connectivity lost: {0}")]
    Connectivity(String),

    #[error("constraint violation: {0}")]
    Conflict(String),

    #[error("no canonical row with id {0}")]
    MissingRow(uuid::Uuid),
}

/// Top-level pipeline error. Per-source and per-record failures are
/// absorbed into the run report; only run-level conditions surface here.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("every source failed this run")]
    AllSourcesFailed,

    #[error("registry error: {0}")]
    Registry(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
