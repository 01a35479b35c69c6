use std::sync::Mutex;

use super::SourceConnector;
use crate::common::error::SourceError;
use crate::domain::RawListing;

/// Connector that replays a fixed set of listings, or fails every fetch
/// with a fixed reason. Used by the integration tests to drive the real
/// pipeline deterministically.
pub struct StubConnector {
    source_id: String,
    listings: Vec<RawListing>,
    fail_reason: Option<String>,
    fetch_count: Mutex<usize>,
}

impl StubConnector {
    pub fn new(source_id: impl Into<String>, listings: Vec<RawListing>) -> Self {
        Self {
            source_id: source_id.into(),
            listings,
            fail_reason: None,
            fetch_count: Mutex::new(0),
        }
    }

    pub fn failing(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            listings: Vec::new(),
            fail_reason: Some(reason.into()),
            fetch_count: Mutex::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetch_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl SourceConnector for StubConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch(&self) -> Result<Vec<RawListing>, SourceError> {
        *self.fetch_count.lock().unwrap() += 1;
        match &self.fail_reason {
            Some(reason) => Err(SourceError::MalformedPayload(reason.clone())),
            None => Ok(self.listings.clone()),
        }
    }
}
