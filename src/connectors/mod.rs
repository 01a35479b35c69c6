use crate::common::error::SourceError;
use crate::config::RetrySettings;
use crate::domain::RawListing;
use crate::registry::{ConnectorSpec, SourceConfig};

pub mod actor;
pub mod fetch;
pub mod html;
pub mod stub;

pub use actor::ActorConnector;
pub use html::HtmlConnector;
pub use stub::StubConnector;

/// One external source of raw listings. Implementations isolate all
/// source-specific transport and parsing; everything past this trait
/// works with `RawListing` only.
#[async_trait::async_trait]
pub trait SourceConnector: Send + Sync {
    fn source_id(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<RawListing>, SourceError>;
}

/// Build the connector for a registry document based on its declared kind.
pub fn create_connector(config: &SourceConfig, retry: RetrySettings) -> Box<dyn SourceConnector> {
    match &config.connector {
        ConnectorSpec::Html { .. } => Box::new(HtmlConnector::new(config.clone(), retry)),
        ConnectorSpec::Actor { .. } => Box::new(ActorConnector::new(config.clone(), retry)),
    }
}
