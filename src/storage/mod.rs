use async_trait::async_trait;
use uuid::Uuid;

use crate::common::error::WriteError;
use crate::domain::CanonicalEvent;

pub mod in_memory;
pub mod json_file;

pub use in_memory::InMemoryEventStore;
pub use json_file::JsonFileEventStore;

/// The canonical event store. The Canonical Writer is its only writing
/// client; everything else reads. The pipeline holds no lock across
/// operations, so each call is individually atomic and external writers
/// may interleave between runs.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Snapshot of every row, used to build the per-run dedup index.
    async fn all_events(&self) -> Result<Vec<CanonicalEvent>, WriteError>;

    async fn get_event(&self, id: Uuid) -> Result<Option<CanonicalEvent>, WriteError>;

    async fn insert_event(&self, event: &CanonicalEvent) -> Result<(), WriteError>;

    async fn update_event(&self, event: &CanonicalEvent) -> Result<(), WriteError>;

    async fn count(&self) -> Result<usize, WriteError>;
}
