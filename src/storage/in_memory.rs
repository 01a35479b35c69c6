use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use super::EventStore;
use crate::common::error::WriteError;
use crate::domain::CanonicalEvent;

/// In-memory canonical store for development and tests. Clones share the
/// same underlying map, so a test can hold a handle while the pipeline
/// owns another.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<Mutex<HashMap<Uuid, CanonicalEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn all_events(&self) -> Result<Vec<CanonicalEvent>, WriteError> {
        let events = self.events.lock().unwrap();
        Ok(events.values().cloned().collect())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<CanonicalEvent>, WriteError> {
        let events = self.events.lock().unwrap();
        Ok(events.get(&id).cloned())
    }

    async fn insert_event(&self, event: &CanonicalEvent) -> Result<(), WriteError> {
        let mut events = self.events.lock().unwrap();
        if events.contains_key(&event.id) {
            return Err(WriteError::Conflict(format!(
                "event {} already exists",
                event.id
            )));
        }
        events.insert(event.id, event.clone());
        debug!("inserted event '{}' with id {}", event.title, event.id);
        Ok(())
    }

    async fn update_event(&self, event: &CanonicalEvent) -> Result<(), WriteError> {
        let mut events = self.events.lock().unwrap();
        if !events.contains_key(&event.id) {
            return Err(WriteError::MissingRow(event.id));
        }
        events.insert(event.id, event.clone());
        debug!("updated event '{}' with id {}", event.title, event.id);
        Ok(())
    }

    async fn count(&self) -> Result<usize, WriteError> {
        Ok(self.events.lock().unwrap().len())
    }
}
