use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::EventStore;
use crate::common::error::WriteError;
use crate::domain::CanonicalEvent;

/// File-backed canonical store: the full event map serialized as one JSON
/// document under the data directory. Writes flush through on every
/// upsert so runs are durable and external tools can read or correct the
/// file between runs; the per-run index rebuild picks those edits up.
pub struct JsonFileEventStore {
    path: PathBuf,
    events: Mutex<HashMap<Uuid, CanonicalEvent>>,
}

impl JsonFileEventStore {
    pub fn open_at_root<P: AsRef<Path>>(data_root: P) -> Result<Self, WriteError> {
        let root = data_root.as_ref();
        fs::create_dir_all(root)
            .map_err(|e| WriteError::Connectivity(format!("create {}: {e}", root.display())))?;
        let path = root.join("events.json");

        let events = match fs::read_to_string(&path) {
            Ok(content) => {
                let rows: Vec<CanonicalEvent> = serde_json::from_str(&content)
                    .map_err(|e| WriteError::Connectivity(format!("parse {}: {e}", path.display())))?;
                rows.into_iter().map(|e| (e.id, e)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(WriteError::Connectivity(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };

        debug!("opened canonical store with {} rows at {}", events.len(), path.display());
        Ok(Self {
            path,
            events: Mutex::new(events),
        })
    }

    fn flush(&self, events: &HashMap<Uuid, CanonicalEvent>) -> Result<(), WriteError> {
        let mut rows: Vec<&CanonicalEvent> = events.values().collect();
        rows.sort_by_key(|e| e.id);
        let json = serde_json::to_string_pretty(&rows)
            .map_err(|e| WriteError::Connectivity(format!("serialize store: {e}")))?;
        fs::write(&self.path, json)
            .map_err(|e| WriteError::Connectivity(format!("write {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl EventStore for JsonFileEventStore {
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
        self.flush(&events)
    }

    async fn update_event(&self, event: &CanonicalEvent) -> Result<(), WriteError> {
        let mut events = self.events.lock().unwrap();
        if !events.contains_key(&event.id) {
            return Err(WriteError::MissingRow(event.id));
        }
        events.insert(event.id, event.clone());
        self.flush(&events)
    }

    async fn count(&self) -> Result<usize, WriteError> {
        Ok(self.events.lock().unwrap().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;
    use chrono::{NaiveDate, Utc};
    use tempfile::tempdir;

    fn row(title: &str) -> CanonicalEvent {
        let now = Utc::now();
        CanonicalEvent {
            id: Uuid::new_v4(),
            fingerprint: format!("fp-{title}"),
            title: title.to_string(),
            city: "Rome".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            time: None,
            url: None,
            description: None,
            country_code: "IT".to_string(),
            category: Category::March,
            event_type: "march".to_string(),
            sources: vec!["test-source".to_string()],
            first_seen_at: now,
            last_updated_at: now,
        }
    }

    #[tokio::test]
    async fn rows_survive_reopen() {
        let dir = tempdir().unwrap();
        let event = row("Climate March");

        {
            let store = JsonFileEventStore::open_at_root(dir.path()).unwrap();
            store.insert_event(&event).await.unwrap();
        }

        let reopened = JsonFileEventStore::open_at_root(dir.path()).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        let loaded = reopened.get_event(event.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Climate March");
        assert_eq!(loaded.fingerprint, event.fingerprint);
    }

    #[tokio::test]
    async fn double_insert_is_a_conflict() {
        let dir = tempdir().unwrap();
        let store = JsonFileEventStore::open_at_root(dir.path()).unwrap();
        let event = row("Climate March");

        store.insert_event(&event).await.unwrap();
        assert!(matches!(
            store.insert_event(&event).await,
            Err(WriteError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn update_of_missing_row_fails() {
        let dir = tempdir().unwrap();
        let store = JsonFileEventStore::open_at_root(dir.path()).unwrap();
        assert!(matches!(
            store.update_event(&row("Ghost")).await,
            Err(WriteError::MissingRow(_))
        ));
    }
}
