use std::fs;
use tempfile::tempdir;

use civic_scraper::registry::{ConnectorSpec, SourceRegistry};

const HTML_SOURCE: &str = r#"{
  "source_id": "rome-assemblies",
  "enabled": true,
  "default_country": "IT",
  "connector": {
    "kind": "html",
    "endpoint": "https://example.org/events",
    "selectors": {
      "listing": ".event",
      "title": ".title",
      "date": ".date",
      "time": null,
      "location": ".place",
      "description": null,
      "link": null
    }
  }
}"#;

const ACTOR_SOURCE: &str = r#"{
  "source_id": "mobilize-actor",
  "enabled": false,
  "default_country": "FR",
  "headers": { "X-Client": "civic-scraper" },
  "connector": {
    "kind": "actor",
    "base_url": "https://api.example.com",
    "actor_id": "acme~harvester",
    "token_env": "ACTOR_TOKEN"
  }
}"#;

#[test]
fn loads_documents_and_filters_enabled() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("rome.json"), HTML_SOURCE).unwrap();
    fs::write(dir.path().join("mobilize.json"), ACTOR_SOURCE).unwrap();
    fs::write(dir.path().join("notes.txt"), "not a source").unwrap();

    let registry = SourceRegistry::load_from_directory(dir.path()).unwrap();
    assert_eq!(registry.len(), 2);
    assert!(registry.is_enabled("rome-assemblies"));
    assert!(!registry.is_enabled("mobilize-actor"));
    assert_eq!(registry.enabled_sources(), vec!["rome-assemblies"]);
}

#[test]
fn defaults_fill_in_for_omitted_fields() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("mobilize.json"), ACTOR_SOURCE).unwrap();

    let registry = SourceRegistry::load_from_directory(dir.path()).unwrap();
    let config = registry.get("mobilize-actor").unwrap();
    assert_eq!(config.timeout_secs, 30);
    assert_eq!(config.headers.get("X-Client").unwrap(), "civic-scraper");

    match &config.connector {
        ConnectorSpec::Actor {
            poll_interval_secs,
            max_polls,
            ..
        } => {
            assert_eq!(*poll_interval_secs, 5);
            assert_eq!(*max_polls, 24);
        }
        other => panic!("expected actor connector, got {other:?}"),
    }
}

#[test]
fn malformed_documents_are_rejected() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

    assert!(SourceRegistry::load_from_directory(dir.path()).is_err());
}

#[test]
fn missing_directory_is_an_error() {
    assert!(SourceRegistry::load_from_directory("/nonexistent/registry").is_err());
}
