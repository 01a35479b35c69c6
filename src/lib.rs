pub mod common;
pub mod config;
pub mod connectors;
pub mod domain;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod storage;
