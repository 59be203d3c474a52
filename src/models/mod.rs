// src/models/mod.rs

//! Domain models for the watcher.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod archive;
mod config;
mod observation;
mod target;

// Re-export all public types
pub use archive::{ArchiveRecord, ArchiveRequest};
pub use config::{ArchiveConfig, Config, CrawlerConfig, ScheduleConfig, StorageConfig};
pub use observation::{NewObservation, Observation};
pub use target::{DetectionMode, ElementFilter, Target};

/// Raw result of fetching one target, before fingerprinting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedContent {
    /// Literal `Last-Modified` header value
    LastModified(String),
    /// Text extracted by the target's selector
    Text(String),
}
