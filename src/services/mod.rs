//! Service layer for the watcher.
//!
//! This module contains the external collaborators:
//! - Page fetching and extraction (`HttpFetcher`)
//! - Archive capture (`WaybackClient`)

mod archiver;
mod fetcher;

pub use archiver::{ArchiveService, WaybackClient};
pub use fetcher::{ContentFetcher, HttpFetcher, extract_text};
