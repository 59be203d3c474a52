// src/lib.rs

//! webwatch library
//!
//! Watches web pages for changes and hands changed pages to a rate-limited
//! archive queue.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
