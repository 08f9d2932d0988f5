//! Job Alert Harvester - Mailbox Scraping and Period Datasets
//!
//! A Rust library that polls a mailbox for job-alert emails, extracts one
//! structured record per advertised job and keeps a monthly CSV dataset of
//! them, plus a deduplicated copy for downstream analysis.
//!
//! # Features
//!
//! - Segment alert HTML into job blocks and extract title, company, rating,
//!   location, type, description and posting age
//! - Append-only monthly datasets with first-occurrence deduplication
//! - Gmail client with retry on transient failures
//! - Per-message labeling so every alert is processed exactly once
//! - Quarantine of failing emails with operator notification

/// Archive folders for processed, failed and flagged emails
pub mod archive;
/// Configuration management
pub mod config;
/// Error types
pub mod error;
/// Row matching and field extraction
pub mod extractor;
/// Gmail REST client
pub mod gmail;
/// Single-instance guard
pub mod lock;
/// Logging setup and utilities
pub mod logging;
/// Mailbox abstraction and labels
pub mod mailbox;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Polling loop and per-message transaction
pub mod pipeline;
/// Backoff for mailbox calls
pub mod retry;
/// Job block detection
pub mod segmenter;
/// Period dataset storage
pub mod store;
/// Row tokenization of job blocks
pub mod tokenizer;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use error::{HarvestError, MailboxError, Result};
pub use extractor::{extract_jobs_from_html, Extraction};
pub use mailbox::Mailbox;
pub use models::{JobRecord, PeriodKey, RawMessage};
pub use pipeline::{Harvester, HarvesterSettings, MessageOutcome, TickSummary};
pub use store::{CsvPeriodLog, PeriodLog};
