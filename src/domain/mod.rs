/// Domain module containing the core data types of the completion index
///
/// This module defines the record and key types (CompletionRecord, DateKey,
/// DailySummary) that the index engine derives its mappings from.

pub mod date_key;
pub mod record;
pub mod summary;

// Re-export public types for easy access
pub use date_key::*;
pub use record::*;
pub use summary::*;

use thiserror::Error;

/// Errors that can occur during domain operations
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid count: {0}")]
    InvalidCount(String),
}
