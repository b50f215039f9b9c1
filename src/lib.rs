/// Public library interface for the completion index engine
///
/// This module exports the engine, the storage traits it is generic over,
/// and the domain types that appear in its method signatures, so hosts
/// and tests can construct and drive an engine directly.

use thiserror::Error;

// Internal modules
mod clock;
mod domain;
mod engine;
mod exec;
mod index;
mod storage;

// Re-export public modules and types
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::*;
pub use engine::{CompletionIndexEngine, OptimizationStatus, DEFAULT_CHUNK_DAYS};
pub use exec::{ExecError, ExecutionContext, InlineExecutionContext, TokioExecutionContext};
pub use index::{
    CompletionsByHabit, IndexCollections, IndexMetadata, RebuildReason, CACHE_CAPACITY,
    DEFAULT_BOOTSTRAP_WINDOW_DAYS, INDEX_VERSION,
};
pub use storage::{IndexStore, MemoryStore, PrimaryStore, SqliteStore, StorageError};

/// Errors that can surface from engine operations
///
/// Index maintenance failures never appear here; only primary-store
/// failures and invalid inputs do.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Domain validation error: {0}")]
    Domain(#[from] domain::DomainError),

    #[error("Execution error: {0}")]
    Exec(#[from] exec::ExecError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
