/// Execution context for CPU-heavy chunk aggregation
///
/// Backfill aggregation crosses this boundary as a batch of minimal chunk
/// rows and comes back as fresh index collections. From the caller's side
/// it is one non-cancellable suspend point: no partial state is observable
/// while the aggregation runs, and the merge into the live indexes happens
/// only after the result returns.

use async_trait::async_trait;
use thiserror::Error;

use crate::index::{aggregate_chunk, ChunkRow, IndexCollections};

/// Errors that can occur when dispatching aggregation work
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Background aggregation task failed: {0}")]
    TaskFailed(String),
}

/// Where chunk aggregation runs
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    /// Aggregate the rows, possibly off the caller's thread
    async fn run_off_thread(&self, rows: Vec<ChunkRow>) -> Result<IndexCollections, ExecError>;
}

/// Dispatches aggregation to the tokio blocking pool
pub struct TokioExecutionContext;

#[async_trait]
impl ExecutionContext for TokioExecutionContext {
    async fn run_off_thread(&self, rows: Vec<ChunkRow>) -> Result<IndexCollections, ExecError> {
        tokio::task::spawn_blocking(move || aggregate_chunk(&rows))
            .await
            .map_err(|e| ExecError::TaskFailed(e.to_string()))
    }
}

/// Runs aggregation inline on the caller's thread
///
/// For tests and single-threaded hosts where dispatching to a pool buys
/// nothing.
pub struct InlineExecutionContext;

#[async_trait]
impl ExecutionContext for InlineExecutionContext {
    async fn run_off_thread(&self, rows: Vec<ChunkRow>) -> Result<IndexCollections, ExecError> {
        Ok(aggregate_chunk(&rows))
    }
}
