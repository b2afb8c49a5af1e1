//! Error types for the task pool.

use thiserror::Error;

/// Why a single task could not produce an output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The task input lies outside the range the task can handle.
    #[error("input {input} out of range (max {max})")]
    InputOutOfRange { input: u64, max: u64 },

    /// Intermediate arithmetic overflowed.
    #[error("arithmetic overflow for input {input}")]
    Overflow { input: u64 },

    /// The task panicked while running.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// Any other task-specific failure.
    #[error("{0}")]
    Other(String),
}

impl TaskError {
    /// Build an [`TaskError::Other`] from anything printable.
    pub fn other(message: impl Into<String>) -> Self {
        TaskError::Other(message.into())
    }
}

/// Errors surfaced by [`TaskPool::run`](super::TaskPool::run).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Malformed pool parameters. Nothing was executed.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// A worker could not be created. The run was aborted.
    #[error("failed to create worker: {0}")]
    AllocationFailure(String),

    /// The task at `index` failed and the aggregate cannot tolerate it.
    #[error("task {index} failed: {source}")]
    TaskFailure {
        index: usize,
        #[source]
        source: TaskError,
    },

    /// The reduced sum does not fit the accumulator type.
    #[error("aggregate sum overflowed")]
    SumOverflow,
}

/// Result alias used throughout the pool.
pub type PoolResult<T> = Result<T, PoolError>;
