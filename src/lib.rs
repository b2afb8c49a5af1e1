//! workpool
//!
//! A fixed-size worker pool that runs a batch of independent tasks on at most
//! `parallelism` concurrent workers and folds their outcomes into a
//! deterministic aggregate: a checked numeric sum, or one completion record
//! per task.
//!
//! # Example
//!
//! ```
//! use workpool::pool::{task_fn, PoolConfig, SchedulingPolicy, TaskPool};
//!
//! let pool = TaskPool::new(PoolConfig::new(4).with_policy(SchedulingPolicy::Dynamic)).unwrap();
//! let sum = pool.reduce(&[1, 2, 3, 4, 5], &task_fn(|_, n| Ok(n * 10))).unwrap();
//! assert_eq!(sum, 150);
//! ```
//!
//! # Modules
//!
//! - [`pool`]: the executor, scheduling policies and aggregates
//! - [`workloads`]: the Fibonacci reduction and the sleeper fan-out
//! - [`monitor`]: CSV sampling of a process tree
//! - [`util`]: logging and layered configuration

#![doc(html_root_url = "https://docs.rs/workpool")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod monitor;
pub mod pool;
pub mod workloads;

// Utility modules
pub mod util;

// Re-exports
pub use pool::{
    run, Aggregate, Backend, CompletionReport, PoolConfig, PoolError, PoolResult,
    SchedulingPolicy, Task, TaskError, TaskPool,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Program name
pub const NAME: &str = "workpool";
