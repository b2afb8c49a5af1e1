//! Demonstration workloads for the pool
//!
//! - [`fib`]: CPU-bound reduction, a sum of recursive Fibonacci numbers
//! - [`sleep`]: wait-bound fan-out, one sleeper per rank

pub mod fib;
pub mod sleep;

pub use fib::{FibTask, MAX_FIB_INPUT};
pub use sleep::{SleepError, SleepTask};
