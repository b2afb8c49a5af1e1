//! Parallel Fibonacci reduction.
//!
//! Sums `fib(n)` over randomly drawn depths. `fib(0) = fib(1) = 1`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::pool::{PoolError, PoolResult, Task, TaskContext, TaskError, TaskPool};

/// Largest depth whose result fits in a `u64`.
pub const MAX_FIB_INPUT: u64 = 92;

/// Recursive Fibonacci, `None` on overflow.
pub fn fib(n: u64) -> Option<u64> {
    if n <= 1 {
        return Some(1);
    }
    fib(n - 1)?.checked_add(fib(n - 2)?)
}

/// Task computing `fib(input)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FibTask;

impl Task for FibTask {
    type Output = u64;

    fn run(
        &self,
        _ctx: TaskContext,
        input: u64,
    ) -> Result<u64, TaskError> {
        if input > MAX_FIB_INPUT {
            return Err(TaskError::InputOutOfRange {
                input,
                max: MAX_FIB_INPUT,
            });
        }
        fib(input).ok_or(TaskError::Overflow { input })
    }
}

/// Draw `count` depths uniformly from `0..max` with a seeded generator.
pub fn random_inputs(
    count: usize,
    max: u64,
    seed: u64,
) -> PoolResult<Vec<u64>> {
    if max == 0 {
        return Err(PoolError::InvalidConfig(
            "max must be at least 1".to_string(),
        ));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    Ok((0..count).map(|_| rng.random_range(0..max)).collect())
}

/// Sum `fib` over `count` random depths below `max`.
pub fn run(
    pool: &TaskPool,
    count: usize,
    max: u64,
    seed: u64,
) -> PoolResult<u64> {
    let inputs = random_inputs(count, max, seed)?;
    debug!(count, max, seed, "fib inputs drawn");
    pool.reduce(&inputs, &FibTask)
}
