//! Fixed-size task pool
//!
//! This module provides the [`TaskPool`], which runs a batch of independent
//! tasks on at most `parallelism` concurrent workers and folds their outcomes
//! into an [`Aggregate`].
//!
//! # Architecture
//!
//! - [`PoolConfig`](config::PoolConfig) - parallelism, scheduling policy, backend
//! - [`Plan`](partition::Plan) - static blocks or a shared claim cursor
//! - [`Task`](task::Task) - the unit of work, a function of one `u64` input
//! - [`WorkerSlot`](task::WorkerSlot) - per-worker `Idle -> Running -> Done` state
//! - [`Aggregate`](aggregate::Aggregate) - order-independent fold ([`Sum`], [`Completion`])
//! - [`PoolStats`](stats::PoolStats) - counters over all runs
//!
//! `run` returns only after every task has finished; partial aggregates are
//! never observable by the caller.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod partition;
pub mod stats;
pub mod task;

pub use aggregate::{
    Aggregate, Completion, CompletionRecord, CompletionReport, Sum, Summand, TaskStatus,
};
pub use config::{default_parallelism, Backend, PoolConfig, SchedulingPolicy};
pub use error::{PoolError, PoolResult, TaskError};
pub use partition::{static_blocks, Assignment, Cursor, Plan};
pub use stats::PoolStats;
pub use task::{task_fn, FnTask, Task, TaskContext, WorkerSlot, WorkerState};

use std::any::Any;
use std::io;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, trace, warn};

/// Worker pool bound to one [`PoolConfig`].
///
/// The pool itself holds no threads between runs: workers are created at the
/// start of [`TaskPool::run`] and joined before it returns.
#[derive(Debug)]
pub struct TaskPool {
    config: PoolConfig,
    stats: Arc<PoolStats>,
}

impl TaskPool {
    /// Create a pool, rejecting invalid configurations.
    pub fn new(config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stats: Arc::new(PoolStats::default()),
        })
    }

    /// Create a pool with the given parallelism and default policy/backend.
    #[inline]
    pub fn with_parallelism(parallelism: usize) -> PoolResult<Self> {
        Self::new(PoolConfig::new(parallelism))
    }

    /// Configuration of the pool.
    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Statistics accumulated over all runs.
    #[inline]
    pub fn stats(&self) -> &Arc<PoolStats> {
        &self.stats
    }

    /// Sum the outputs of `task` over `inputs`.
    ///
    /// Fails with [`PoolError::TaskFailure`] if any task fails.
    pub fn reduce<T>(
        &self,
        inputs: &[u64],
        task: &T,
    ) -> PoolResult<T::Output>
    where
        T: Task,
        T::Output: Summand,
    {
        self.run::<T, Sum<T::Output>>(inputs, task)
    }

    /// Run `task` over `inputs` and record the status of each task.
    ///
    /// Task failures are recorded and never abort sibling tasks.
    pub fn fan_out<T: Task>(
        &self,
        inputs: &[u64],
        task: &T,
    ) -> PoolResult<CompletionReport> {
        self.run::<T, Completion<T::Output>>(inputs, task)
    }

    /// Run `task` once per input and fold the outcomes into `A`.
    pub fn run<T, A>(
        &self,
        inputs: &[u64],
        task: &T,
    ) -> PoolResult<A::Value>
    where
        T: Task,
        A: Aggregate<Item = T::Output>,
    {
        self.config.validate()?;
        self.stats.record_run();

        debug!(
            tasks = inputs.len(),
            parallelism = self.config.parallelism,
            policy = %self.config.policy,
            backend = %self.config.backend,
            "run started"
        );

        if inputs.is_empty() {
            return A::default().finish();
        }

        let start = Instant::now();
        let aggregate = match self.config.backend {
            Backend::Threads => self.run_threads::<T, A>(inputs, task)?,
            Backend::Rayon => self.run_rayon::<T, A>(inputs, task)?,
        };
        debug_assert_eq!(aggregate.absorbed(), inputs.len());

        debug!(
            tasks = aggregate.absorbed(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "run finished"
        );
        aggregate.finish()
    }

    /// Dedicated scoped threads, one per planned worker.
    fn run_threads<T, A>(
        &self,
        inputs: &[u64],
        task: &T,
    ) -> PoolResult<A>
    where
        T: Task,
        A: Aggregate<Item = T::Output>,
    {
        let plan = Plan::new(inputs.len(), self.config.parallelism, self.config.policy);
        let slots: Vec<WorkerSlot> = (0..plan.workers()).map(WorkerSlot::new).collect();
        let shared = Mutex::new(A::default());
        let abort = AtomicBool::new(false);
        let stats: &PoolStats = &self.stats;

        let spawned = thread::scope(|scope| {
            for (spawned, slot) in slots.iter().enumerate() {
                let plan = &plan;
                let shared = &shared;
                let abort = &abort;
                let result = spawn_worker(scope, slot.id(), move || {
                    Self::worker_loop(
                        slot,
                        plan.assignment(slot.id()),
                        inputs,
                        task,
                        shared,
                        abort,
                        stats,
                    );
                });
                if let Err(error) = result {
                    abort.store(true, Ordering::SeqCst);
                    return Err((spawned, error));
                }
            }
            Ok(slots.len())
        });

        match spawned {
            Ok(count) => {
                stats.record_workers(count);
                debug_assert!(slots.iter().all(|s| s.state() == WorkerState::Done));
                Ok(shared.into_inner())
            },
            Err((count, error)) => {
                stats.record_workers(count);
                warn!(worker = count, error = %error, "failed to spawn worker, run aborted");
                Err(PoolError::AllocationFailure(error.to_string()))
            },
        }
    }

    /// Worker thread main loop.
    fn worker_loop<T, A>(
        slot: &WorkerSlot,
        assignment: Assignment<'_>,
        inputs: &[u64],
        task: &T,
        shared: &Mutex<A>,
        abort: &AtomicBool,
        stats: &PoolStats,
    ) where
        T: Task,
        A: Aggregate<Item = T::Output>,
    {
        let started = slot.start();
        debug_assert!(started, "worker {} started twice", slot.id());
        trace!(worker = slot.id(), "worker started");

        for index in assignment {
            if abort.load(Ordering::SeqCst) {
                break;
            }
            let ctx = TaskContext {
                index,
                worker: slot.id(),
            };
            let outcome = execute(task, ctx, inputs[index], stats);
            shared.lock().absorb(ctx, outcome);
            slot.record_task();
        }

        let finished = slot.finish();
        debug_assert!(finished, "worker {} finished without running", slot.id());
        trace!(worker = slot.id(), tasks = slot.tasks_run(), "worker done");
    }

    /// A rayon pool built for this run; partial aggregates are merged once.
    fn run_rayon<T, A>(
        &self,
        inputs: &[u64],
        task: &T,
    ) -> PoolResult<A>
    where
        T: Task,
        A: Aggregate<Item = T::Output>,
    {
        let len = inputs.len();
        let threads = self.config.parallelism.min(len);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("workpool-rayon-{}", i))
            .build()
            .map_err(|e| PoolError::AllocationFailure(e.to_string()))?;
        self.stats.record_workers(pool.current_num_threads());

        let stats: &PoolStats = &self.stats;
        let aggregate = pool.install(|| match self.config.policy {
            SchedulingPolicy::StaticChunked => fold_ranges::<T, A, _>(
                static_blocks(len, threads).into_par_iter(),
                inputs,
                task,
                stats,
            ),
            SchedulingPolicy::Dynamic => fold_ranges::<T, A, _>(
                (0..len).into_par_iter().map(|i| i..i + 1),
                inputs,
                task,
                stats,
            ),
        });
        Ok(aggregate)
    }
}

/// Start worker `id` on a named scoped thread.
fn spawn_worker<'scope, 'env, F>(
    scope: &'scope thread::Scope<'scope, 'env>,
    id: usize,
    f: F,
) -> io::Result<thread::ScopedJoinHandle<'scope, ()>>
where
    F: FnOnce() + Send + 'scope,
{
    #[cfg(test)]
    if spawn_fault::fails(id) {
        return Err(io::Error::new(
            io::ErrorKind::OutOfMemory,
            format!("cannot create worker {}", id),
        ));
    }
    thread::Builder::new()
        .name(format!("workpool-worker-{}", id))
        .spawn_scoped(scope, f)
}


/// Fold every index of every range, one range per rayon job.
fn fold_ranges<T, A, I>(
    ranges: I,
    inputs: &[u64],
    task: &T,
    stats: &PoolStats,
) -> A
where
    T: Task,
    A: Aggregate<Item = T::Output>,
    I: IndexedParallelIterator<Item = Range<usize>>,
{
    ranges
        .with_max_len(1)
        .fold(A::default, |mut acc, range| {
            let worker = rayon::current_thread_index().unwrap_or(0);
            for index in range {
                let ctx = TaskContext { index, worker };
                let outcome = execute(task, ctx, inputs[index], stats);
                acc.absorb(ctx, outcome);
            }
            acc
        })
        .reduce(A::default, |mut left, right| {
            left.merge(right);
            left
        })
}

/// Run one task, turning a panic into a [`TaskError`].
fn execute<T: Task>(
    task: &T,
    ctx: TaskContext,
    input: u64,
    stats: &PoolStats,
) -> Result<T::Output, TaskError> {
    stats.task_started();
    let start = Instant::now();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run(ctx, input)))
        .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload.as_ref()))));

    stats.task_finished(outcome.is_ok(), start.elapsed());
    if let Err(error) = &outcome {
        warn!(index = ctx.index, worker = ctx.worker, error = %error, "task failed");
    }
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run `task` over `inputs` with a one-off pool built from `config`.
pub fn run<T, A>(
    inputs: &[u64],
    task: &T,
    config: PoolConfig,
) -> PoolResult<A::Value>
where
    T: Task,
    A: Aggregate<Item = T::Output>,
{
    TaskPool::new(config)?.run::<T, A>(inputs, task)
}

#[cfg(test)]
mod tests;
