//! Pool statistics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Counters accumulated over every run of a pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Runs started.
    pub runs: AtomicUsize,
    /// Workers spawned across all runs.
    pub workers_spawned: AtomicUsize,
    /// Tasks that produced an output.
    pub tasks_completed: AtomicUsize,
    /// Tasks that failed.
    pub tasks_failed: AtomicUsize,
    /// Total task execution time in microseconds.
    pub total_exec_time_us: AtomicUsize,
    /// Peak number of tasks running at the same time.
    pub peak_parallelism: AtomicUsize,
    /// Tasks running right now.
    running: AtomicUsize,
}

impl PoolStats {
    /// Record the start of a run.
    #[inline]
    pub fn record_run(&self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
    }

    /// Record spawned workers.
    #[inline]
    pub fn record_workers(
        &self,
        count: usize,
    ) {
        self.workers_spawned.fetch_add(count, Ordering::SeqCst);
    }

    /// Mark a task as started and update the parallelism peak.
    #[inline]
    pub fn task_started(&self) {
        let current = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.update_parallelism(current);
    }

    /// Mark a task as finished.
    #[inline]
    pub fn task_finished(
        &self,
        succeeded: bool,
        elapsed: Duration,
    ) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        if succeeded {
            self.tasks_completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::SeqCst);
        }
        let micros = usize::try_from(elapsed.as_micros()).unwrap_or(usize::MAX);
        self.total_exec_time_us.fetch_add(micros, Ordering::SeqCst);
    }

    /// Update parallelism.
    #[inline]
    pub fn update_parallelism(
        &self,
        current: usize,
    ) {
        self.peak_parallelism.fetch_max(current, Ordering::SeqCst);
    }

    /// Runs started so far.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Workers spawned so far.
    pub fn workers_spawned(&self) -> usize {
        self.workers_spawned.load(Ordering::SeqCst)
    }

    /// Tasks completed so far.
    pub fn tasks_completed(&self) -> usize {
        self.tasks_completed.load(Ordering::SeqCst)
    }

    /// Tasks failed so far.
    pub fn tasks_failed(&self) -> usize {
        self.tasks_failed.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently running tasks observed.
    pub fn peak_parallelism(&self) -> usize {
        self.peak_parallelism.load(Ordering::SeqCst)
    }

    /// Mean task execution time, `None` before any task ran.
    pub fn mean_exec_time(&self) -> Option<Duration> {
        let tasks = self.tasks_completed() + self.tasks_failed();
        if tasks == 0 {
            return None;
        }
        let total = self.total_exec_time_us.load(Ordering::SeqCst) as u64;
        Some(Duration::from_micros(total / tasks as u64))
    }
}
