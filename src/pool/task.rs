//! Task and worker definitions for the pool.
//!
//! A task is a pure function of one `u64` input. Workers are the execution
//! contexts that run tasks one after another.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use super::error::TaskError;

/// Where a task is being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskContext {
    /// Position of the task in the submitted sequence.
    pub index: usize,
    /// Worker executing the task.
    pub worker: usize,
}

/// A unit of work that can be submitted to the pool.
///
/// Implementations must be shareable across workers; the pool calls
/// [`Task::run`] once per submitted input.
pub trait Task: Sync {
    /// Value produced on success.
    type Output: Send;

    /// Compute the output for `input`.
    fn run(
        &self,
        ctx: TaskContext,
        input: u64,
    ) -> Result<Self::Output, TaskError>;
}

/// A [`Task`] backed by a closure.
#[derive(Debug, Clone, Copy)]
pub struct FnTask<F>(F);

/// Wrap a closure as a [`Task`].
#[inline]
pub fn task_fn<F, O>(f: F) -> FnTask<F>
where
    F: Fn(TaskContext, u64) -> Result<O, TaskError> + Sync,
    O: Send,
{
    FnTask(f)
}

impl<F, O> Task for FnTask<F>
where
    F: Fn(TaskContext, u64) -> Result<O, TaskError> + Sync,
    O: Send,
{
    type Output = O;

    #[inline]
    fn run(
        &self,
        ctx: TaskContext,
        input: u64,
    ) -> Result<O, TaskError> {
        (self.0)(ctx, input)
    }
}

/// Lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, no task claimed yet.
    Idle,
    /// Executing its share of the tasks.
    Running,
    /// No work left; the worker has exited.
    Done,
}

impl WorkerState {
    /// Convert from u8 (for atomic storage).
    #[inline]
    pub fn from_u8(val: u8) -> Self {
        match val {
            1 => WorkerState::Running,
            2 => WorkerState::Done,
            _ => WorkerState::Idle,
        }
    }

    /// Convert to u8 (for atomic storage).
    #[inline]
    pub fn as_u8(&self) -> u8 {
        match self {
            WorkerState::Idle => 0,
            WorkerState::Running => 1,
            WorkerState::Done => 2,
        }
    }
}

/// One concurrent execution context of a run.
#[derive(Debug)]
pub struct WorkerSlot {
    id: usize,
    state: AtomicU8,
    tasks_run: AtomicUsize,
}

impl WorkerSlot {
    /// Create an idle slot.
    pub fn new(id: usize) -> Self {
        Self {
            id,
            state: AtomicU8::new(WorkerState::Idle.as_u8()),
            tasks_run: AtomicUsize::new(0),
        }
    }

    /// Worker id.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of tasks this worker has finished.
    #[inline]
    pub fn tasks_run(&self) -> usize {
        self.tasks_run.load(Ordering::Acquire)
    }

    /// `Idle -> Running`. Returns `false` if the slot was not idle.
    pub fn start(&self) -> bool {
        self.transition(WorkerState::Idle, WorkerState::Running)
    }

    /// Count one finished task. Only valid while running.
    pub fn record_task(&self) {
        debug_assert_eq!(self.state(), WorkerState::Running);
        self.tasks_run.fetch_add(1, Ordering::AcqRel);
    }

    /// `Running -> Done`. Returns `false` if the slot was not running.
    pub fn finish(&self) -> bool {
        self.transition(WorkerState::Running, WorkerState::Done)
    }

    fn transition(
        &self,
        from: WorkerState,
        to: WorkerState,
    ) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
