//! Aggregation of task outcomes.
//!
//! An [`Aggregate`] folds the outcome of every task of a run into a single
//! value. Folding must not depend on completion order: workers absorb
//! outcomes in whatever order they finish, and partial aggregates built by
//! different workers are merged in arbitrary order.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;

use super::error::{PoolError, PoolResult, TaskError};
use super::task::TaskContext;

/// Order-independent fold over task outcomes.
pub trait Aggregate: Default + Send {
    /// Output of a single task.
    type Item: Send;
    /// Final value handed to the caller of `run`.
    type Value;

    /// Fold the outcome of one task.
    fn absorb(
        &mut self,
        ctx: TaskContext,
        outcome: Result<Self::Item, TaskError>,
    );

    /// Fold another partial aggregate into this one.
    fn merge(
        &mut self,
        other: Self,
    );

    /// Number of outcomes absorbed so far.
    fn absorbed(&self) -> usize;

    /// Produce the final value.
    fn finish(self) -> PoolResult<Self::Value>;
}

/// Integer types that can be summed without silent wrap-around.
///
/// Values are added in an accumulator type and narrowed once at the end.
/// Unsigned partial sums only grow, so an overflow of any partial sum is an
/// overflow of the total. Signed values are accumulated in `i128`, which no
/// batch that fits in memory can overflow, so the result never depends on
/// the order in which partial sums are combined.
pub trait Summand: Copy + Send + fmt::Debug {
    /// Accumulator for partial sums.
    type Acc: Copy + Default + Send + fmt::Debug;

    /// The value as an accumulator.
    fn widen(self) -> Self::Acc;

    /// `lhs + rhs`, or `None` on overflow.
    fn checked_acc(
        lhs: Self::Acc,
        rhs: Self::Acc,
    ) -> Option<Self::Acc>;

    /// The accumulated total, or `None` if it does not fit in `Self`.
    fn narrow(acc: Self::Acc) -> Option<Self>;
}

macro_rules! impl_unsigned_summand {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Summand for $ty {
                type Acc = $ty;

                #[inline]
                fn widen(self) -> $ty {
                    self
                }

                #[inline]
                fn checked_acc(lhs: $ty, rhs: $ty) -> Option<$ty> {
                    lhs.checked_add(rhs)
                }

                #[inline]
                fn narrow(acc: $ty) -> Option<$ty> {
                    Some(acc)
                }
            }
        )*
    };
}

macro_rules! impl_signed_summand {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Summand for $ty {
                type Acc = i128;

                #[inline]
                fn widen(self) -> i128 {
                    self as i128
                }

                #[inline]
                fn checked_acc(lhs: i128, rhs: i128) -> Option<i128> {
                    lhs.checked_add(rhs)
                }

                #[inline]
                fn narrow(acc: i128) -> Option<$ty> {
                    <$ty>::try_from(acc).ok()
                }
            }
        )*
    };
}

impl_unsigned_summand!(u8, u16, u32, u64, u128, usize);
impl_signed_summand!(i8, i16, i32, i64, isize);

/// Numeric reduction.
///
/// Any failed task makes the whole reduction fail with
/// [`PoolError::TaskFailure`]; when several tasks fail the lowest index is
/// reported, so the error does not depend on scheduling.
#[derive(Debug)]
pub struct Sum<T: Summand> {
    /// `None` once the accumulator has overflowed.
    total: Option<T::Acc>,
    count: usize,
    failure: Option<(usize, TaskError)>,
}

impl<T: Summand> Default for Sum<T> {
    fn default() -> Self {
        Self {
            total: Some(T::Acc::default()),
            count: 0,
            failure: None,
        }
    }
}

impl<T: Summand> Sum<T> {
    fn add(
        &mut self,
        value: T::Acc,
    ) {
        self.total = self.total.and_then(|total| T::checked_acc(total, value));
    }

    fn fail(
        &mut self,
        index: usize,
        error: TaskError,
    ) {
        let earlier = matches!(&self.failure, Some((existing, _)) if *existing <= index);
        if !earlier {
            self.failure = Some((index, error));
        }
    }
}

impl<T: Summand> Aggregate for Sum<T> {
    type Item = T;
    type Value = T;

    fn absorb(
        &mut self,
        ctx: TaskContext,
        outcome: Result<T, TaskError>,
    ) {
        self.count += 1;
        match outcome {
            Ok(value) => self.add(value.widen()),
            Err(error) => self.fail(ctx.index, error),
        }
    }

    fn merge(
        &mut self,
        other: Self,
    ) {
        self.count += other.count;
        match other.total {
            Some(value) => self.add(value),
            None => self.total = None,
        }
        if let Some((index, error)) = other.failure {
            self.fail(index, error);
        }
    }

    #[inline]
    fn absorbed(&self) -> usize {
        self.count
    }

    fn finish(self) -> PoolResult<T> {
        if let Some((index, source)) = self.failure {
            return Err(PoolError::TaskFailure { index, source });
        }
        self.total.and_then(T::narrow).ok_or(PoolError::SumOverflow)
    }
}

/// Final status of one task in a fan-out run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskStatus {
    /// The task completed.
    Done,
    /// The task failed; siblings were not affected.
    Failed { reason: String },
}

/// Completion record of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRecord {
    pub index: usize,
    pub worker: usize,
    #[serde(flatten)]
    pub status: TaskStatus,
}

impl CompletionRecord {
    /// Whether the task completed.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }
}

/// Fan-out aggregation: one record per task, outputs discarded.
#[derive(Debug)]
pub struct Completion<O> {
    records: BTreeMap<usize, CompletionRecord>,
    _output: PhantomData<fn() -> O>,
}

impl<O> Default for Completion<O> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            _output: PhantomData,
        }
    }
}

impl<O: Send> Aggregate for Completion<O> {
    type Item = O;
    type Value = CompletionReport;

    fn absorb(
        &mut self,
        ctx: TaskContext,
        outcome: Result<O, TaskError>,
    ) {
        let status = match outcome {
            Ok(_) => TaskStatus::Done,
            Err(error) => TaskStatus::Failed {
                reason: error.to_string(),
            },
        };
        let previous = self.records.insert(
            ctx.index,
            CompletionRecord {
                index: ctx.index,
                worker: ctx.worker,
                status,
            },
        );
        debug_assert!(previous.is_none(), "task {} recorded twice", ctx.index);
    }

    fn merge(
        &mut self,
        other: Self,
    ) {
        for (index, record) in other.records {
            let previous = self.records.insert(index, record);
            debug_assert!(previous.is_none(), "task {} recorded twice", index);
        }
    }

    #[inline]
    fn absorbed(&self) -> usize {
        self.records.len()
    }

    fn finish(self) -> PoolResult<CompletionReport> {
        Ok(CompletionReport {
            records: self.records.into_values().collect(),
        })
    }
}

/// Per-task outcome of a fan-out run, ordered by task index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionReport {
    pub records: Vec<CompletionRecord>,
}

impl CompletionReport {
    /// Number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no task was run.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of completed tasks.
    pub fn done_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_done()).count()
    }

    /// Records of failed tasks.
    pub fn failures(&self) -> impl Iterator<Item = &CompletionRecord> {
        self.records.iter().filter(|r| !r.is_done())
    }

    /// Whether every task completed.
    pub fn all_done(&self) -> bool {
        self.records.iter().all(CompletionRecord::is_done)
    }
}
