//! Fan-out sleepers.
//!
//! Each task greets, sleeps for its input in seconds, and reports back. The
//! driver wraps the run in start/end banners and prints one line per task.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::pool::{CompletionReport, PoolError, Task, TaskContext, TaskError, TaskPool, TaskStatus};

/// Task that sleeps for `input` seconds, writing status lines to `out`.
#[derive(Debug)]
pub struct SleepTask<'a, W> {
    out: &'a Mutex<W>,
}

impl<'a, W: Write + Send> SleepTask<'a, W> {
    /// Sleeper writing to `out`.
    pub fn new(out: &'a Mutex<W>) -> Self {
        Self { out }
    }

    fn say(
        &self,
        line: std::fmt::Arguments<'_>,
    ) -> Result<(), TaskError> {
        let mut out = self.out.lock();
        writeln!(out, "{}", line)
            .and_then(|_| out.flush())
            .map_err(|e| TaskError::other(format!("write failed: {}", e)))
    }
}

impl<W: Write + Send> Task for SleepTask<'_, W> {
    type Output = ();

    fn run(
        &self,
        ctx: TaskContext,
        input: u64,
    ) -> Result<(), TaskError> {
        self.say(format_args!("hello from {}", ctx.index))?;
        thread::sleep(Duration::from_secs(input));
        self.say(format_args!("{} done sleeping", ctx.index))
    }
}

/// Errors of a sleeper run.
#[derive(Debug, Error)]
pub enum SleepError {
    /// The pool could not run the sleepers.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A banner or summary line could not be written.
    #[error("cannot write sleeper output: {0}")]
    Io(#[from] io::Error),
}

/// Run `threads` sleepers of `seconds` each, framed by banners naming
/// `program`.
///
/// Failed tasks are reported in the output and the returned report. Pool
/// errors and failures to write the banners or summary are returned as `Err`.
pub fn run<W: Write + Send>(
    pool: &TaskPool,
    program: &str,
    threads: usize,
    seconds: u64,
    out: &Mutex<W>,
) -> Result<CompletionReport, SleepError> {
    banner(out, format_args!("started {}", program))?;

    let inputs = vec![seconds; threads];
    debug!(threads, seconds, "sleepers submitted");
    let report = pool.fan_out(&inputs, &SleepTask::new(out))?;

    {
        let mut out = out.lock();
        for record in &report.records {
            match &record.status {
                TaskStatus::Done => writeln!(out, "thread {} finished normally", record.index)?,
                TaskStatus::Failed { reason } => {
                    writeln!(out, "thread {} failed: {}", record.index, reason)?
                },
            }
        }
    }

    banner(out, format_args!("ended {}", program))?;
    Ok(report)
}

fn banner<W: Write>(
    out: &Mutex<W>,
    line: std::fmt::Arguments<'_>,
) -> io::Result<()> {
    let mut out = out.lock();
    writeln!(out, "{}", line)?;
    out.flush()
}
