//! Pool configuration.

use std::fmt;
use std::str::FromStr;
use std::thread;

use serde::{Deserialize, Serialize};

use super::error::{PoolError, PoolResult};

/// How task indices are distributed across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulingPolicy {
    /// Contiguous blocks fixed up front. Suits uniform task costs.
    StaticChunked,
    /// Each idle worker claims the next unclaimed index.
    #[default]
    Dynamic,
}

impl SchedulingPolicy {
    /// Name used on the command line and in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulingPolicy::StaticChunked => "static-chunked",
            SchedulingPolicy::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static-chunked" | "static" => Ok(SchedulingPolicy::StaticChunked),
            "dynamic" | "dynamic-one-at-a-time" => Ok(SchedulingPolicy::Dynamic),
            other => Err(format!(
                "unknown scheduling policy '{}' (expected static-chunked or dynamic)",
                other
            )),
        }
    }
}

/// Execution primitive backing the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// One dedicated OS thread per worker, alive for the whole run.
    #[default]
    Threads,
    /// A rayon pool built for the run; workers are transient loop splits.
    Rayon,
}

impl Backend {
    /// Name used on the command line and in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Threads => "threads",
            Backend::Rayon => "rayon",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threads" | "thread" => Ok(Backend::Threads),
            "rayon" => Ok(Backend::Rayon),
            other => Err(format!(
                "unknown backend '{}' (expected threads or rayon)",
                other
            )),
        }
    }
}

/// Parameters of a pool.
///
/// The task count is not stored here: it is the length of the input sequence
/// handed to [`TaskPool::run`](super::TaskPool::run). Use
/// [`PoolConfig::task_count`] to validate a count coming from outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of concurrent workers.
    pub parallelism: usize,
    /// Distribution of task indices over workers.
    #[serde(default)]
    pub policy: SchedulingPolicy,
    /// Execution primitive.
    #[serde(default)]
    pub backend: Backend,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            policy: SchedulingPolicy::default(),
            backend: Backend::default(),
        }
    }
}

/// Number of CPUs available to the process, 4 if unknown.
pub fn default_parallelism() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl PoolConfig {
    /// Config with the given parallelism and default policy/backend.
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism,
            ..Default::default()
        }
    }

    /// Set the scheduling policy.
    #[inline]
    pub fn with_policy(
        mut self,
        policy: SchedulingPolicy,
    ) -> Self {
        self.policy = policy;
        self
    }

    /// Set the backend.
    #[inline]
    pub fn with_backend(
        mut self,
        backend: Backend,
    ) -> Self {
        self.backend = backend;
        self
    }

    /// Check the parameters that do not depend on the task sequence.
    pub fn validate(&self) -> PoolResult<()> {
        if self.parallelism == 0 {
            return Err(PoolError::InvalidConfig(
                "parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate a signed task count.
    pub fn task_count(count: i64) -> PoolResult<usize> {
        usize::try_from(count).map_err(|_| {
            PoolError::InvalidConfig(format!("task count must not be negative (got {})", count))
        })
    }
}
