//! Process monitor
//!
//! Samples a process and all of its descendants at a fixed interval and
//! writes one CSV row per process per sample. Used to watch the pool
//! workloads (or any other program) while they run.
//!
//! # Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use workpool::monitor::{MonitorConfig, ProcessMonitor};
//!
//! let config = MonitorConfig {
//!     delta: Duration::from_secs(1),
//!     samples: Some(3),
//!     ..Default::default()
//! };
//! let mut monitor = ProcessMonitor::new(std::process::id(), config).unwrap();
//! monitor.run(&mut std::io::stdout()).unwrap();
//! ```

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System, Uid, Users};
use thiserror::Error;
use tracing::{debug, warn};

/// Monitor errors
#[derive(Debug, Error)]
pub enum MonitorError {
    /// No process with this PID exists.
    #[error("PID {0} does not exist")]
    NoSuchProcess(u32),

    /// No process with this name exists.
    #[error("no process named '{0}'")]
    NoProcessNamed(String),

    /// The requested user is unknown.
    #[error("unknown user '{0}'")]
    UnknownUser(String),

    /// Writing samples failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A measurable property of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Time,
    Node,
    Pid,
    Ppid,
    Cmd,
    Cmdline,
    CpuPercent,
    NumThreads,
    Mem,
    MemPercent,
}

impl Metric {
    /// Every metric, in column order.
    pub const ALL: [Metric; 10] = [
        Metric::Time,
        Metric::Node,
        Metric::Pid,
        Metric::Ppid,
        Metric::Cmd,
        Metric::Cmdline,
        Metric::CpuPercent,
        Metric::NumThreads,
        Metric::Mem,
        Metric::MemPercent,
    ];

    /// Column name.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Time => "time",
            Metric::Node => "node",
            Metric::Pid => "pid",
            Metric::Ppid => "ppid",
            Metric::Cmd => "cmd",
            Metric::Cmdline => "cmdline",
            Metric::CpuPercent => "cpu_percent",
            Metric::NumThreads => "num_threads",
            Metric::Mem => "mem",
            Metric::MemPercent => "mem_percent",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| format!("unknown metric '{}'", s))
    }
}

/// Monitor settings.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between samples.
    pub delta: Duration,
    /// Stop after this many samples; `None` runs until the process exits.
    pub samples: Option<usize>,
    /// Metrics left out of the output.
    pub inactive: Vec<Metric>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            delta: Duration::from_secs(60),
            samples: None,
            inactive: Vec::new(),
        }
    }
}

impl MonitorConfig {
    /// Active metrics, in column order.
    pub fn active_metrics(&self) -> Vec<Metric> {
        Metric::ALL
            .into_iter()
            .filter(|m| !self.inactive.contains(m))
            .collect()
    }
}

/// One measurement of one process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub time: f64,
    pub node: String,
    pub pid: u32,
    pub ppid: Option<u32>,
    pub cmd: Option<String>,
    pub cmdline: String,
    pub cpu_percent: f32,
    pub num_threads: Option<usize>,
    pub mem: u64,
    pub mem_percent: f64,
}

impl ProcessSample {
    /// Value of one metric as a CSV field.
    pub fn field(
        &self,
        metric: Metric,
    ) -> String {
        match metric {
            Metric::Time => format!("{:.3}", self.time),
            Metric::Node => self.node.clone(),
            Metric::Pid => self.pid.to_string(),
            Metric::Ppid => self.ppid.map(|p| p.to_string()).unwrap_or_default(),
            Metric::Cmd => self.cmd.clone().unwrap_or_default(),
            Metric::Cmdline => self.cmdline.clone(),
            Metric::CpuPercent => format!("{:.2}", self.cpu_percent),
            Metric::NumThreads => self.num_threads.map(|n| n.to_string()).unwrap_or_default(),
            Metric::Mem => self.mem.to_string(),
            Metric::MemPercent => format!("{:.2}", self.mem_percent),
        }
    }

    /// CSV row for the given metrics.
    pub fn row(
        &self,
        metrics: &[Metric],
    ) -> String {
        metrics
            .iter()
            .map(|m| self.field(*m))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// CSV header for the given metrics.
pub fn header(metrics: &[Metric]) -> String {
    metrics
        .iter()
        .map(Metric::name)
        .collect::<Vec<_>>()
        .join(",")
}

/// Periodic sampler of a process tree.
pub struct ProcessMonitor {
    system: System,
    root: Pid,
    metrics: Vec<Metric>,
    config: MonitorConfig,
    node: String,
}

impl fmt::Debug for ProcessMonitor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ProcessMonitor")
            .field("root", &self.root)
            .field("metrics", &self.metrics)
            .field("config", &self.config)
            .finish()
    }
}

impl ProcessMonitor {
    /// Monitor `pid` and its descendants.
    pub fn new(
        pid: u32,
        config: MonitorConfig,
    ) -> Result<Self, MonitorError> {
        let system = refreshed_system();
        let root = Pid::from_u32(pid);
        if system.process(root).is_none() {
            return Err(MonitorError::NoSuchProcess(pid));
        }
        Ok(Self {
            system,
            root,
            metrics: config.active_metrics(),
            config,
            node: System::host_name().unwrap_or_default(),
        })
    }

    /// Active metrics, in column order.
    #[inline]
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// Sample the root process and its descendants.
    ///
    /// Returns an empty vector once the root process is gone.
    pub fn sample(&mut self) -> Vec<ProcessSample> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );
        self.system.refresh_memory();

        if self.system.process(self.root).is_none() {
            return Vec::new();
        }

        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let total_memory = self.system.total_memory();

        descendants(&self.system, self.root)
            .into_iter()
            .filter_map(|pid| self.system.process(pid))
            .map(|process| ProcessSample {
                time,
                node: self.node.clone(),
                pid: process.pid().as_u32(),
                ppid: process.parent().map(|p| p.as_u32()),
                cmd: process.exe().map(|p| p.display().to_string()),
                cmdline: quoted_cmdline(process.cmd()),
                cpu_percent: process.cpu_usage(),
                num_threads: process.tasks().map(|t| t.len().max(1)),
                mem: process.memory(),
                mem_percent: if total_memory == 0 {
                    0.0
                } else {
                    process.memory() as f64 * 100.0 / total_memory as f64
                },
            })
            .collect()
    }

    /// Write the header, then sample until the sample limit is reached or
    /// the root process exits. Returns the number of samples taken.
    pub fn run<W: Write>(
        &mut self,
        out: &mut W,
    ) -> Result<usize, MonitorError> {
        writeln!(out, "{}", header(&self.metrics))?;
        debug!(pid = %self.root, delta_ms = self.config.delta.as_millis() as u64, "monitoring");

        let mut taken = 0;
        loop {
            let samples = self.sample();
            if samples.is_empty() {
                debug!(pid = %self.root, "monitored process exited");
                break;
            }
            for sample in &samples {
                writeln!(out, "{}", sample.row(&self.metrics))?;
            }
            out.flush()?;
            taken += 1;

            if self.config.samples.is_some_and(|limit| taken >= limit) {
                break;
            }
            thread::sleep(self.config.delta);
        }
        Ok(taken)
    }
}

/// PIDs of all processes named `name`, sorted.
pub fn find_pids(name: &str) -> Vec<u32> {
    let system = refreshed_system();
    let threads = thread_ids(&system);
    let mut pids: Vec<u32> = system
        .processes()
        .iter()
        .filter(|(pid, process)| !threads.contains(*pid) && process.name() == OsStr::new(name))
        .map(|(pid, _)| pid.as_u32())
        .collect();
    pids.sort_unstable();
    pids
}

/// Most remote ancestor of `pid` owned by `user`, or by the owner of `pid`
/// when no user is given. Returns `pid` itself when no ancestor qualifies.
pub fn find_ancestor(
    pid: u32,
    user: Option<&str>,
) -> Result<u32, MonitorError> {
    let system = refreshed_system();
    let start = Pid::from_u32(pid);
    let process = system
        .process(start)
        .ok_or(MonitorError::NoSuchProcess(pid))?;

    let owner: Option<Uid> = match user {
        Some(name) => {
            let users = Users::new_with_refreshed_list();
            let found = users
                .iter()
                .find(|u| u.name() == name)
                .map(|u| u.id().clone());
            Some(found.ok_or_else(|| MonitorError::UnknownUser(name.to_string()))?)
        },
        None => process.user_id().cloned(),
    };
    let Some(owner) = owner else {
        warn!(pid, "owner of process unknown, not searching ancestors");
        return Ok(pid);
    };

    let ancestors = ancestors(&system, start);
    Ok(ancestors
        .iter()
        .rev()
        .find(|p| {
            system
                .process(**p)
                .and_then(Process::user_id)
                .is_some_and(|uid| *uid == owner)
        })
        .map(|p| p.as_u32())
        .unwrap_or(pid))
}

fn refreshed_system() -> System {
    System::new_with_specifics(RefreshKind::new().with_processes(ProcessRefreshKind::everything()))
}

/// Thread entries that the process table lists next to real processes.
fn thread_ids(system: &System) -> HashSet<Pid> {
    system
        .processes()
        .iter()
        .filter_map(|(pid, process)| process.tasks().map(|tasks| (pid, tasks)))
        .flat_map(|(pid, tasks)| tasks.iter().filter(move |t| *t != pid).copied())
        .collect()
}

/// `root` followed by all its descendants, breadth first.
fn descendants(
    system: &System,
    root: Pid,
) -> Vec<Pid> {
    let threads = thread_ids(system);
    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, process) in system.processes() {
        if threads.contains(pid) {
            continue;
        }
        if let Some(parent) = process.parent() {
            children.entry(parent).or_default().push(*pid);
        }
    }
    for list in children.values_mut() {
        list.sort_unstable();
    }

    let mut order = vec![root];
    let mut seen = HashSet::from([root]);
    let mut next = 0;
    while next < order.len() {
        if let Some(kids) = children.get(&order[next]) {
            for kid in kids {
                if seen.insert(*kid) {
                    order.push(*kid);
                }
            }
        }
        next += 1;
    }
    order
}

/// Parent chain of `pid`, nearest first.
fn ancestors(
    system: &System,
    pid: Pid,
) -> Vec<Pid> {
    let mut chain = Vec::new();
    let mut seen = HashSet::from([pid]);
    let mut current = system.process(pid).and_then(Process::parent);
    while let Some(parent) = current {
        if !seen.insert(parent) {
            break;
        }
        chain.push(parent);
        current = system.process(parent).and_then(Process::parent);
    }
    chain
}

/// The command line as one double-quoted CSV field, arguments shell-quoted.
fn quoted_cmdline(args: &[std::ffi::OsString]) -> String {
    let joined = args
        .iter()
        .map(|arg| shell_quote(&arg.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ");
    format!("\"{}\"", joined)
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\"'\"'"))
    }
}

#[cfg(test)]
mod tests;
