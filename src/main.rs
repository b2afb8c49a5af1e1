//! workpool - CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use workpool::monitor::{self, Metric, MonitorConfig, ProcessMonitor};
use workpool::pool::{Backend, PoolConfig, PoolError, SchedulingPolicy, TaskPool};
use workpool::util::config::{load_config, FileConfig};
use workpool::util::logger::{self, LogLevel};
use workpool::workloads::{fib, sleep};
use workpool::{NAME, VERSION};

/// Run batches of independent tasks on a fixed-size worker pool
#[derive(Parser, Debug)]
#[command(name = "workpool")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Maximum number of concurrent workers
    #[arg(short, long, global = true, env = "WORKPOOL_PARALLELISM")]
    parallelism: Option<usize>,

    /// Scheduling policy: static-chunked or dynamic
    #[arg(long, global = true, env = "WORKPOOL_POLICY")]
    policy: Option<SchedulingPolicy>,

    /// Execution backend: threads or rayon
    #[arg(long, global = true, env = "WORKPOOL_BACKEND")]
    backend: Option<Backend>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true, env = "WORKPOOL_LOG")]
    log_level: Option<LogLevel>,

    /// Config file, replacing the user and project files
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sum recursive Fibonacci numbers of random depths
    Fib {
        /// Number of tasks
        #[arg(value_name = "COUNT", allow_negative_numbers = true)]
        count: i64,

        /// Depths are drawn from 0..MAX
        #[arg(value_name = "MAX", allow_negative_numbers = true)]
        max: i64,

        /// Seed for the depth generator
        #[arg(long)]
        seed: Option<u64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start sleepers that greet, sleep, and report back
    Sleep {
        /// Number of sleepers
        #[arg(value_name = "THREADS", allow_negative_numbers = true)]
        threads: i64,

        /// Seconds each sleeper sleeps
        #[arg(value_name = "SECONDS", default_value_t = 0)]
        seconds: u64,

        /// Print the completion records as JSON instead of status lines
        #[arg(long)]
        json: bool,
    },

    /// Sample a process tree and print CSV
    Monitor {
        /// Process ID to monitor
        #[arg(long, conflicts_with = "name", required_unless_present = "name")]
        pid: Option<u32>,

        /// Process name to monitor
        #[arg(long)]
        name: Option<String>,

        /// User owning the processes to monitor
        #[arg(long)]
        user: Option<String>,

        /// Monitor the most remote ancestor owned by the user and all its descendants
        #[arg(long)]
        ancestor: bool,

        /// Seconds between measurements
        #[arg(long, default_value_t = 60.0)]
        delta: f64,

        /// Stop after this many samples
        #[arg(long)]
        samples: Option<usize>,

        /// File to write to instead of stdout
        #[arg(long, value_name = "FILE")]
        output_file: Option<PathBuf>,

        /// Metric to leave out (repeatable)
        #[arg(long = "inactive", value_name = "METRIC")]
        inactive: Vec<Metric>,
    },

    /// Print version information
    Version,
}

impl Args {
    /// Pool configuration: flags and environment over config files over defaults.
    fn pool_config(
        &self,
        file: &FileConfig,
        fallback_parallelism: Option<usize>,
    ) -> PoolConfig {
        let mut config = file.pool_config();
        if file.pool.parallelism.is_none() {
            if let Some(parallelism) = fallback_parallelism {
                config.parallelism = parallelism;
            }
        }
        if let Some(parallelism) = self.parallelism {
            config.parallelism = parallelism;
        }
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        config
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let file = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        args.log_level.unwrap_or_else(|| file.log_level())
    };
    logger::init_with_level(level);

    if args.verbose {
        eprintln!("{} version: {}", NAME, VERSION);
        eprintln!("Host: {}", std::env::consts::OS);
    }

    match &args.command {
        Commands::Fib {
            count,
            max,
            seed,
            json,
        } => {
            let count = PoolConfig::task_count(*count)?;
            let max = u64::try_from(*max).map_err(|_| {
                PoolError::InvalidConfig(format!("max must be at least 1 (got {})", max))
            })?;
            let seed = seed.unwrap_or_else(|| file.seed());

            let pool = TaskPool::new(args.pool_config(&file, None))?;
            let sum = fib::run(&pool, count, max, seed).context("Fibonacci run failed")?;
            debug!(
                peak_parallelism = pool.stats().peak_parallelism(),
                workers = pool.stats().workers_spawned(),
                "fib finished"
            );

            if *json {
                let value = serde_json::json!({ "sum": sum, "tasks": count, "seed": seed });
                println!("{}", value);
            } else {
                println!("sum = {}", sum);
            }
        },
        Commands::Sleep {
            threads,
            seconds,
            json,
        } => {
            let threads = PoolConfig::task_count(*threads)?;
            let pool = TaskPool::new(args.pool_config(&file, Some(threads.max(1))))?;

            let report = if *json {
                let sink = Mutex::new(io::sink());
                let report = sleep::run(&pool, NAME, threads, *seconds, &sink)?;
                println!("{}", serde_json::to_string_pretty(&report)?);
                report
            } else {
                let out = Mutex::new(io::stdout());
                sleep::run(&pool, NAME, threads, *seconds, &out)?
            };

            let failed = report.failures().count();
            if failed > 0 {
                bail!("{} of {} sleepers failed", failed, report.len());
            }
        },
        Commands::Monitor {
            pid,
            name,
            user,
            ancestor,
            delta,
            samples,
            output_file,
            inactive,
        } => {
            let mut target = match (pid, name) {
                (Some(pid), _) => *pid,
                (None, Some(name)) => {
                    let pids = monitor::find_pids(name);
                    match pids.as_slice() {
                        [] => return Err(monitor::MonitorError::NoProcessNamed(name.clone()).into()),
                        [only] => *only,
                        [first, ..] => {
                            if !*ancestor {
                                eprintln!(
                                    "# warning: there are multiple processes named {}, using ancestor PID",
                                    name
                                );
                            }
                            monitor::find_ancestor(*first, user.as_deref())?
                        },
                    }
                },
                (None, None) => bail!("either --pid or --name is required"),
            };
            if *ancestor {
                target = monitor::find_ancestor(target, user.as_deref())?;
            }
            if !delta.is_finite() || *delta < 0.0 {
                bail!("delta must be a non-negative number of seconds (got {})", delta);
            }

            let config = MonitorConfig {
                delta: Duration::from_secs_f64(*delta),
                samples: *samples,
                inactive: inactive.clone(),
            };
            if args.verbose {
                eprintln!("monitoring {}", target);
            }
            let mut monitor = ProcessMonitor::new(target, config)?;
            let mut out: Box<dyn Write> = match output_file {
                Some(path) => Box::new(
                    File::create(path)
                        .with_context(|| format!("Failed to create: {}", path.display()))?,
                ),
                None => Box::new(io::stdout()),
            };
            monitor.run(&mut out)?;
        },
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        },
    }

    Ok(())
}
