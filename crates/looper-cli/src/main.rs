//! looper - runs the cross-thread loop demos from the command line.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use looper_core::LoopConfig;
use looper_core::demo::{CollectConfig, CollectReport, ReplyConfig, ReplyReport};

#[derive(Debug, Parser)]
#[command(name = "looper", version, about = "Thread-confined message loop demos")]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON LoopConfig used as the template for every loop the command creates
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// A worker loop posts a delayed reply back to the loop on this thread
    Reply {
        /// Delay before the worker replies
        #[arg(long, default_value_t = 300)]
        delay_ms: u64,

        /// Text replies sent before the final one
        #[arg(long, default_value_t = 1)]
        replies: u32,
    },

    /// Busy-poll workers run simulated jobs and report completions here
    Collect {
        /// Simulated latency of each job
        #[arg(long, value_delimiter = ',', default_value = "2000,2000,4000")]
        delays_ms: Vec<u64>,

        /// Worker loops the jobs are spread over
        #[arg(long, default_value_t = 1)]
        workers: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let template = load_configuration(&cli)?;
    match cli.command {
        Command::Reply { delay_ms, replies } => {
            let mut config = ReplyConfig {
                delay: Duration::from_millis(delay_ms),
                replies,
                ..ReplyConfig::default()
            };
            if let Some(template) = &template {
                config.owner = from_template(template, &config.owner);
                config.worker = from_template(template, &config.worker);
            }
            let report = looper_core::demo::reply_to_owner(config).context("reply demo failed")?;
            if cli.json {
                print_json(&report)?;
            } else {
                print_reply(&report);
            }
        }
        Command::Collect { delays_ms, workers } => {
            if workers == 0 {
                bail!("--workers must be at least 1");
            }
            let mut config = CollectConfig {
                delays: delays_ms.into_iter().map(Duration::from_millis).collect(),
                workers,
                ..CollectConfig::default()
            };
            if let Some(template) = &template {
                config.owner = from_template(template, &config.owner);
                config.worker = from_template(template, &config.worker);
            }
            let report =
                looper_core::demo::fire_and_collect(config).context("collect demo failed")?;
            if cli.json {
                print_json(&report)?;
            } else {
                print_collect(&report);
            }
        }
    }
    Ok(())
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_configuration(cli: &Cli) -> Result<Option<LoopConfig>> {
    let Some(path) = &cli.config else {
        return Ok(None);
    };
    info!("Loading loop configuration from: {}", path.display());
    let config = LoopConfig::load_from_file(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok(Some(config))
}

/// Template settings with the demo's own loop name and mode.
///
/// The name keeps threads distinguishable; the mode is part of what each demo shows.
fn from_template(template: &LoopConfig, demo: &LoopConfig) -> LoopConfig {
    LoopConfig {
        name: format!("{}-{}", template.name, demo.name),
        mode: demo.mode,
        ..template.clone()
    }
}

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn print_reply(report: &ReplyReport) {
    println!(
        "owner thread: {}  worker thread: {}  delay: {}ms",
        report.owner_thread, report.worker_thread, report.delay_ms
    );
    for reply in &report.replies {
        println!(
            "  [{}] +{}ms on {}: {}",
            reply.received_at.format("%H:%M:%S%.3f"),
            reply.elapsed_ms,
            reply.received_on,
            reply.text
        );
    }
    println!("worker received values: {:?}", report.worker_values);
    println!(
        "owner: executed={} panicked={}  worker: executed={} panicked={}",
        report.owner_counts.executed,
        report.owner_counts.panicked,
        report.worker_counts.executed,
        report.worker_counts.panicked
    );
}

fn print_collect(report: &CollectReport) {
    println!("submitted: {}", report.submitted.join(", "));
    for completion in &report.completions {
        println!(
            "  [{}] +{}ms {} finished on {}",
            completion.finished_at.format("%H:%M:%S%.3f"),
            completion.elapsed_ms,
            completion.label,
            completion.worker
        );
    }
    println!("arrival order: {}", report.arrival_order().join(", "));
    for (i, counts) in report.worker_counts.iter().enumerate() {
        println!(
            "worker {i}: executed={} panicked={} dropped={}",
            counts.executed, counts.panicked, counts.dropped
        );
    }
}
