//! CAN EOL Bench CLI Application
//!
//! Command-line front end for the can-eol-core library:
//! - Loads the signal map and validation rules (YAML/JSON)
//! - Replays a recorded candump trace through the decode/validate pipeline
//! - Prints the test summary and optionally writes it as JSON
//!
//! The exit code is non-zero when any rule fails.

use anyhow::{Context, Result};
use can_eol_core::{frame_queue, Pipeline, RuleSet, SignalMap, StateStore};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

mod config;
mod replay;
mod report;

/// How long to wait for the pipeline to drain a replayed trace
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// CAN EOL Bench - Decode and validate recorded CAN traffic
#[derive(Parser, Debug)]
#[command(name = "can-eol")]
#[command(about = "Replay a CAN trace through the EOL signal validator", long_about = None)]
#[command(version)]
struct Args {
    /// Path to bench configuration file (bench.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Signal map document (overrides the config file)
    #[arg(short, long, value_name = "FILE")]
    signals: Option<PathBuf>,

    /// Validation rule document (overrides the config file)
    #[arg(short, long, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// candump trace to replay (overrides the config file)
    #[arg(short, long, value_name = "FILE")]
    trace: Option<PathBuf>,

    /// Write the test summary as JSON (overrides the config file)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("CAN EOL Bench CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using core library v{}", can_eol_core::VERSION);

    let mut bench = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => config::BenchConfig::default(),
    };

    // Command-line paths win over the config file
    if args.signals.is_some() {
        bench.input.signals = args.signals.clone();
    }
    if args.rules.is_some() {
        bench.input.rules = args.rules.clone();
    }
    if args.trace.is_some() {
        bench.input.trace = args.trace.clone();
    }
    if args.output.is_some() {
        bench.output.json = args.output.clone();
    }

    let (Some(signals_path), Some(rules_path)) = (&bench.input.signals, &bench.input.rules) else {
        println!("CAN EOL Bench - No input specified");
        println!("\nQuick Start:");
        println!("  can-eol --signals can_decode.yaml --rules can_validation.yaml --trace run.log");
        println!("  can-eol --config bench.toml");
        println!("\nUse --help for more options");
        return Ok(ExitCode::SUCCESS);
    };

    let signal_map = SignalMap::load(signals_path)
        .with_context(|| format!("Failed to load signal map: {:?}", signals_path))?;
    let rule_set = RuleSet::load(rules_path)
        .with_context(|| format!("Failed to load rules: {:?}", rules_path))?;

    let stats = signal_map.stats();
    if !args.quiet {
        println!("Signal map: {} CAN IDs, {} signals", stats.num_messages, stats.num_signals);
        println!("Rules:      {} (on {} signals)", rule_set.len(), rule_set.signals().len());
    }

    let Some(trace_path) = &bench.input.trace else {
        println!("\nConfiguration loaded successfully");
        println!("  Add --trace <file> to replay recorded CAN traffic");
        return Ok(ExitCode::SUCCESS);
    };
    let frames = replay::read_trace(trace_path)?;
    let total = frames.len() as u64;

    let store = Arc::new(StateStore::with_priority_signals(
        bench.pipeline.priority_signals.clone(),
    ));
    let priority = store.subscribe_priority();

    let (sender, queue) = frame_queue(bench.pipeline.queue_capacity);
    let mut pipeline = Pipeline::start(
        queue,
        Arc::new(signal_map),
        Arc::new(rule_set),
        store,
        &bench.pipeline,
    )?;

    let producer = thread::Builder::new()
        .name("can-eol-replay".to_string())
        .spawn(move || {
            for frame in frames {
                if !sender.send(frame) {
                    break;
                }
            }
        })
        .context("Failed to spawn replay thread")?;

    if producer.join().is_err() {
        log::error!("Replay thread panicked");
    }

    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while pipeline.stats().frames() < total && Instant::now() < deadline {
        thread::sleep(bench.pipeline.poll_interval());
    }
    if pipeline.stats().frames() < total {
        log::warn!(
            "Pipeline drained only {} of {} frames",
            pipeline.stats().frames(),
            total
        );
    }

    pipeline.stop()?;

    for change in priority.try_iter() {
        log::info!("{} -> {}", change.signal, change.value);
    }

    let summary = pipeline.summary()?;
    if !args.quiet {
        println!();
        print!("{}", report::render_text(&summary, pipeline.stats()));
    }

    if let Some(json_path) = &bench.output.json {
        report::write_json(&summary, json_path)?;
    }

    if summary.all_passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
