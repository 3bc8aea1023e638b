//! Command-line surface: one subcommand per experiment mode, each sharing the
//! `--preemption-mode` / `--preemption-strategy` override flags.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use kvsim::config::Config;
use kvsim::error::{AppError, ConfigError};
use kvsim::generator::generate;
use kvsim::overlays::truncation::TruncationOverlay;
use kvsim::overlays::{AdmissionControlOverlay, PlainScheduler, Scheduler};
use kvsim::policy::{build_policy, PreemptionMode, PreemptionStrategy};
use kvsim::request::Request;
use kvsim::simulator::{Simulator, TimingModel};
use kvsim::trace_io::load_trace;

#[derive(Parser)]
#[command(name = "kvsim", about = "Discrete-event simulator of a batched LLM inference scheduler")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a basic experiment from a config file and an existing trace.
    Run(RunArgs),
    /// (Re)generate a trace per the configured generation contract, then run.
    Generate(RunArgs),
    /// Run with the truncation overlay active.
    #[command(alias = "truncate")]
    Explore(RunArgs),
    /// Run the same trace at a list of admission-control thresholds.
    CompareAdmission {
        #[command(flatten)]
        run_args: RunArgs,
        #[arg(long, value_delimiter = ',')]
        thresholds: Vec<f64>,
    },
}

#[derive(Parser)]
pub struct RunArgs {
    #[arg(long)]
    pub config: PathBuf,
    #[arg(long)]
    pub preemption_mode: Option<String>,
    #[arg(long)]
    pub preemption_strategy: Option<String>,
}

fn resolve_overrides(config: &Config, args: &RunArgs) -> Result<(PreemptionMode, PreemptionStrategy), AppError> {
    let mode = match &args.preemption_mode {
        Some(s) => match s.as_str() {
            "swap" => PreemptionMode::Swap,
            "sacrifice" => PreemptionMode::Sacrifice,
            other => return Err(ConfigError::InvalidPreemptionMode(other.to_string()).into()),
        },
        None => config.control.mode()?,
    };
    let strategy = match &args.preemption_strategy {
        Some(s) => match s.as_str() {
            "aggressive" => PreemptionStrategy::Aggressive,
            "conservative" => PreemptionStrategy::Conservative,
            other => return Err(ConfigError::InvalidPreemptionStrategy(other.to_string()).into()),
        },
        None => config.control.strategy()?,
    };
    Ok((mode, strategy))
}

fn load_initial_trace(config: &Config, args: &RunArgs, regenerate: bool) -> Result<Vec<Request>, AppError> {
    if regenerate {
        let gen_config = config
            .generation
            .as_ref()
            .ok_or(ConfigError::MissingGenerationConfig)?
            .to_generation_config();
        Ok(generate(&gen_config))
    } else {
        let _ = args;
        Ok(load_trace(&config.data.trace_path, config.data.max_decode_length)?)
    }
}

fn build_scheduler(config: &Config, mode: PreemptionMode, strategy: PreemptionStrategy) -> Box<dyn Scheduler> {
    let policy = build_policy(mode, strategy);
    match &config.admission_control {
        Some(ac) if ac.enabled => Box::new(AdmissionControlOverlay::new(policy, ac.threshold)),
        _ => Box::new(PlainScheduler { policy }),
    }
}

fn run_one(config: &Config, args: &RunArgs, regenerate: bool, with_truncation: bool) -> Result<(), AppError> {
    let (mode, strategy) = resolve_overrides(config, args)?;
    let trace = load_initial_trace(config, args, regenerate)?;
    let scheduler = build_scheduler(config, mode, strategy);

    let timing = TimingModel { d0: config.system.d_0, d1: config.system.d_1 };
    let mut sim = Simulator::new(config.system.m_total, config.system.b, timing, scheduler, trace);

    if with_truncation {
        let trunc = config.require_truncation()?;
        let overlay = TruncationOverlay::new(trunc.batch_id, trunc.new_generation.to_generation_config());
        sim = sim.with_truncation(overlay);
    }

    let summary = sim.run_to_completion()?;
    tracing::info!(
        completed = summary.statistics.completed_count,
        sacrifices = summary.statistics.total_sacrifices,
        swapped_out = summary.statistics.total_swapped_out,
        "run complete"
    );

    std::fs::create_dir_all(&config.data.experiments_dir)?;
    sim.logger().write_batch_snapshots(&config.data.experiments_dir.join("batch_snapshots.csv"))?;
    sim.logger().write_request_trace(
        &config.data.experiments_dir.join("request_trace.csv"),
        &sim.state.completed,
    )?;
    sim.logger().write_events(&config.data.experiments_dir.join("events.csv"))?;

    println!("completed {} requests", summary.statistics.completed_count);
    println!("sacrifices: {}", summary.statistics.total_sacrifices);
    println!("swapped out: {}", summary.statistics.total_swapped_out);
    if let Some(stats) = sim.admission_stats() {
        println!(
            "admission control: rejected {} batches, {:.4}s above threshold, max memory ratio {:.4}",
            stats.rejected_count, stats.time_above_threshold, stats.max_memory_usage_ratio
        );
    }
    if let Some(report) = summary.truncation_report {
        println!(
            "truncation fired at batch {} (t={:.4}), discarded {}, replaced with {}",
            report.truncation_batch_id, report.truncation_time, report.discarded_count, report.replacement_count
        );
    }

    Ok(())
}

pub fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Command::Run(args) => {
            let config = Config::load(&args.config)?;
            run_one(&config, &args, false, false)
        }
        Command::Generate(args) => {
            let config = Config::load(&args.config)?;
            run_one(&config, &args, true, false)
        }
        Command::Explore(args) => {
            let config = Config::load(&args.config)?;
            run_one(&config, &args, false, true)
        }
        Command::CompareAdmission { run_args, thresholds } => {
            let mut config = Config::load(&run_args.config)?;
            for threshold in thresholds {
                config.admission_control = Some(kvsim::config::AdmissionControlConfig { enabled: true, threshold });
                run_one(&config, &run_args, false, false)?;
            }
            Ok(())
        }
    }
}
