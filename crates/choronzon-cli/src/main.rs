//! `choronzon` binary: the CLI front-end for the fuzzing engine.
//!
//! Subcommands delegate directly into `choronzon-engine`'s public entry
//! points; this crate owns only argument parsing, logging setup, signal
//! wiring, and exit-code translation.

mod registry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use choronzon_core::ChoronzonError;
use choronzon_engine::{ProcessExecutor, RunConfig, Scheduler, StopReason};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "choronzon", about = "Evolutionary, knowledge-based file-format fuzzer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prepare a run directory and validate the seed corpus for a config.
    Init(InitArgs),
    /// Run the evolutionary loop until interrupted or the generation cap.
    Run(RunArgs),
    /// Continue a previously checkpointed campaign.
    Resume(RunArgs),
    /// Re-execute a single corpus member deterministically.
    Replay(ReplayArgs),
}

#[derive(clap::Args, Debug)]
struct InitArgs {
    /// Path to the campaign's YAML configuration file.
    config: PathBuf,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Path to the campaign's YAML configuration file.
    config: PathBuf,
}

#[derive(clap::Args, Debug)]
struct ReplayArgs {
    /// Path to the campaign's YAML configuration file.
    config: PathBuf,
    /// Content-addressed identifier of the corpus member to replay.
    id: String,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Init(args) => cmd_init(&args),
        Command::Run(args) => cmd_run(&args),
        Command::Resume(args) => cmd_resume(&args),
        Command::Replay(args) => cmd_replay(&args),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err}");
            exit_code_for(&err)
        }
    }
}

fn cmd_init(args: &InitArgs) -> Result<ExitCode, ChoronzonError> {
    let config = RunConfig::load(&args.config)?;
    choronzon_engine::persistence::prepare_run_directory(&config)?;
    let plugin = registry::resolve(&config.format)?;
    let seeds = choronzon_engine::seeds::load_seed_corpus(&config.seeds, plugin.as_ref())?;
    log::info!(
        "prepared run directory at {} with {} valid seed(s)",
        config.output.run_directory.display(),
        seeds.len()
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_run(args: &RunArgs) -> Result<ExitCode, ChoronzonError> {
    let config = RunConfig::load(&args.config)?;
    let manifest_path = config.run_path(&config.output.manifest_file);
    let plugin = registry::resolve(&config.format)?;
    let executor = ProcessExecutor::new(config.target.clone(), &config.scratch_dir());
    let interrupted = install_interrupt_handler()?;
    let mut scheduler = if manifest_path.exists() {
        Scheduler::resume(config, plugin, executor, interrupted)?
    } else {
        Scheduler::bootstrap(config, plugin, executor, interrupted)?
    };
    drive(&mut scheduler)
}

fn cmd_resume(args: &RunArgs) -> Result<ExitCode, ChoronzonError> {
    let config = RunConfig::load(&args.config)?;
    let plugin = registry::resolve(&config.format)?;
    let executor = ProcessExecutor::new(config.target.clone(), &config.scratch_dir());
    let interrupted = install_interrupt_handler()?;
    let mut scheduler = Scheduler::resume(config, plugin, executor, interrupted)?;
    drive(&mut scheduler)
}

fn drive<F, E>(scheduler: &mut Scheduler<F, E>) -> Result<ExitCode, ChoronzonError>
where
    F: choronzon_format::FormatPlugin,
    E: choronzon_engine::TrialExecutor,
{
    match scheduler.run()? {
        StopReason::GenerationCapReached => {
            log::info!(
                "generation cap reached: {} corpus member(s), {} crash site(s)",
                scheduler.corpus_len(),
                scheduler.crash_count()
            );
            Ok(ExitCode::SUCCESS)
        }
        StopReason::Interrupted => {
            log::warn!("interrupted; checkpoint flushed");
            Ok(ExitCode::from(130))
        }
    }
}

fn cmd_replay(args: &ReplayArgs) -> Result<ExitCode, ChoronzonError> {
    let config = RunConfig::load(&args.config)?;
    let plugin = registry::resolve(&config.format)?;
    let executor = ProcessExecutor::new(config.target.clone(), &config.scratch_dir());
    let interrupted = Arc::new(AtomicBool::new(false));
    let mut scheduler = Scheduler::resume(config, plugin, executor, interrupted)?;
    let (bytes, termination) = scheduler.replay(&args.id)?;
    log::info!(
        "replayed {} ({} byte(s)): {:?}",
        args.id,
        bytes.len(),
        termination
    );
    Ok(ExitCode::SUCCESS)
}

/// Installs a `ctrlc`-style SIGINT/SIGTERM handler that flips a shared flag
/// the scheduler polls between trials; the handler itself never acts on the
/// interrupt directly.
fn install_interrupt_handler() -> Result<Arc<AtomicBool>, ChoronzonError> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)).map_err(|err| {
        ChoronzonError::Io(choronzon_core::ErrorInfo::new(
            "signal-handler-install",
            err.to_string(),
        ))
    })?;
    Ok(interrupted)
}

fn exit_code_for(err: &ChoronzonError) -> ExitCode {
    match err {
        ChoronzonError::Tracer(info) if info.code == "tracer-failure-budget-exceeded" => {
            ExitCode::from(2)
        }
        _ => ExitCode::FAILURE,
    }
}
