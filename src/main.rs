//! gaap: command-line front end for the experiment engine.
//!
//! - `gaap batch <experiments.csv>` runs descriptor rows in-process
//! - `gaap run <request.json>` runs one request in a worker process; Ctrl-C aborts
//! - `gaap modules` lists registered modules
//!
//! Logs go to stderr (`RUST_LOG`, default `info`). Stdout carries reports,
//! or wire frames for the hidden `worker` subcommand.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gaap_engine::bridge::run_worker;
use gaap_engine::{
    BatchRunner, EngineConfig, ExperimentBridge, ExperimentOutcome, ExperimentRequest,
    ModuleKind, ModuleRegistry, ProgressEvent, Status, WorkerCommand,
};

#[derive(Parser, Debug)]
#[command(name = "gaap", version, about = "Authorship attribution experiments")]
struct Cli {
    /// Engine configuration (TOML)
    #[arg(long, global = true, env = "GAAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every experiment in a CSV descriptor
    Batch {
        descriptor: PathBuf,
        /// Directory for report files (overrides the config)
        #[arg(long, short = 'o')]
        output_dir: Option<PathBuf>,
        /// Also write each result record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one JSON experiment request in a worker process
    Run {
        request: PathBuf,
        /// Print the full result record as JSON instead of the report
        #[arg(long)]
        json: bool,
    },
    /// List registered modules by kind
    Modules,
    /// Worker entry point: request on stdin, frames on stdout
    #[command(hide = true)]
    Worker,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_engine(path: Option<&PathBuf>) -> Result<Option<EngineConfig>> {
    path.map(|p| {
        EngineConfig::from_toml_file(p).with_context(|| format!("loading config {}", p.display()))
    })
    .transpose()
}

fn exit_for(status: Status) -> ExitCode {
    match status {
        Status::Success => ExitCode::SUCCESS,
        Status::Failure => ExitCode::FAILURE,
    }
}

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    let engine = load_engine(cli.config.as_ref())?;
    let registry = ModuleRegistry::with_builtin();
    for err in registry.load_errors() {
        warn!(%err, "plugin failed to load");
    }

    match cli.command {
        Command::Batch {
            descriptor,
            output_dir,
            json,
        } => run_batch(&registry, engine.unwrap_or_default(), descriptor, output_dir, json),
        Command::Run { request, json } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("starting async runtime")?;
            runtime.block_on(run_bridged(engine, request, json))
        }
        Command::Modules => {
            for kind in ModuleKind::ALL {
                println!("{}:", kind.as_str());
                for (name, description) in registry.catalog(kind) {
                    println!("  {name:<24} {description}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Worker => {
            let stdin = std::io::stdin().lock();
            let stdout = std::io::stdout().lock();
            let status = run_worker(&registry, stdin, stdout)?;
            Ok(exit_for(status))
        }
    }
}

fn run_batch(
    registry: &ModuleRegistry,
    mut engine: EngineConfig,
    descriptor: PathBuf,
    output_dir: Option<PathBuf>,
    json: bool,
) -> Result<ExitCode> {
    if let Some(dir) = output_dir {
        engine = engine.with_output_dir(dir);
    }
    engine.validate()?;
    let experiments = gaap_engine::batch::read_descriptor(&descriptor)
        .with_context(|| format!("reading {}", descriptor.display()))?;
    info!(count = experiments.len(), "loaded batch descriptor");

    let runner = BatchRunner::new(registry, engine).with_json(json);
    let mut failed = 0usize;
    for experiment in &experiments {
        let outcome = runner.run_one(experiment)?;
        for warning in &outcome.warnings {
            eprintln!("Warning ({}): {warning}", outcome.name);
        }
        if outcome.result.status == Status::Failure {
            failed += 1;
            eprintln!("{} failed:\n{}", outcome.name, outcome.result.message);
        }
        println!("{}", outcome.report_path.display());
    }
    info!(total = experiments.len(), failed, "batch finished");
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn show_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::Status(text) => eprintln!("{text}"),
        ProgressEvent::Percent(p) => eprintln!("{p:.0}%"),
        ProgressEvent::Indeterminate(_) | ProgressEvent::Finished => {}
    }
}

async fn run_bridged(engine: Option<EngineConfig>, path: PathBuf, json: bool) -> Result<ExitCode> {
    let text = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let mut request = ExperimentRequest::from_json(&text)?;
    if let Some(engine) = engine {
        request.engine = engine;
    }

    let bridge = ExperimentBridge::new(WorkerCommand::current_exe()?);
    let mut handle = bridge.start(&request).await?;
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = handle.next_progress() => match event {
                Some(event) => show_progress(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                break;
            }
        }
    }

    let outcome = if interrupted {
        eprintln!("Aborting experiment...");
        handle.abort().await?
    } else {
        handle.wait().await?
    };

    match outcome {
        ExperimentOutcome::Completed(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", result.results_text);
                if !result.message.is_empty() {
                    eprintln!("{}", result.message);
                }
            }
            Ok(exit_for(result.status))
        }
        ExperimentOutcome::Aborted { intermediate } => {
            match intermediate {
                Some(snapshot) => {
                    eprintln!("Aborted after {}", snapshot.stage);
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                }
                None => eprintln!("Aborted before any intermediate results"),
            }
            Ok(ExitCode::from(130))
        }
    }
}
