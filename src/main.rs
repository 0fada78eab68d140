mod collectors;
mod config;
mod load;
mod report;
mod sampler;
mod startup;
mod state;
mod verdict;

use clap::{Args, CommandFactory, Parser, Subcommand};
use collectors::gpu;
use collectors::system::SystemProbe;
use config::Config;
use report::ReportError;
use state::CollectError;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use verdict::Aggregates;

#[derive(Parser, Debug)]
#[command(name = "rigcheck")]
#[command(version)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    Startup(StartupArgs),
    Stress(StressArgs),
}

#[derive(Args, Debug)]
struct StartupArgs {
    #[arg(long)]
    log: Option<String>,
}

#[derive(Args, Debug)]
struct StressArgs {
    #[arg(long)]
    duration: Option<u64>,
    #[arg(long)]
    output: Option<String>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "failed to load config");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let Some(command) = cli.command else {
        let _ = Cli::command().print_help();
        return;
    };

    match command {
        Command::Startup(args) => {
            if let Some(log) = args.log {
                cfg.startup.log_path = log;
            }
            exit_on_invalid(&cfg);
            if let Err(err) = startup::run(&cfg).await {
                error!(error = %err, "startup report failed");
                std::process::exit(1);
            }
        }
        Command::Stress(args) => {
            if let Some(duration) = args.duration {
                cfg.stress.duration_secs = duration;
            }
            if let Some(output) = args.output {
                cfg.stress.output_path = output;
            }
            exit_on_invalid(&cfg);
            if let Err(err) = run_stress_session(&cfg).await {
                error!(error = %err, "failed to write stress report");
                std::process::exit(1);
            }
        }
    }
}

fn exit_on_invalid(cfg: &Config) {
    if let Err(err) = cfg.validate() {
        error!(error = %err, "invalid configuration");
        std::process::exit(1);
    }
}

async fn run_stress_session(cfg: &Config) -> Result<(), ReportError> {
    let mut probe = SystemProbe::new();
    probe.prime();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let mut system = probe.info();
    system.gpu_name = gpu::probe_gpu().map(|g| g.name);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for Ctrl+C");
                // Keep the sender alive so a closed channel is never taken
                // for an interrupt.
                std::future::pending::<()>().await;
            }
        }
    });

    let mut collect = || Ok::<_, CollectError>(probe.snapshot());
    let run = sampler::run_stress(&cfg.stress, system, &mut collect, &mut shutdown_rx).await;

    let aggregates = Aggregates::compute(&run);
    let verdict = verdict::decide(&run, &aggregates, &cfg.stress);
    let text = report::render(&run, &aggregates, verdict);
    report::publish(&text, Path::new(&cfg.stress.output_path))?;

    info!(
        verdict = verdict.label(),
        samples = run.samples.len(),
        crashes = run.crash_events.len(),
        output = %cfg.stress.output_path,
        "stress session finished"
    );

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
