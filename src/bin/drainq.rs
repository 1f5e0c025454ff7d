//! drainq CLI: run the trigger server, or inspect the job catalog.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use drainq::config::Config;
use drainq::dispatch::{DispatchConfig, Dispatcher, DrainStatus, ShutdownOutcome};
use drainq::jobs::{JobCatalog, Plan, SimulatedWork, WorkBody};
use drainq::server::{self, HttpTransport};
use drainq::signal::Signals;
use drainq::telemetry::{TelemetryConfig, init_telemetry};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "drainq", about = "Job trigger server that drains work before exit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve triggers until SIGINT/SIGTERM, then drain and exit
    Serve(ServeArgs),
    /// Print the job catalog that `serve` would use
    Jobs {
        /// TOML job catalog
        #[arg(long)]
        jobs: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long)]
    addr: Option<SocketAddr>,
    /// Units dispatched per trigger by the default plan
    #[arg(long)]
    units: Option<usize>,
    /// Duration of each simulated unit, in milliseconds
    #[arg(long)]
    work_ms: Option<u64>,
    /// TOML job catalog
    #[arg(long)]
    jobs: Option<PathBuf>,
    /// Give up on outstanding work after this many seconds (default: wait forever)
    #[arg(long)]
    drain_timeout_secs: Option<u64>,
}

impl ServeArgs {
    fn apply(self, config: &mut Config) {
        if let Some(addr) = self.addr {
            config.listen_addr = addr;
        }
        if let Some(units) = self.units {
            config.units_per_trigger = units;
        }
        if let Some(ms) = self.work_ms {
            config.work_duration = Duration::from_millis(ms);
        }
        if self.jobs.is_some() {
            config.jobs_file = self.jobs;
        }
        if let Some(secs) = self.drain_timeout_secs {
            config.drain_timeout = Some(Duration::from_secs(secs));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Command::Serve(args) => {
            args.apply(&mut config);
            cmd_serve(config).await
        }
        Command::Jobs { jobs } => {
            if jobs.is_some() {
                config.jobs_file = jobs;
            }
            cmd_jobs(&config)
        }
    }
}

async fn cmd_serve(config: Config) -> anyhow::Result<()> {
    let guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "drainq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let catalog = load_catalog(&config)?;
    let dispatcher = Dispatcher::new(
        Arc::new(catalog),
        DispatchConfig {
            drain_timeout: config.drain_timeout,
        },
    );

    let mut signals = Signals::subscribe().context("installing signal handlers")?;
    let transport = Arc::new(
        HttpTransport::bind(config.listen_addr, server::router(dispatcher.clone())).await?,
    );

    let Some(sig) = signals.recv().await else {
        anyhow::bail!("termination signal stream closed");
    };
    info!(signal = %sig, "termination requested");

    // Later signals land here while the drain runs; they cannot restart it.
    let (d, t) = (dispatcher.clone(), Arc::clone(&transport));
    tokio::spawn(async move {
        while let Some(sig) = signals.recv().await {
            info!(signal = %sig, "termination requested again");
            d.shutdown(t.as_ref()).await;
        }
    });

    match dispatcher.shutdown(transport.as_ref()).await {
        ShutdownOutcome::Completed(report) => match report.status {
            DrainStatus::Drained => {
                info!(elapsed_ms = report.elapsed.as_millis() as u64, "all jobs drained")
            }
            DrainStatus::TimedOut { outstanding } => {
                warn!(outstanding, "exiting with work still outstanding")
            }
        },
        ShutdownOutcome::AlreadyInProgress => {}
    }

    guard.force_flush();
    Ok(())
}

fn cmd_jobs(config: &Config) -> anyhow::Result<()> {
    let catalog = load_catalog(config)?;

    println!("default plan: {} unit(s)", catalog.default_units());
    let named = catalog.named_jobs();
    if named.is_empty() {
        println!("No named jobs.");
        return Ok(());
    }

    println!("{:<24}  UNITS", "JOB");
    println!("{}", "-".repeat(32));
    for (name, units) in &named {
        println!("{name:<24}  {units}");
    }
    println!("\n{} job(s)", named.len());
    Ok(())
}

fn load_catalog(config: &Config) -> anyhow::Result<JobCatalog> {
    let default: Plan = (0..config.units_per_trigger)
        .map(|_| Arc::new(SimulatedWork::new(config.work_duration)) as Arc<dyn WorkBody>)
        .collect();

    let catalog = match config.jobs_file {
        Some(ref path) => JobCatalog::load_from_file(path, default)?,
        None => JobCatalog::with_default(default)?,
    };
    Ok(catalog)
}
