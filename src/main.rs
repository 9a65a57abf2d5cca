use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use cluster_proxy::config::load_config;
use cluster_proxy::lifecycle::{signals, startup, Shutdown};
use cluster_proxy::observability::{self, LogOutput};
use cluster_proxy::worker::{self, WorkerCommand, WorkerLauncher};

#[derive(Parser)]
#[command(name = "cluster-proxy")]
#[command(about = "Reverse proxy that spreads requests over a pool of worker processes", long_about = None)]
struct Cli {
    /// Path to the configuration file (TOML, or YAML/JSON by extension)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Run workers as tasks inside this process instead of child processes
    #[arg(long)]
    in_process: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Worker process entry point; started by the front process
    #[command(hide = true)]
    Worker {
        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Commands::Worker { log_level }) = cli.command {
        observability::init(&log_level, LogOutput::Stderr);
        worker::run_from_env().await?;
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    let log_level = config.observability.log_level.clone();
    observability::init(&log_level, LogOutput::Stdout);

    tracing::info!("cluster-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        path = %cli.config.display(),
        listen = config.server.listen,
        workers = config.server.worker_count(),
        rules = config.server.rules.len(),
        upstreams = config.server.upstreams.len(),
        "Configuration loaded"
    );

    let launcher = if cli.in_process {
        WorkerLauncher::InProcess
    } else {
        WorkerLauncher::Process(WorkerCommand::current_exe()?.arg("--log-level").arg(log_level))
    };

    let shutdown = Arc::new(Shutdown::new());
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        signal_shutdown.trigger();
    });

    startup::run(&config.server, &launcher, &shutdown).await?;

    shutdown.trigger();
    tracing::info!("Shutdown complete");
    Ok(())
}
