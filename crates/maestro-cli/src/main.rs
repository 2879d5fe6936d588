mod config;

use clap::{Parser, Subcommand};
use config::AppConfig;
use maestro_broadcast::EventBroadcaster;
use maestro_executor::{DirectExecutor, RunnerConfig, RunnerExecutor};
use maestro_gateway::{build_router, AppState};
use maestro_orchestrator::{task_progress_callback, Orchestrator, TaskExecutor};
use maestro_storage::Storage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "maestro", about = "maestro: declarative AI agent orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "maestro.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server and worker pool
    Serve {
        /// Override the configured bind host
        #[arg(long)]
        host: Option<String>,
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Validate a declarative resource file (single or multi-document)
    Validate {
        /// Path to a YAML resource file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            serve(config, host, port).await
        }
        Commands::Validate { file } => validate(&file),
    }
}

async fn serve(config: AppConfig, host: String, port: u16) -> anyhow::Result<()> {
    if !config.database.database.is_empty() {
        warn!(
            driver = %config.database.driver,
            "SQL storage adapter is not wired into this binary; using the in-memory store"
        );
    }
    let storage = Storage::in_memory();

    let broadcaster = EventBroadcaster::new();
    let _sweeper = broadcaster.clone().start_sweeper();
    let callback = task_progress_callback(storage.clone(), broadcaster.clone());

    let executor: Arc<dyn TaskExecutor> = if config.runner.script.exists() {
        info!(script = %config.runner.script.display(), "using external runner executor");
        Arc::new(RunnerExecutor::new(
            storage.clone(),
            RunnerConfig {
                script: config.runner.script.clone(),
                interpreter: config.runner.interpreter.clone(),
                proxy: config.runner.proxy.clone(),
            },
        ))
    } else {
        info!("runner script not found, using in-process executor");
        Arc::new(DirectExecutor::new(storage.clone()))
    };

    let orchestrator = Arc::new(Orchestrator::new((&config.orchestrator).into()));
    orchestrator.start(executor);

    let state = Arc::new(AppState {
        storage,
        orchestrator: orchestrator.clone(),
        broadcaster,
        callback,
    });
    let app = build_router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, mode = %config.server.mode, "maestro server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    orchestrator.stop().await;
    info!("server exited");
    Ok(())
}

fn validate(file: &PathBuf) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)?;
    let resources = maestro_resource::parse_multi(&raw)?;
    if resources.is_empty() {
        println!("no resources found in {}", file.display());
        return Ok(());
    }
    for resource in &resources {
        println!("  {} / {}: ok", resource.kind(), resource.name());
    }
    println!("{} resource(s) valid", resources.len());
    Ok(())
}
