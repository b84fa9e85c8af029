//! Operator CLI for the dispatch-and-processing platform: starts the full
//! pipeline, runs workers or ingest in isolation for debugging, and reads
//! or writes scalar configuration.

mod demo_ingest;
mod processors;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use liveops_config::{registry_doc, ConfigStore};
use liveops_core::{
    Dispatcher, ProcessorFactoryRegistry, ServiceRegistry, ShutdownHandle, StreakTracker,
    Supervisor, SupervisorConfig,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::demo_ingest::DemoIngest;
use crate::processors::{LoggingProcessor, SlowLoggingProcessor};

#[derive(Parser, Debug)]
#[command(name = "liveops")]
#[command(about = "Live interaction event dispatch-and-processing platform operator CLI")]
struct Cli {
    /// Directory holding `config.toml` and `registry.toml`.
    #[arg(long, env = "LIVEOPS_CONFIG_DIR", default_value = "./config")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs the full pipeline: ingest, streak enrichment, dispatch, and
    /// every configured active service's worker.
    Run,

    /// Starts only the configured workers, without the ingest loop.
    /// Useful for verifying `registry.toml`/processor wiring in isolation.
    Workers {
        /// Restrict to a single service slug.
        #[arg(long)]
        service: Option<String>,

        /// Enable debug-level logging for this invocation.
        #[arg(long)]
        verbose: bool,
    },

    /// Runs only the ingest-and-dispatch loop, without starting workers,
    /// to exercise the admission/displacement policy in isolation.
    Ingest {
        /// Tag applied to synthetic events' room/streamer id.
        #[arg(long, default_value = "demo-session")]
        session_name: String,
    },

    /// Reads or writes a scalar key in the key/value config store.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Prints the value of `key`, or nothing if unset.
    Get { key: String },
    /// Sets `key` to `value`.
    Set { key: String, value: String },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "liveops_cli=debug,liveops_core=debug,liveops_config=debug"
    } else {
        "liveops_cli=info,liveops_core=info,liveops_config=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn builtin_factories() -> ProcessorFactoryRegistry {
    let mut factories = ProcessorFactoryRegistry::new();
    factories.register("logger", || {
        Arc::new(LoggingProcessor::new("logger")) as Arc<dyn liveops_contracts::Processor>
    });
    factories.register("slow-logger", || {
        Arc::new(SlowLoggingProcessor::new(
            "slow-logger",
            Duration::from_millis(250),
        )) as Arc<dyn liveops_contracts::Processor>
    });
    factories
}

fn load_registry(config_dir: &std::path::Path) -> Result<Arc<ServiceRegistry>> {
    let registry_path = config_dir.join("registry.toml");
    let document = registry_doc::load(&registry_path)
        .with_context(|| format!("failed to load {}", registry_path.display()))?;
    let (services, subscriptions) = registry_doc::into_registry_inputs(document);
    Ok(Arc::new(ServiceRegistry::new(services, subscriptions)))
}

async fn install_signal_shutdown(handle: ShutdownHandle) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("shutdown signal received");
        handle.trigger();
    });
}

async fn run_pipeline(config_dir: &std::path::Path) -> Result<()> {
    let registry = load_registry(config_dir)?;
    let factories = builtin_factories();
    let supervisor = Supervisor::start(registry, &factories, SupervisorConfig::default())
        .await
        .context("failed to start supervisor")?;

    let config_store = ConfigStore::load(config_dir.join("config.toml"))
        .context("failed to load config.toml")?;
    let streamer_handle = config_store
        .get("streamer_handle")
        .unwrap_or("unknown-streamer")
        .to_string();
    info!(streamer_handle = %streamer_handle, "starting pipeline");

    let (shutdown_handle, shutdown_signal) = ShutdownHandle::new();
    install_signal_shutdown(shutdown_handle).await;

    let ingest = Box::new(DemoIngest::new(streamer_handle, Duration::from_millis(200), None));
    supervisor.run(ingest, shutdown_signal).await;
    Ok(())
}

async fn run_workers_only(config_dir: &std::path::Path, service: Option<String>) -> Result<()> {
    let registry = load_registry(config_dir)?;
    if let Some(slug) = &service {
        let active = registry.active_services();
        if !active.iter().any(|s| &s.slug == slug) {
            warn!(service = %slug, "requested service is not active in registry.toml");
        }
    }

    let factories = builtin_factories();
    let supervisor = Supervisor::start(registry, &factories, SupervisorConfig::default())
        .await
        .context("failed to start supervisor")?;

    let (shutdown_handle, shutdown_signal) = ShutdownHandle::new();
    install_signal_shutdown(shutdown_handle).await;

    struct NeverIngest;
    #[async_trait::async_trait]
    impl liveops_contracts::Ingest for NeverIngest {
        async fn next_event(
            &mut self,
        ) -> Result<Option<liveops_contracts::RawEvent>, liveops_contracts::IngestError> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    supervisor.run(Box::new(NeverIngest), shutdown_signal).await;
    Ok(())
}

async fn run_ingest_only(config_dir: &std::path::Path, session_name: String) -> Result<()> {
    let registry = load_registry(config_dir)?;
    let dispatcher = Dispatcher::new(registry.clone());
    let streak_tracker = StreakTracker::new();

    for service in registry.active_services() {
        dispatcher.queue_for(&service.slug, service.max_queue_size);
    }

    let mut ingest = DemoIngest::new(session_name, Duration::from_millis(200), Some(50));

    loop {
        match ingest.next_event().await {
            Ok(Some(raw)) => {
                let event = streak_tracker.enrich(raw);
                for result in dispatcher.dispatch(event) {
                    info!(
                        service = %result.service_slug,
                        outcome = ?result.outcome,
                        "dispatched"
                    );
                }
            }
            Ok(None) => break,
            Err(err) => {
                error!(error = %err, "ingest error");
                break;
            }
        }
    }
    Ok(())
}

fn run_config_action(config_dir: &std::path::Path, action: ConfigAction) -> Result<()> {
    let mut store = ConfigStore::load(config_dir.join("config.toml"))
        .context("failed to load config.toml")?;
    match action {
        ConfigAction::Get { key } => match store.get(&key) {
            Some(value) => println!("{value}"),
            None => info!(key = %key, "key is not set"),
        },
        ConfigAction::Set { key, value } => {
            store.set(&key, &value).context("failed to persist config.toml")?;
            info!(key = %key, "config key updated");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Command::Workers { verbose: true, .. });
    init_tracing(verbose);

    match cli.command {
        Command::Run => run_pipeline(&cli.config_dir).await,
        Command::Workers { service, .. } => run_workers_only(&cli.config_dir, service).await,
        Command::Ingest { session_name } => run_ingest_only(&cli.config_dir, session_name).await,
        Command::Config { action } => run_config_action(&cli.config_dir, action),
    }
}
