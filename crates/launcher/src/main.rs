//! stevedore-worker - Main Entry Point
//! Launches one worker in-process or N worker processes

mod cli;
mod settings;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stevedore_core::application::{
    shutdown_channel, LaunchOutcome, Launcher, ProcessGroup, QueueResolver, ShutdownToken,
    WorkerRegistry,
};
use stevedore_core::port::time_provider::SystemTimeProvider;
use stevedore_core::port::TimeProvider;
use stevedore_infra_sqlite::SqliteConnectionFactory;
use stevedore_infra_system::{ExecutableSpawner, HostNameProvider, SubprocessExecutor};

use cli::Cli;
use settings::LauncherSettings;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_LOG_FILTER: &str = "stevedore=info";
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(500);
const GROUP_TERMINATE_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize logging
    let _log_guard = init_logging()?;
    info!(core = stevedore_core::VERSION, "stevedore-worker v{} starting", VERSION);

    // 2. Load configuration (CLI flags win)
    let mut settings = LauncherSettings::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(url) = &cli.broker_url {
        settings.broker_url = url.clone();
    }
    if let Some(policy) = cli.on_connection_error {
        settings.connection_failure = policy;
    }
    if let Some(dir) = settings.default_broker_dir() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    // 3. Setup dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let launcher = Launcher::new(
        QueueResolver::new(settings.catalog()?),
        WorkerRegistry::with_builtins(),
        Arc::new(SqliteConnectionFactory::new(time_provider.clone())),
        Arc::new(SubprocessExecutor::new(
            time_provider.clone(),
            settings.env_allowlist.clone(),
        )),
        Arc::new(ExecutableSpawner::current_exe(cli.shared_args())?),
        Arc::new(HostNameProvider::new()),
        time_provider,
    )
    .with_settings(settings.worker_settings())
    .with_failure_policy(settings.connection_failure);

    // 4. SIGINT / SIGTERM request a graceful stop
    let (shutdown_tx, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received. Finishing current job...");
        shutdown_tx.shutdown();
    });

    // 5. Launch
    match launcher.launch(&cli.launch_request(), shutdown.clone()).await? {
        LaunchOutcome::Completed { worker, summary } => {
            info!(
                worker = %worker,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Worker finished"
            );
        }
        LaunchOutcome::ConnectionFailed { reason } => {
            eprintln!("{}", reason);
        }
        LaunchOutcome::Spawned(group) => watch_group(group, shutdown).await?,
    }

    Ok(())
}

fn init_logging() -> Result<WorkerGuard> {
    let log_format = std::env::var("STEVEDORE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .context("Failed to create env filter")?;

    // Logs go to stderr; job output stays on stdout
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(telemetry::layer());

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            registry
                .with(fmt::layer().json().with_writer(writer))
                .try_init()?;
        }
        _ => {
            // Development: Pretty formatting with colors
            registry
                .with(fmt::layer().pretty().with_writer(writer))
                .try_init()?;
        }
    }

    Ok(guard)
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Stay in the foreground while spawned workers are alive.
///
/// Their exit statuses are not collected; on shutdown they are asked to stop.
async fn watch_group(mut group: ProcessGroup, mut shutdown: ShutdownToken) -> Result<()> {
    info!(pids = ?group.pids(), "Worker processes started");
    if group.missing() > 0 {
        warn!(
            started = group.len(),
            requested = group.requested(),
            "Some worker processes failed to start"
        );
        eprintln!(
            "Started {} of {} worker processes",
            group.len(),
            group.requested()
        );
    }

    let mut ticker = tokio::time::interval(GROUP_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if group.live_count() == 0 {
                    info!("All worker processes exited");
                    return Ok(());
                }
            }
            _ = shutdown.wait() => break,
        }
    }

    group.terminate_all()?;
    let deadline = Instant::now() + GROUP_TERMINATE_GRACE;
    while group.live_count() > 0 && Instant::now() < deadline {
        tokio::time::sleep(GROUP_POLL_INTERVAL).await;
    }

    let remaining = group.live_count();
    if remaining > 0 {
        warn!(remaining, "Worker processes still running after shutdown grace period");
    }
    Ok(())
}
