//! Hydropump CLI entry point.

use clap::{Parser, Subcommand};
use hydropump::config::{ClockSourceKind, OutputDriverKind};
use hydropump::{
    ConfigProvider, HydropumpConfig, MemoryOutput, OutputDriver, PumpSettings, Scheduler,
    SntpTimeSource, SysfsGpioOutput, SystemStatus, SystemTimeSource, TcpProbe, TimeSource,
};
use hydropump_cloud::DataApiClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Interval between status snapshots logged at debug level.
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Hydropump: scheduled irrigation pump controller.
#[derive(Parser)]
#[command(name = "hydropump", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller until Ctrl+C or SIGTERM.
    Run,

    /// Fetch every pump's configuration once and print it.
    Fetch,

    /// Query the time source once and print the local time.
    Time,

    /// Run the startup pass and print a status snapshot as JSON.
    Status,

    /// Print the default configuration as TOML.
    DefaultConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hydropump=info,hydropump_cloud=info")),
        )
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run);

    if let Command::DefaultConfig = command {
        print!("{}", HydropumpConfig::default().to_toml()?);
        return Ok(());
    }

    let config = load_config(cli.config)?;
    config.validate()?;

    match command {
        Command::Run => run(&config).await,
        Command::Fetch => fetch(&config).await,
        Command::Time => time(&config).await,
        Command::Status => status(&config).await,
        Command::DefaultConfig => Ok(()),
    }
}

/// Explicit path, else the default path if it exists, else built-in defaults.
fn load_config(path: Option<PathBuf>) -> anyhow::Result<HydropumpConfig> {
    let path = match path {
        Some(path) => path,
        None => {
            let default = HydropumpConfig::default_config_path();
            if !default.exists() {
                info!("no config file, using defaults");
                return Ok(HydropumpConfig::default());
            }
            default
        }
    };
    info!(path = %path.display(), "loading config");
    Ok(HydropumpConfig::from_file(&path)?)
}

fn output_driver(config: &HydropumpConfig) -> Arc<dyn OutputDriver> {
    match config.output.driver {
        OutputDriverKind::Memory => Arc::new(MemoryOutput::new()),
        OutputDriverKind::Sysfs => Arc::new(SysfsGpioOutput::new(&config.output.sysfs_root)),
    }
}

fn time_source(config: &HydropumpConfig) -> anyhow::Result<Arc<dyn TimeSource>> {
    let offset = config.clock.utc_offset()?;
    let source: Arc<dyn TimeSource> = match config.clock.source {
        ClockSourceKind::Sntp => Arc::new(SntpTimeSource::new(
            config.clock.server.clone(),
            offset,
            config.timeouts.time(),
        )),
        ClockSourceKind::System => Arc::new(SystemTimeSource::new(offset)),
    };
    Ok(source)
}

fn provider(config: &HydropumpConfig) -> anyhow::Result<Arc<dyn ConfigProvider>> {
    Ok(Arc::new(DataApiClient::new(config.cloud.clone())?))
}

fn scheduler(config: &HydropumpConfig) -> anyhow::Result<Scheduler> {
    let scheduler = Scheduler::from_config(
        config,
        output_driver(config),
        provider(config)?,
        time_source(config)?,
    )?;
    let link = TcpProbe::new(config.link.probe_address.clone(), config.link.probe_timeout())
        .with_reconnect_command(config.link.reconnect_command.clone());
    Ok(scheduler.with_connectivity(Arc::new(link)))
}

async fn run(config: &HydropumpConfig) -> anyhow::Result<()> {
    println!("Hydropump v{}", env!("CARGO_PKG_VERSION"));

    let scheduler = scheduler(config)?;
    let cancel = CancellationToken::new();

    let shutdown = shutdown_signal()?;
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let signal = shutdown.await;
        info!(signal, "shutting down...");
        cancel_clone.cancel();
    });

    let handles = scheduler.start(&cancel).await;

    let mut status_tick = tokio::time::interval(STATUS_LOG_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = status_tick.tick() => {
                let snapshot = SystemStatus::capture(&scheduler);
                debug!(status = ?snapshot, "status");
            }
        }
    }

    let joined = scheduler.shutdown(handles).await;
    info!("all pumps off");
    joined?;
    Ok(())
}

/// Resolves with the signal name on Ctrl+C, or on SIGTERM where available.
///
/// The SIGTERM handler is installed before this returns, so a `kill` or a
/// service stop during startup still goes through the shutdown path.
fn shutdown_signal() -> anyhow::Result<impl std::future::Future<Output = &'static str>> {
    #[cfg(unix)]
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(async move {
        #[cfg(unix)]
        {
            tokio::select! {
                Ok(()) = tokio::signal::ctrl_c() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            "Ctrl+C"
        }
    })
}

async fn fetch(config: &HydropumpConfig) -> anyhow::Result<()> {
    let provider = provider(config)?;
    for pump in &config.pumps {
        let remote = provider.fetch_config(&pump.code).await?;
        let settings = PumpSettings::from_remote(&remote)?;
        let times: Vec<&str> = settings.schedule.iter().map(|t| t.as_str()).collect();
        println!(
            "{} (gpio {}): pulse {} ms, triggers [{}]",
            pump.code,
            pump.channel,
            settings.pulse_duration.as_millis(),
            times.join(", ")
        );
    }
    Ok(())
}

async fn time(config: &HydropumpConfig) -> anyhow::Result<()> {
    let source = time_source(config)?;
    let raw = tokio::time::timeout(config.timeouts.time(), source.current_formatted_time())
        .await
        .map_err(|_| anyhow::anyhow!("time query timed out"))??;
    println!("{raw}");
    Ok(())
}

async fn status(config: &HydropumpConfig) -> anyhow::Result<()> {
    let scheduler = scheduler(config)?;
    scheduler.startup().await;
    println!(
        "{}",
        serde_json::to_string_pretty(&SystemStatus::capture(&scheduler))?
    );
    Ok(())
}
