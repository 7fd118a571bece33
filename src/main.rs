//! Tuya Exporter binary
//!
//! Polls Tuya smart power devices and serves their readings to Prometheus.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use tuya_exporter::{
    start_web_server, ConfigFile, ExporterConfig, ExporterError, MetricStore, Poller, TuyaClient,
    TuyaCredentials, WebConfig, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_WEB_PORT,
};

#[derive(Parser)]
#[command(name = "tuya_exporter")]
#[command(about = "Prometheus exporter for Tuya smart plugs and power strips")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Tuya OpenAPI endpoint (e.g. https://openapi.tuyaeu.com)
    #[arg(long, env = "TUYA_ENDPOINT")]
    endpoint: Option<String>,

    /// Tuya cloud project access id
    #[arg(long, env = "TUYA_ACCESS_ID")]
    access_id: Option<String>,

    /// Tuya cloud project access secret
    #[arg(long, env = "TUYA_ACCESS_SECRET", hide_env_values = true)]
    access_secret: Option<String>,

    /// JSON file with "devices" and/or "scaling" sections
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Web server bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Web server port
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// Pause between poll cycles in seconds
    #[arg(short, long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    interval: u64,

    /// Timeout for each Tuya API request in seconds (no timeout if unset)
    #[arg(long)]
    request_timeout: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll devices and serve /metrics (default)
    Serve,

    /// Run a single poll cycle and print the exposition text
    Once,

    /// Show the configured devices and scaling rules
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    match cli.command.as_ref().unwrap_or(&Commands::Serve) {
        Commands::Serve => serve_command(&cli).await?,
        Commands::Once => once_command(&cli).await?,
        Commands::Devices => devices_command(&cli)?,
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let filter = log_filter(cli, std::env::var("RUST_LOG").ok().as_deref());

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    Ok(())
}

/// `RUST_LOG` wins when it parses; otherwise the level comes from the flags.
fn log_filter(cli: &Cli, rust_log: Option<&str>) -> EnvFilter {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()))
}

fn print_banner() {
    println!("Tuya Exporter");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

fn credentials(cli: &Cli) -> Result<TuyaCredentials, ExporterError> {
    let required = |value: &Option<String>, name: &str| {
        value
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ExporterError::config_error(format!("{} is not set", name)))
    };

    Ok(TuyaCredentials::new(
        required(&cli.endpoint, "TUYA_ENDPOINT")?,
        required(&cli.access_id, "TUYA_ACCESS_ID")?,
        required(&cli.access_secret, "TUYA_ACCESS_SECRET")?,
    ))
}

fn load_config(cli: &Cli, credentials: TuyaCredentials) -> Result<ExporterConfig, ExporterError> {
    let mut config = ExporterConfig::new(credentials)
        .with_poll_interval(Duration::from_secs(cli.interval))
        .with_request_timeout(cli.request_timeout.map(Duration::from_secs));

    if let Some(path) = &cli.config {
        config = config.with_file(ConfigFile::load(path)?);
        info!("Loaded configuration from {}", path.display());
    }

    config.validate()?;
    Ok(config)
}

/// Build a client and establish the session; failure here is fatal.
async fn connect(config: &ExporterConfig) -> Result<TuyaClient, ExporterError> {
    let client = TuyaClient::new(config.credentials.clone(), config.request_timeout)?;
    client.connect().await?;
    Ok(client)
}

async fn serve_command(cli: &Cli) -> anyhow::Result<()> {
    print_banner();

    let config = load_config(cli, credentials(cli)?)?;
    info!("Starting Tuya exporter...");

    let client = connect(&config)
        .await
        .context("failed to authenticate with the Tuya cloud")?;
    let store = Arc::new(MetricStore::new()?);

    info!("Exporter configuration:");
    info!("  - Bind address: {}:{}", cli.host, cli.port);
    info!("  - Devices: {}", config.registry.len());
    info!("  - Poll interval: {}s", config.poll_interval.as_secs());
    match config.request_timeout {
        Some(timeout) => info!("  - Request timeout: {}s", timeout.as_secs()),
        None => info!("  - Request timeout: none"),
    }

    let poller = Poller::new(client, config.registry, config.scaling, store.clone());
    let reports = poller.into_stream(config.poll_interval);

    start_web_server(WebConfig::new(&cli.host, cli.port), store, reports).await?;

    Ok(())
}

async fn once_command(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli, credentials(cli)?)?;
    let client = connect(&config)
        .await
        .context("failed to authenticate with the Tuya cloud")?;
    let store = Arc::new(MetricStore::new()?);

    let poller = Poller::new(client, config.registry, config.scaling, store.clone());
    let report = poller.poll_cycle().await;
    info!(
        "Polled {} devices ({} failed)",
        report.total(),
        report.failed
    );

    print!("{}", store.render()?);
    Ok(())
}

fn devices_command(cli: &Cli) -> anyhow::Result<()> {
    // Network credentials are irrelevant for listing the registry.
    let placeholder = TuyaCredentials::new("", "", "");
    let mut config = ExporterConfig::new(placeholder);
    if let Some(path) = &cli.config {
        config = config.with_file(ConfigFile::load(path)?);
    }

    println!("Devices:");
    for device in config.registry.iter() {
        println!("  {}: {} ({})", device.key, device.name, device.device_id);
    }
    println!();

    println!("Scaling:");
    for rule in config.scaling.iter() {
        println!(
            "  {} -> {} (/ {})",
            rule.code,
            rule.kind.metric_name(),
            rule.divisor
        );
    }

    Ok(())
}
