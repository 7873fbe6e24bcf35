#![deny(unsafe_code)]

//! Submit files to a SAVDI scanning daemon and print verdicts.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use savdi_config::{AppConfig, ClientConfig};
use savdi_core::{Client, Response, ScanError};

/// Scan files with a SAVDI anti-virus daemon.
#[derive(Parser, Debug)]
#[command(name = "savdiscan", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "savdi.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print one JSON object per result instead of text.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Connection overrides; each one replaces the config file value.
#[derive(Args, Debug, Default)]
struct ConnectionArgs {
    /// Transport: unix, unixpacket, tcp, tcp4 or tcp6.
    #[arg(short, long)]
    network: Option<String>,

    /// Socket path or host:port of the daemon.
    #[arg(short, long)]
    address: Option<String>,

    /// Per-attempt connect timeout in seconds (0 = none).
    #[arg(long, value_name = "SECS")]
    connect_timeout: Option<u64>,

    /// Per-step command timeout in seconds (0 = none).
    #[arg(long, value_name = "SECS")]
    command_timeout: Option<u64>,

    /// Extra connect attempts after a timeout.
    #[arg(long, allow_negative_numbers = true)]
    retries: Option<i64>,

    /// Delay between connect attempts in milliseconds.
    #[arg(long, value_name = "MS")]
    retry_delay_ms: Option<u64>,
}

impl ConnectionArgs {
    fn apply(&self, client: &mut ClientConfig) {
        if let Some(network) = &self.network {
            client.network = network.clone();
        }
        if let Some(address) = &self.address {
            client.address = address.clone();
        }
        if let Some(secs) = self.connect_timeout {
            client.connect_timeout_secs = secs;
        }
        if let Some(secs) = self.command_timeout {
            client.command_timeout_secs = secs;
        }
        if let Some(retries) = self.retries {
            client.connect_retries = retries;
        }
        if let Some(ms) = self.retry_delay_ms {
            client.connect_retry_delay_ms = ms;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan files or directories.
    Scan {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Stream a file's bytes, or stdin when no file is given.
    Stream { file: Option<PathBuf> },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

/// Exit code for failed scans and for runs that cannot start.
const EXIT_FAILURE: u8 = 2;

/// Per-run tally, mapped to the process exit code.
#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    clean: usize,
    infected: usize,
    failed: usize,
}

impl Summary {
    fn record(&mut self, result: &Result<Response, ScanError>) {
        match result {
            Ok(resp) if resp.infected => self.infected += 1,
            Ok(_) => self.clean += 1,
            Err(_) => self.failed += 1,
        }
    }

    /// 2 if any scan failed, 1 if anything was infected, else 0.
    fn exit_status(&self) -> u8 {
        if self.failed > 0 {
            EXIT_FAILURE
        } else if self.infected > 0 {
            1
        } else {
            0
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    // RUST_LOG wins, then -v, then the config file
    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut stdout = std::io::stdout().lock();
    ExitCode::from(execute(&cli, &config, &mut stdout).await)
}

/// Load the config file and apply command-line overrides.
async fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = load_config(&cli.config).await?;
    cli.connection.apply(&mut config.client);
    config
        .validate()
        .context("invalid connection settings")?;
    Ok(config)
}

/// Run the subcommand and map the outcome to an exit status. Errors that
/// stop a run before or between scans count as failures, never as findings.
async fn execute(cli: &Cli, config: &AppConfig, out: &mut impl Write) -> u8 {
    match run(cli, config, out).await {
        Ok(status) => status,
        Err(e) => {
            eprintln!("Error: {e:#}");
            EXIT_FAILURE
        }
    }
}

async fn run(cli: &Cli, config: &AppConfig, out: &mut impl Write) -> Result<u8> {
    match &cli.command {
        Commands::Scan { paths } => {
            let client = Client::from_config(&config.client)?;
            let summary = cmd_scan(&client, paths, cli.json, out).await?;
            Ok(summary.exit_status())
        }
        Commands::Stream { file } => {
            let client = Client::from_config(&config.client)?;
            let summary = cmd_stream(&client, file.as_deref(), cli.json, out).await?;
            Ok(summary.exit_status())
        }
        Commands::Config { show } => {
            cmd_config(&cli.config, config, *show, out)?;
            Ok(0)
        }
    }
}

async fn cmd_scan(
    client: &Client,
    paths: &[PathBuf],
    json: bool,
    out: &mut impl Write,
) -> Result<Summary> {
    let mut summary = Summary::default();
    for path in paths {
        debug!(path = %path.display(), "scanning");
        let result = client.scan(path).await;
        summary.record(&result);
        report(&path.display().to_string(), &result, json, out)?;
    }
    info!(
        clean = summary.clean,
        infected = summary.infected,
        failed = summary.failed,
        "scan finished"
    );
    Ok(summary)
}

async fn cmd_stream(
    client: &Client,
    file: Option<&Path>,
    json: bool,
    out: &mut impl Write,
) -> Result<Summary> {
    let (label, result) = match file {
        Some(path) => {
            let result = match open_source(path).await {
                Ok(file) => client.scan_reader(file).await,
                Err(e) => Err(e),
            };
            (path.display().to_string(), result)
        }
        None => {
            // stdin has no length of its own; buffer it first
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context("failed to read stdin")?;
            ("-".to_string(), client.scan_reader(Cursor::new(buf)).await)
        }
    };

    let mut summary = Summary::default();
    summary.record(&result);
    report(&label, &result, json, out)?;
    Ok(summary)
}

async fn open_source(path: &Path) -> Result<tokio::fs::File, ScanError> {
    tokio::fs::File::open(path).await.map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ScanError::NotFound {
                path: path.to_path_buf(),
                source,
            }
        } else {
            ScanError::Io(source)
        }
    })
}

fn cmd_config(
    config_path: &Path,
    config: &AppConfig,
    show: bool,
    out: &mut impl Write,
) -> Result<()> {
    if show {
        let toml_str =
            toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        writeln!(out, "{toml_str}")?;
    } else {
        writeln!(out, "Configuration at '{}' is valid.", config_path.display())?;
    }
    Ok(())
}

/// Print one result. Failures go to stderr in text mode.
fn report(
    label: &str,
    result: &Result<Response, ScanError>,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    if json {
        let value = match result {
            Ok(resp) => serde_json::to_value(resp)?,
            Err(e) => serde_json::json!({ "filename": label, "error": e.to_string() }),
        };
        writeln!(out, "{value}")?;
        return Ok(());
    }

    match result {
        Ok(resp) => writeln!(out, "{}", format_response(resp))?,
        Err(e) => eprintln!("{label}: ERROR {e}"),
    }
    Ok(())
}

fn format_response(resp: &Response) -> String {
    if resp.infected {
        format!("{}: {} FOUND", resp.filename, resp.signature)
    } else {
        format!("{}: OK", resp.filename)
    }
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path).await.map_err(|e| anyhow::anyhow!(e))
    } else {
        debug!(path = %path.display(), "Config file not found, using defaults");
        Ok(AppConfig::default())
    }
}
