//! relaylog CLI binary.
//!
//! Recording relay for HTTP APIs.
//!
//! # Commands
//!
//! - `serve` - Forward requests to the upstream and record every exchange
//! - `logs` - Show the most recently recorded exchanges

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use relaylog::{
    recorder::{NullRecorder, RecordQueue, Recorder, YamlRecorder},
    Config, ProxyServer, VERSION,
};

#[derive(Parser)]
#[command(name = "relaylog")]
#[command(version = VERSION)]
#[command(about = "relaylog - Recording relay for HTTP APIs", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/relaylog/config.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay
    Serve {
        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Listen host
        #[arg(long)]
        host: Option<String>,

        /// Upstream API base URL (or env TARGET_URL)
        #[arg(short, long)]
        target: Option<String>,

        /// Directory for recorded exchanges
        #[arg(short, long)]
        log_dir: Option<PathBuf>,

        /// Upstream timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Relay without recording
        #[arg(long)]
        no_record: bool,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,

        /// Emit operator logs as JSON
        #[arg(long)]
        json_logs: bool,
    },

    /// Show recent recorded exchanges
    Logs {
        /// Directory for recorded exchanges
        #[arg(short, long)]
        log_dir: Option<PathBuf>,

        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Output full entries as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?.apply_env();

    match cli.command {
        Commands::Serve {
            port,
            host,
            target,
            log_dir,
            timeout,
            no_record,
            verbose,
            json_logs,
        } => {
            let mut config = config;
            if let Some(port) = port {
                config.proxy.port = port;
            }
            if let Some(host) = host {
                config.proxy.host = host;
            }
            if let Some(target) = target {
                config.proxy.target_url = Some(target);
            }
            if let Some(dir) = log_dir {
                config.recorder.log_dir = dir;
            }
            if let Some(timeout) = timeout {
                config.proxy.timeout_secs = timeout;
            }
            if no_record {
                config.recorder.enabled = false;
            }

            init_tracing(verbose, json_logs);
            cmd_serve(config)
        },

        Commands::Logs {
            log_dir,
            limit,
            json,
        } => {
            let dir = log_dir.unwrap_or(config.recorder.log_dir);
            cmd_logs(dir, limit, json)
        },
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn cmd_serve(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let recorder: Arc<dyn Recorder> = if config.recorder.enabled {
        tracing::info!("Recording exchanges to {}", config.recorder.log_dir.display());
        Arc::new(YamlRecorder::new(&config.recorder.log_dir))
    } else {
        tracing::info!("Recording disabled");
        Arc::new(NullRecorder)
    };

    let records = RecordQueue::new(recorder, config.recorder.max_pending);
    let server = ProxyServer::with_queue(config.proxy, records)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async { server.run().await.map_err(|e| anyhow::anyhow!("{}", e)) })
}

fn cmd_logs(dir: PathBuf, limit: usize, json: bool) -> anyhow::Result<()> {
    let recorder = YamlRecorder::new(&dir);
    let entries = recorder.recent(limit)?;

    if json {
        let output: Vec<_> = entries
            .iter()
            .map(|stored| {
                serde_json::json!({
                    "file": stored.file_name,
                    "entry": stored.entry,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No exchanges recorded in {}", dir.display());
        return Ok(());
    }

    println!(
        "{:<27} {:<7} {:>6} {:<10} {:>8}  URL",
        "Timestamp", "Method", "Status", "Mode", "Time"
    );
    println!("{}", "-".repeat(90));

    for stored in &entries {
        let entry = &stored.entry;
        let mode = match (entry.response.is_streaming, entry.response.complete) {
            (true, true) => "stream",
            (true, false) => "partial",
            (false, _) => "buffered",
        };
        println!(
            "{:<27} {:<7} {:>6} {:<10} {:>6}ms  {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.request.method,
            entry.response.status,
            mode,
            entry.duration_ms,
            entry.request.url
        );
    }

    Ok(())
}
