//! Suraksha CLI - Command-line interface for Suraksha
//!
//! Commands:
//! - features: Replay a recorded input-event trace and print DerivedFeatures
//! - queue: Inspect a file-backed pending delivery queue
//! - flush: Deliver a file-backed pending queue to the collector
//! - enqueue: Add a payload to a file-backed queue and attempt delivery

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use suraksha::config::Config;
use suraksha::delivery::{
    DeliveryQueue, FileStorage, FlushOutcome, HttpTransport, NetworkStatus, QueueStorage,
};
use suraksha::types::InputEvent;
use suraksha::{
    features_from_capture, replay_session, CollectError, DeliveryError, Payload, PRODUCER_NAME,
    SURAKSHA_VERSION,
};

/// Suraksha - Behavioral signal collector
#[derive(Parser)]
#[command(name = "suraksha")]
#[command(version = SURAKSHA_VERSION)]
#[command(about = "Replay interaction traces and manage the delivery queue", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an input-event trace and print DerivedFeatures
    Features {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Inspect the pending delivery queue
    Queue {
        /// Directory holding the persisted queue
        #[arg(long)]
        storage_dir: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Deliver pending payloads to the collector
    Flush {
        /// Directory holding the persisted queue
        #[arg(long)]
        storage_dir: PathBuf,

        /// Override the collector endpoint
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Queue a payload file and attempt delivery
    Enqueue {
        /// Payload JSON file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Directory holding the persisted queue
        #[arg(long)]
        storage_dir: PathBuf,

        /// Override the collector endpoint
        #[arg(long)]
        endpoint: Option<String>,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("suraksha=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), SurakshaCliError> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Features {
            input,
            input_format,
            pretty,
        } => cmd_features(&config, &input, input_format, pretty),

        Commands::Queue { storage_dir, json } => cmd_queue(&config, &storage_dir, json),

        Commands::Flush {
            storage_dir,
            endpoint,
        } => cmd_flush(&config, &storage_dir, endpoint),

        Commands::Enqueue {
            input,
            storage_dir,
            endpoint,
        } => cmd_enqueue(&config, &input, &storage_dir, endpoint),
    }
}

fn read_input(input: &Path) -> Result<String, SurakshaCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            warn!("reading from an interactive terminal; finish input with Ctrl-D");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn cmd_features(
    config: &Config,
    input: &Path,
    input_format: InputFormat,
    pretty: bool,
) -> Result<(), SurakshaCliError> {
    let input_data = read_input(input)?;

    let events = match input_format {
        InputFormat::Ndjson => InputEvent::parse_ndjson(&input_data)?,
        InputFormat::Json => InputEvent::parse_array(&input_data)?,
    };

    if events.is_empty() {
        return Err(SurakshaCliError::NoEvents);
    }

    let capture = replay_session(&events, &config.capture)?;
    let features = features_from_capture(&capture);

    let output = if pretty {
        serde_json::to_string_pretty(&features)?
    } else {
        serde_json::to_string(&features)?
    };
    println!("{}", output);
    Ok(())
}

fn cmd_queue(config: &Config, storage_dir: &Path, json: bool) -> Result<(), SurakshaCliError> {
    let storage = FileStorage::new(storage_dir);
    let key = &config.delivery.storage_key;
    let pending: Vec<Payload> = match storage.load(key)? {
        Some(raw) => serde_json::from_str(&raw)?,
        None => Vec::new(),
    };

    let report = QueueReport {
        producer: PRODUCER_NAME.to_string(),
        storage_key: key.clone(),
        pending: pending.len(),
        payloads: pending
            .iter()
            .map(|p| PendingSummary {
                session_id: p.session.session_id.clone(),
                task_id: p.session.task_id.clone(),
                label: p.label.clone(),
                timestamp_end: p.timestamp_end,
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Pending Queue");
        println!("=============");
        println!("Storage key: {}", report.storage_key);
        println!("Pending:     {}", report.pending);

        if !report.payloads.is_empty() {
            println!("\nPayloads (head first):");
            for (index, p) in report.payloads.iter().enumerate() {
                println!(
                    "  {}. session {} task {} label {} (ended {})",
                    index + 1,
                    p.session_id,
                    p.task_id,
                    p.label,
                    p.timestamp_end
                );
            }
        }
    }

    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime, SurakshaCliError> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

fn open_queue(
    config: &Config,
    storage_dir: &Path,
    endpoint: Option<String>,
) -> Result<DeliveryQueue, SurakshaCliError> {
    let mut delivery = config.delivery.clone();
    if let Some(endpoint) = endpoint {
        delivery = delivery.with_endpoint(endpoint);
    }
    let transport = HttpTransport::new(&delivery)?;
    info!(endpoint = %transport.endpoint(), "delivering to collector");
    Ok(DeliveryQueue::open(
        delivery,
        Arc::new(transport),
        Arc::new(FileStorage::new(storage_dir)),
        NetworkStatus::default(),
    ))
}

/// Flush until the queue drains or an attempt fails.
///
/// `queued` is the backlog before delivery started; the report counts what
/// left the queue, including attempts driven by the retry worker.
async fn drain(queue: &DeliveryQueue, queued: usize) -> FlushReport {
    loop {
        match queue.flush().await {
            FlushOutcome::Delivered => {}
            FlushOutcome::Busy => tokio::time::sleep(Duration::from_millis(20)).await,
            FlushOutcome::Empty | FlushOutcome::Failed | FlushOutcome::Offline => break,
        }
    }
    flush_report(queue, queued)
}

fn flush_report(queue: &DeliveryQueue, queued: usize) -> FlushReport {
    let pending = queue.len();
    FlushReport {
        delivered: queued.saturating_sub(pending),
        pending,
    }
}

fn cmd_flush(
    config: &Config,
    storage_dir: &Path,
    endpoint: Option<String>,
) -> Result<(), SurakshaCliError> {
    let rt = runtime()?;
    let report = rt.block_on(async {
        let queue = open_queue(config, storage_dir, endpoint)?;
        let queued = queue.len();
        let report = drain(&queue, queued).await;
        queue.shutdown().await;
        Ok::<_, SurakshaCliError>(report)
    })?;

    println!("{}", serde_json::to_string(&report)?);
    if report.pending > 0 {
        return Err(SurakshaCliError::DeliveryIncomplete(report.pending));
    }
    Ok(())
}

fn cmd_enqueue(
    config: &Config,
    input: &Path,
    storage_dir: &Path,
    endpoint: Option<String>,
) -> Result<(), SurakshaCliError> {
    let payload: Payload = serde_json::from_str(&read_input(input)?)?;
    let session_id = payload.session.session_id.clone();

    let rt = runtime()?;
    let report = rt.block_on(async {
        let queue = open_queue(config, storage_dir, endpoint)?;
        let queued = queue.len() + 1;
        let outcome = queue.send(payload).await;
        info!(%session_id, ?outcome, "payload queued");
        let report = match outcome {
            FlushOutcome::Failed | FlushOutcome::Offline => flush_report(&queue, queued),
            _ => drain(&queue, queued).await,
        };
        queue.shutdown().await;
        Ok::<_, SurakshaCliError>(report)
    })?;

    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

// Error handling

#[derive(Debug)]
enum SurakshaCliError {
    Io(io::Error),
    Collect(CollectError),
    Json(serde_json::Error),
    Delivery(DeliveryError),
    NoEvents,
    DeliveryIncomplete(usize),
}

impl From<io::Error> for SurakshaCliError {
    fn from(e: io::Error) -> Self {
        SurakshaCliError::Io(e)
    }
}

impl From<CollectError> for SurakshaCliError {
    fn from(e: CollectError) -> Self {
        SurakshaCliError::Collect(e)
    }
}

impl From<suraksha::StorageError> for SurakshaCliError {
    fn from(e: suraksha::StorageError) -> Self {
        SurakshaCliError::Collect(e.into())
    }
}

impl From<serde_json::Error> for SurakshaCliError {
    fn from(e: serde_json::Error) -> Self {
        SurakshaCliError::Json(e)
    }
}

impl From<DeliveryError> for SurakshaCliError {
    fn from(e: DeliveryError) -> Self {
        SurakshaCliError::Delivery(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<SurakshaCliError> for CliError {
    fn from(e: SurakshaCliError) -> Self {
        match e {
            SurakshaCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            SurakshaCliError::Collect(CollectError::ConfigError(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Fix the configuration file passed with --config".to_string()),
            },
            SurakshaCliError::Collect(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure input events are tagged with a snake_case \"type\"".to_string()),
            },
            SurakshaCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            SurakshaCliError::Delivery(e) => CliError {
                code: "DELIVERY_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the endpoint URL".to_string()),
            },
            SurakshaCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            SurakshaCliError::DeliveryIncomplete(pending) => CliError {
                code: "DELIVERY_INCOMPLETE".to_string(),
                message: format!("{} payloads still pending", pending),
                hint: Some("Payloads stay queued; run 'suraksha flush' again later".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct QueueReport {
    producer: String,
    storage_key: String,
    pending: usize,
    payloads: Vec<PendingSummary>,
}

#[derive(serde::Serialize)]
struct PendingSummary {
    session_id: String,
    task_id: String,
    label: String,
    timestamp_end: i64,
}

#[derive(serde::Serialize)]
struct FlushReport {
    delivered: usize,
    pending: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use suraksha::delivery::{MemoryStorage, Transport};
    use suraksha::{DeliveryConfig, DerivedFeatures, EnvironmentBlobs, SessionCapture, SessionMeta};

    struct AcceptingTransport;

    #[async_trait]
    impl Transport for AcceptingTransport {
        async fn post_json(&self, _body: Vec<u8>) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    fn payload(id: &str) -> Payload {
        Payload::assemble(
            SessionMeta::with_session_id(id, "task", true),
            EnvironmentBlobs::default(),
            SessionCapture::default(),
            DerivedFeatures::default(),
            None,
            0,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_report_counts_worker_deliveries() {
        let config = DeliveryConfig::default();
        let storage = MemoryStorage::new();
        storage.insert(
            &config.storage_key,
            serde_json::to_string(&vec![payload("a"), payload("b")]).unwrap(),
        );

        let queue = DeliveryQueue::open(
            config,
            Arc::new(AcceptingTransport),
            Arc::new(storage),
            NetworkStatus::default(),
        );
        let queued = queue.len();

        // The reloaded backlog gets an immediate attempt from the retry worker
        tokio::task::yield_now().await;
        let report = drain(&queue, queued).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.pending, 0);
        queue.shutdown().await;
    }
}
