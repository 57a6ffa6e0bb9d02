use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use klaxon::{
    bus::{MessageBus, memory::InProcessBus},
    config::{Config, StorageConfig, read_config_file},
    engine::{AlertProcessor, DispatcherHandle},
    event::parse_event,
    lifecycle,
    store::{AlarmStore, memory::MemoryStore},
    throttle::{DedupGate, TokenGate, start_refill},
};
#[cfg(feature = "storage-sqlite")]
use klaxon::store::sqlite::SqliteStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, instrument, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("klaxon", LevelFilter::TRACE),
        ("klaxond", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let model = lifecycle::from_name(&config.alarm_model)
        .ok_or_else(|| anyhow::anyhow!("unknown alarm model '{}'", config.alarm_model))?;

    let store = open_store(&config).await?;
    let bus: Arc<dyn MessageBus> = Arc::new(InProcessBus::new(config.queue_capacity));

    let mut refill = None;
    let notify_gate = if config.rate_limit.enabled {
        let gate = Arc::new(TokenGate::new(config.rate_limit.limit));
        refill = Some(start_refill(
            gate.clone(),
            Duration::from_secs(config.rate_limit.refill_secs),
        ));
        Some(gate)
    } else {
        None
    };

    let processor = Arc::new(AlertProcessor::new(
        store.clone(),
        model,
        bus.clone(),
        config.destinations.notify.clone(),
        config.destinations.audit.clone(),
        notify_gate,
        config.alert_timeout,
        config.heartbeat_timeout,
    ));

    let dispatcher = DispatcherHandle::spawn(
        bus.clone(),
        processor,
        config.destinations.inbound.clone(),
        config.workers,
        config.queue_capacity,
    );

    let gate = config.gate.enabled.then(|| {
        DedupGate::new(
            config.gate.mode,
            config.gate.threshold,
            chrono::Duration::seconds(config.gate.duration_secs as i64),
        )
    });

    let mut feeder = tokio::spawn(feed_stdin(
        bus.clone(),
        config.destinations.inbound.clone(),
        gate,
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            feeder.abort();
        }
        _ = &mut feeder => info!("input exhausted, shutting down"),
    }

    dispatcher.shutdown().await;
    if let Some(refill) = refill {
        refill.abort();
    }
    store.close().await?;

    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn AlarmStore>> {
    match config.storage.clone().unwrap_or(StorageConfig::None) {
        StorageConfig::None => {
            debug!("using in-memory alarm store");
            Ok(Arc::new(MemoryStore::new(config.history_limit)))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let store = SqliteStore::new(&path, config.history_limit).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => anyhow::bail!(
            "configuration asks for sqlite storage but the storage-sqlite feature is disabled"
        ),
    }
}

/// Publish newline-delimited events from stdin to the inbound destination
///
/// When the repeat gate is enabled, parseable events are checked against it
/// first. Unparseable lines are published as-is; rejecting them is the
/// listener's job.
#[instrument(skip_all)]
async fn feed_stdin(bus: Arc<dyn MessageBus>, destination: String, gate: Option<DedupGate>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("stdin: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        if let Some(gate) = &gate
            && let Ok(event) = parse_event(&line, chrono::Utc::now())
            && !gate.should_send(&event)
        {
            trace!("repeat gate suppressed an event from stdin");
            continue;
        }

        if let Err(e) = bus.publish(&destination, line).await {
            error!("publish failed: {e}");
            break;
        }
    }
    debug!("stdin drained");
}
