//! Ingestion loop: listener and worker pool
//!
//! A single listener task owns the inbound subscription and is the only
//! writer into the bounded internal queue; N workers are its only readers.
//! This keeps the transport free of consumer-side concurrency while the
//! store mutations fan out.
//!
//! ## Acknowledgment points
//!
//! - Malformed bodies are acked (and dropped) by the listener: redelivery
//!   can never fix them.
//! - Valid events are acked by the worker *after* the store mutation
//!   succeeds, giving at-least-once processing; the engine's duplicate
//!   handling makes a redelivered event harmless.
//! - Events whose mutation keeps failing are left unacked as dead letters,
//!   never silently dropped.
//!
//! ## Shutdown
//!
//! `shutdown()` stops the listener's intake, pushes one shutdown marker per
//! worker and waits for the drain. The listener holds its subscription open
//! until every worker has exited.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::bus::{MessageBus, Receipt};
use crate::engine::processor::AlertProcessor;
use crate::event::{InboundEvent, parse_event};

/// First wait after a transport failure; doubles up to the ceiling
const RECONNECT_BACKOFF: Duration = Duration::from_millis(500);
const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Mutation retry schedule for retryable store failures
const STORE_RETRY_ATTEMPTS: u32 = 3;
const STORE_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// What travels on the internal queue
enum QueueItem {
    Event {
        event: InboundEvent,
        receipt: Receipt,
    },
    /// Drain marker, pushed once per worker at shutdown
    Shutdown,
}

/// Running ingestion loop: one listener, N workers
pub struct DispatcherHandle {
    shutdown_tx: watch::Sender<bool>,
    queue_tx: mpsc::Sender<QueueItem>,
    listener: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl DispatcherHandle {
    /// Spawn the listener and worker tasks
    pub fn spawn(
        bus: Arc<dyn MessageBus>,
        processor: Arc<AlertProcessor>,
        inbound_destination: String,
        worker_count: usize,
        queue_capacity: usize,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            workers = worker_count,
            queue = queue_capacity,
            "starting ingestion on '{inbound_destination}'"
        );

        let listener = tokio::spawn(listener_loop(
            Arc::clone(&bus),
            inbound_destination,
            queue_tx.clone(),
            shutdown_rx,
        ));

        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let workers = (1..=worker_count)
            .map(|n| {
                tokio::spawn(worker_loop(
                    format!("worker-{n}"),
                    Arc::clone(&queue_rx),
                    Arc::clone(&processor),
                    Arc::clone(&bus),
                ))
            })
            .collect();

        Self {
            shutdown_tx,
            queue_tx,
            listener,
            workers,
        }
    }

    /// Graceful drain: stop intake, finish queued events, then exit
    pub async fn shutdown(self) {
        info!("dispatcher draining");
        let _ = self.shutdown_tx.send(true);

        for _ in 0..self.workers.len() {
            if self.queue_tx.send(QueueItem::Shutdown).await.is_err() {
                break;
            }
        }
        for worker in self.workers {
            if let Err(err) = worker.await {
                warn!("worker exited abnormally: {err}");
            }
        }
        drop(self.queue_tx);
        if let Err(err) = self.listener.await {
            warn!("listener exited abnormally: {err}");
        }
        info!("dispatcher stopped");
    }
}

/// Sole writer into the internal queue
#[instrument(skip_all, fields(destination = %destination))]
async fn listener_loop(
    bus: Arc<dyn MessageBus>,
    destination: String,
    queue_tx: mpsc::Sender<QueueItem>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = RECONNECT_BACKOFF;

    'subscribe: loop {
        let mut stream = match bus.subscribe(&destination).await {
            Ok(stream) => {
                info!("listening for inbound events");
                backoff = RECONNECT_BACKOFF;
                stream
            }
            Err(err) => {
                warn!("subscribe failed: {err}; retrying in {backoff:?}");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {
                        backoff = (backoff * 2).min(RECONNECT_BACKOFF_MAX);
                        continue 'subscribe;
                    }
                    _ = shutdown_rx.changed() => break 'subscribe,
                }
            }
        };

        loop {
            tokio::select! {
                delivery = stream.next() => {
                    let delivery = match delivery {
                        Ok(delivery) => delivery,
                        Err(err) => {
                            warn!("transport failed: {err}; resubscribing in {backoff:?}");
                            tokio::time::sleep(backoff).await;
                            backoff = (backoff * 2).min(RECONNECT_BACKOFF_MAX);
                            continue 'subscribe;
                        }
                    };

                    match parse_event(&delivery.body, Utc::now()) {
                        Ok(event) => {
                            if queue_tx
                                .send(QueueItem::Event { event, receipt: delivery.receipt })
                                .await
                                .is_err()
                            {
                                error!("internal queue closed, stopping listener");
                                return;
                            }
                        }
                        Err(err) => {
                            // Redelivery cannot fix a malformed body, so it
                            // is acked and dropped right here
                            warn!("dropping malformed event: {err}");
                            if let Err(err) = bus.ack(delivery.receipt).await {
                                warn!("ack of malformed event failed: {err}");
                            }
                        }
                    }
                }
                _ = shutdown_rx.changed() => break 'subscribe,
            }
        }
    }

    // Keep the subscription alive until the workers have drained the queue
    debug!("intake stopped, waiting for workers to drain");
    queue_tx.closed().await;
    info!("listener disconnected");
}

/// Queue reader: classify, mutate, ack
async fn worker_loop(
    name: String,
    queue_rx: Arc<Mutex<mpsc::Receiver<QueueItem>>>,
    processor: Arc<AlertProcessor>,
    bus: Arc<dyn MessageBus>,
) {
    debug!("{name} started");
    loop {
        // Hold the receiver lock only while waiting for the next item
        let item = {
            let mut queue = queue_rx.lock().await;
            queue.recv().await
        };

        match item {
            Some(QueueItem::Event { event, receipt }) => {
                handle_event(&name, &processor, &bus, &event, receipt).await;
            }
            Some(QueueItem::Shutdown) | None => break,
        }
    }
    debug!("{name} stopped");
}

async fn handle_event(
    name: &str,
    processor: &AlertProcessor,
    bus: &Arc<dyn MessageBus>,
    event: &InboundEvent,
    receipt: Receipt,
) {
    let mut backoff = STORE_RETRY_BACKOFF;

    for attempt in 1..=STORE_RETRY_ATTEMPTS {
        match processor.process(event).await {
            Ok(outcome) => {
                debug!("{name} processed {} as {}", event.describe(), outcome.label());
                // Ack strictly after the mutation: a crash before this
                // point leaves the delivery unacked, not lost
                if let Err(err) = bus.ack(receipt).await {
                    warn!("{name} ack failed: {err}");
                }
                return;
            }
            Err(err) if err.is_retryable() && attempt < STORE_RETRY_ATTEMPTS => {
                warn!(
                    "{name} attempt {attempt} for {} failed: {err}; retrying in {backoff:?}",
                    event.describe()
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(err) => {
                // Dead letter: left unacked so the loss is visible upstream
                error!("{name} giving up on {}: {err}", event.describe());
                return;
            }
        }
    }
}
