//! In-process message transport
//!
//! Bounded tokio channels, one per destination, created lazily on first
//! publish or subscribe. Publishing to a full destination waits, which is
//! the backpressure path all the way from the producers into the engine.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::bus::{BusError, BusResult, Delivery, MessageBus, MessageStream, Receipt};

struct Channels {
    senders: HashMap<String, mpsc::Sender<Delivery>>,
    /// Receiver halves parked until their destination is subscribed
    parked: HashMap<String, mpsc::Receiver<Delivery>>,
}

/// Transport backed by process-local channels
pub struct InProcessBus {
    capacity: usize,
    next_receipt: AtomicU64,
    channels: Mutex<Channels>,
    acked: Mutex<HashSet<Receipt>>,
}

impl InProcessBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_receipt: AtomicU64::new(1),
            channels: Mutex::new(Channels {
                senders: HashMap::new(),
                parked: HashMap::new(),
            }),
            acked: Mutex::new(HashSet::new()),
        }
    }

    /// Whether a delivery has been acked; drives the at-least-once checks
    pub fn is_acked(&self, receipt: Receipt) -> bool {
        match self.acked.lock() {
            Ok(acked) => acked.contains(&receipt),
            Err(poisoned) => poisoned.into_inner().contains(&receipt),
        }
    }

    pub fn acked_count(&self) -> usize {
        match self.acked.lock() {
            Ok(acked) => acked.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Sender for a destination, creating the channel pair on first use.
    /// The lock scope stays synchronous; the actual send awaits outside it.
    fn sender_for(&self, destination: &str) -> mpsc::Sender<Delivery> {
        let mut channels = match self.channels.lock() {
            Ok(channels) => channels,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(sender) = channels.senders.get(destination) {
            return sender.clone();
        }

        debug!("creating destination '{destination}'");
        let (sender, receiver) = mpsc::channel(self.capacity);
        channels.senders.insert(destination.to_string(), sender.clone());
        channels.parked.insert(destination.to_string(), receiver);
        sender
    }
}

struct InProcessStream {
    receiver: mpsc::Receiver<Delivery>,
}

#[async_trait]
impl MessageStream for InProcessStream {
    async fn next(&mut self) -> BusResult<Delivery> {
        self.receiver.recv().await.ok_or(BusError::Disconnected)
    }
}

#[async_trait]
impl MessageBus for InProcessBus {
    async fn subscribe(&self, destination: &str) -> BusResult<Box<dyn MessageStream>> {
        // Make sure the channel pair exists even when nothing was published yet
        self.sender_for(destination);

        let mut channels = match self.channels.lock() {
            Ok(channels) => channels,
            Err(poisoned) => poisoned.into_inner(),
        };
        let receiver = channels
            .parked
            .remove(destination)
            .ok_or_else(|| BusError::AlreadySubscribed(destination.to_string()))?;

        debug!("consumer attached to destination '{destination}'");
        Ok(Box::new(InProcessStream { receiver }))
    }

    async fn publish(&self, destination: &str, body: String) -> BusResult<Receipt> {
        let receipt = Receipt(self.next_receipt.fetch_add(1, Ordering::Relaxed));
        let sender = self.sender_for(destination);

        trace!(receipt = receipt.0, "publishing to '{destination}'");
        sender
            .send(Delivery { body, receipt })
            .await
            .map_err(|_| BusError::Disconnected)?;
        Ok(receipt)
    }

    async fn ack(&self, receipt: Receipt) -> BusResult<()> {
        let mut acked = match self.acked.lock() {
            Ok(acked) => acked,
            Err(poisoned) => poisoned.into_inner(),
        };
        trace!(receipt = receipt.0, "acked");
        acked.insert(receipt);
        Ok(())
    }
}
