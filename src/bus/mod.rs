//! Message transport between producers, the engine and the sinks
//!
//! Events enter the daemon through a named inbound destination and processed
//! alarms leave through outbound ones, so neither side ever calls the engine
//! directly. The transport contract is deliberately small:
//!
//! - **Named destinations**: opaque strings, created on first use
//! - **Single consumer**: each destination hands its deliveries to exactly
//!   one subscriber; a second subscribe fails
//! - **At-least-once**: every delivery carries a [`Receipt`] and stays
//!   outstanding until the consumer acks it. Consumers ack *after* the
//!   mutation a delivery causes, never before, so a crash mid-processing
//!   leaves the delivery unacked instead of lost.
//!
//! The in-process transport ([`InProcessBus`]) keeps unacked receipts
//! visible rather than redelivering them; a broker-backed transport would
//! redeliver on reconnect.

pub mod memory;

pub use memory::InProcessBus;

use async_trait::async_trait;

pub type BusResult<T> = Result<T, BusError>;

/// Errors surfaced by the message transport
#[derive(Debug)]
pub enum BusError {
    /// The transport (or one destination's channel) is gone; subscribers
    /// should back off and resubscribe
    Disconnected,
    /// The destination already has its single consumer
    AlreadySubscribed(String),
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "message transport disconnected"),
            Self::AlreadySubscribed(destination) => {
                write!(f, "destination '{destination}' already has a consumer")
            }
        }
    }
}

impl std::error::Error for BusError {}

/// Identity of one delivery, assigned at publish time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Receipt(pub u64);

/// One message as handed to a consumer
#[derive(Debug, Clone)]
pub struct Delivery {
    pub body: String,
    pub receipt: Receipt,
}

/// Consumer side of one destination
#[async_trait]
pub trait MessageStream: Send {
    /// Wait for the next delivery
    async fn next(&mut self) -> BusResult<Delivery>;
}

/// Producer/consumer transport handle shared across the daemon
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Claim the single consumer slot of a destination
    async fn subscribe(&self, destination: &str) -> BusResult<Box<dyn MessageStream>>;

    /// Enqueue a message, waiting when the destination is at capacity
    async fn publish(&self, destination: &str, body: String) -> BusResult<Receipt>;

    /// Mark a delivery as fully processed
    async fn ack(&self, receipt: Receipt) -> BusResult<()>;
}
