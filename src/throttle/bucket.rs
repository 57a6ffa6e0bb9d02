//! Leaky-bucket token gate
//!
//! Caps outbound notification volume independently of alarm semantics. The
//! bucket starts full; each send attempt takes a token and is denied when
//! none are left. A background ticker puts one token back per interval, up
//! to the limit, so a flood drains the bucket and then trickles out at the
//! refill rate.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// Bounded token counter, safe under concurrent acquire and refill
#[derive(Debug)]
pub struct TokenGate {
    limit: usize,
    tokens: AtomicUsize,
}

impl TokenGate {
    /// A full bucket holding `limit` tokens
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            tokens: AtomicUsize::new(limit),
        }
    }

    /// Take one token; false means the send is denied
    pub fn try_acquire(&self) -> bool {
        self.tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tokens| {
                tokens.checked_sub(1)
            })
            .is_ok()
    }

    /// Put one token back, capped at the limit
    pub fn refill(&self) {
        let _ = self
            .tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tokens| {
                if tokens < self.limit {
                    Some(tokens + 1)
                } else {
                    None
                }
            });
    }

    pub fn available(&self) -> usize {
        self.tokens.load(Ordering::Acquire)
    }
}

/// Spawn the refill ticker for a gate; abort the handle on shutdown
pub fn start_refill(gate: Arc<TokenGate>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("token refill ticker running every {every:?}");
        let mut interval = tokio::time::interval(every);
        // The first tick fires immediately; harmless on a full bucket
        loop {
            interval.tick().await;
            gate.refill();
        }
    })
}
