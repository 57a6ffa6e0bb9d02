//! Producer-side send gates
//!
//! Two unrelated primitives that both answer "may I send this now?":
//!
//! - [`DedupGate`]: repeat suppression keyed by alarm identity. A producer
//!   consults it before emitting an event; repeats of an unchanged value
//!   pass only every Nth time or after a quiet period. Complementary to the
//!   engine's duplicate handling, which suppresses forwarding but still
//!   counts every repeat.
//! - [`TokenGate`]: a leaky-bucket counter capping outbound notification
//!   volume regardless of alarm semantics, refilled by a background ticker.

pub mod bucket;
pub mod dedup;

pub use bucket::{TokenGate, start_refill};
pub use dedup::{DedupGate, GateMode};
