//! Alert processing engine
//!
//! The engine owns the path from a raw inbound message body to a mutated
//! alarm record and its outbound copies. It is split into the stateless
//! per-event logic ([`AlertProcessor`]) and the concurrent plumbing around
//! it ([`DispatcherHandle`]).
//!
//! ## Architecture Overview
//!
//! ```text
//!  producers -> inbound destination (bus)
//!                      |
//!               +------v-------+
//!               |   Listener   |  sole queue writer; parses, stamps
//!               +------+-------+  receive time, acks malformed bodies
//!                      |
//!             bounded FIFO queue
//!                      |
//!        +------------+------------+
//!        |            |            |
//!   +----v----+  +----v----+  +----v----+
//!   | Worker 1|  | Worker 2|  | Worker N|   classify -> mutate -> ack
//!   +----+----+  +----+----+  +----+----+
//!        |            |            |
//!        +------------+------------+
//!                     |
//!              +------v------+
//!              | Alarm store |  atomic conditional mutations
//!              +------+------+
//!                     |
//!        notify + audit destinations (bus)
//! ```
//!
//! ## Classification
//!
//! Workers never classify by querying first; they *attempt* mutations in
//! strict order (duplicate, correlated, insert) and let the store's
//! conditional semantics decide. A lost race surfaces as `NotFound` or
//! `AlreadyExists` and simply restarts the attempt order, so two workers
//! racing on the same alarm group always converge without locks.

pub mod dispatch;
pub mod processor;

pub use dispatch::DispatcherHandle;
pub use processor::{AlertProcessor, EngineError, EngineResult, Outcome};
