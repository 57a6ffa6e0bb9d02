pub mod alarm;
pub mod bus;
pub mod config;
pub mod engine;
pub mod event;
pub mod lifecycle;
pub mod severity;
pub mod status;
pub mod store;
pub mod throttle;
pub mod util;

pub use alarm::{Alarm, Heartbeat};
pub use event::{AlertEvent, HeartbeatEvent, InboundEvent};
pub use severity::{Severity, Trend};
pub use status::{Action, Status};
