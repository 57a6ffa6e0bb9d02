//! Pluggable alarm lifecycle models
//!
//! A model owns the severity ranking and the status transition rules. The
//! engine is written against the [`AlarmModel`] trait and receives one
//! implementation at startup, so deployments can swap rule sets without
//! touching classification. Two models ship:
//!
//! - [`StandardModel`]: default ITU-style ranks; any new severity reopens a
//!   closed alarm
//! - [`EscalationModel`]: security ranked most severe; only an escalation
//!   reopens

pub mod escalation;
pub mod standard;

pub use escalation::EscalationModel;
pub use standard::StandardModel;

use std::sync::Arc;

use crate::alarm::Alarm;
use crate::severity::{Severity, Trend};
use crate::status::{Action, Status};

/// Severity ranking and status transition strategy
pub trait AlarmModel: Send + Sync {
    /// Model name as referenced from configuration
    fn name(&self) -> &'static str;

    /// Severity a closed alarm settles at
    fn default_normal_severity(&self) -> Severity;

    /// Directional comparison in this model's rank table
    fn trend(&self, previous: Severity, current: Severity) -> Trend;

    /// Next `(severity, status)` for an alarm.
    ///
    /// `previous_status` is the stored record's status before this event
    /// (defaults to open); `current_status` is an explicit status carried by
    /// the incoming event, e.g. a blackout marker stamped upstream (defaults
    /// to unknown). Operator actions take precedence over severity-driven
    /// rules.
    fn transition(
        &self,
        previous_severity: Severity,
        current_severity: Severity,
        previous_status: Option<Status>,
        current_status: Option<Status>,
        action: Option<Action>,
    ) -> (Severity, Status);

    /// Whether notification fan-out should be suppressed for this record
    fn is_suppressed(&self, alarm: &Alarm) -> bool;
}

/// Look up a model by its configured name
pub fn from_name(name: &str) -> Option<Arc<dyn AlarmModel>> {
    match name {
        "standard" => Some(Arc::new(StandardModel)),
        "escalation" => Some(Arc::new(EscalationModel)),
        _ => None,
    }
}
