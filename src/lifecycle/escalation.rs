//! Escalation-driven lifecycle rules
//!
//! Variant for deployments that treat security events as the highest
//! severity and only want alarms reopened when severity actually escalates:
//! informational and debug events always open, a de-escalation never
//! reopens a closed alarm, and shelved records are suppressed alongside
//! blackouts.

use crate::alarm::Alarm;
use crate::severity::{Severity, Trend};
use crate::status::{Action, Status};

use super::AlarmModel;

pub struct EscalationModel;

/// Same table as the default model except security outranks critical
fn rank(severity: Severity) -> u8 {
    match severity {
        Severity::Security => 0,
        other => other.rank(),
    }
}

impl AlarmModel for EscalationModel {
    fn name(&self) -> &'static str {
        "escalation"
    }

    fn default_normal_severity(&self) -> Severity {
        Severity::Normal
    }

    fn trend(&self, previous: Severity, current: Severity) -> Trend {
        if rank(current) < rank(previous) {
            Trend::MoreSevere
        } else if rank(current) > rank(previous) {
            Trend::LessSevere
        } else {
            Trend::NoChange
        }
    }

    fn transition(
        &self,
        previous_severity: Severity,
        current_severity: Severity,
        previous_status: Option<Status>,
        current_status: Option<Status>,
        action: Option<Action>,
    ) -> (Severity, Status) {
        let previous_status = previous_status.unwrap_or(Status::Open);
        let current_status = current_status.unwrap_or(Status::Unknown);

        if let Some(action) = action {
            return match action {
                Action::Unack => (current_severity, Status::Open),
                Action::Shelve => (current_severity, Status::Shelved),
                Action::Unshelve => (current_severity, Status::Open),
                Action::Ack => (current_severity, Status::Ack),
                Action::Close => (self.default_normal_severity(), Status::Closed),
            };
        }

        if matches!(
            current_severity,
            Severity::Informational | Severity::Debug
        ) {
            return (current_severity, Status::Open);
        }
        if current_severity.is_normal_rank() {
            return (current_severity, Status::Closed);
        }
        if matches!(current_status, Status::Blackout | Status::Shelved) {
            return (current_severity, current_status);
        }
        // only an escalation (re)opens; de-escalations keep the prior status
        if self.trend(previous_severity, current_severity) == Trend::MoreSevere {
            return (current_severity, Status::Open);
        }

        (current_severity, previous_status)
    }

    fn is_suppressed(&self, alarm: &Alarm) -> bool {
        matches!(alarm.status, Status::Blackout | Status::Shelved)
    }
}
