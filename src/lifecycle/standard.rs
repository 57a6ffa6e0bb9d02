//! Default alarm lifecycle rules
//!
//! Ranking and trend come straight from [`crate::severity`]. Severity-driven
//! transitions, in order of precedence: a normal-rank severity closes the
//! alarm; blackout and shelved are sticky until explicitly lifted; any new
//! severity reopens a previously closed, expired or blacked-out alarm; an
//! escalation opens; otherwise the prior status is kept.

use crate::alarm::Alarm;
use crate::severity::{self, Severity, Trend};
use crate::status::{Action, Status};

use super::AlarmModel;

pub struct StandardModel;

impl AlarmModel for StandardModel {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn default_normal_severity(&self) -> Severity {
        Severity::Normal
    }

    fn trend(&self, previous: Severity, current: Severity) -> Trend {
        severity::trend(previous, current)
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

        // transitions driven by operator actions
        if let Some(action) = action {
            return match action {
                Action::Unack => (current_severity, Status::Open),
                Action::Shelve => (current_severity, Status::Shelved),
                Action::Unshelve => (current_severity, Status::Open),
                Action::Ack => (current_severity, Status::Ack),
                Action::Close => (self.default_normal_severity(), Status::Closed),
            };
        }

        // transitions driven by severity or status changes
        if current_severity.is_normal_rank() {
            return (current_severity, Status::Closed);
        }
        if matches!(current_status, Status::Blackout | Status::Shelved) {
            return (current_severity, current_status);
        }
        if matches!(
            previous_status,
            Status::Blackout | Status::Closed | Status::Expired
        ) {
            return (current_severity, Status::Open);
        }
        if self.trend(previous_severity, current_severity) == Trend::MoreSevere {
            return (current_severity, Status::Open);
        }

        (current_severity, previous_status)
    }

    fn is_suppressed(&self, alarm: &Alarm) -> bool {
        alarm.status == Status::Blackout
    }
}
