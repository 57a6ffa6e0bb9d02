//! Alarm status lifecycle states and operator actions

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operator/lifecycle state of an alarm record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Open,
    Ack,
    Closed,
    Expired,
    Blackout,
    Shelved,
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Open => "open",
            Status::Ack => "ack",
            Status::Closed => "closed",
            Status::Expired => "expired",
            Status::Blackout => "blackout",
            Status::Shelved => "shelved",
            Status::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit operator action applied against an alarm record
///
/// Actions take precedence over severity-driven status rules; see the
/// alarm model implementations in [`crate::lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Ack,
    Unack,
    Shelve,
    Unshelve,
    Close,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Ack => "ack",
            Action::Unack => "unack",
            Action::Shelve => "shelve",
            Action::Unshelve => "unshelve",
            Action::Close => "close",
        };
        f.write_str(s)
    }
}
