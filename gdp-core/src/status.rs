// SPDX-License-Identifier: MIT OR Apache-2.0

//! Severity classification of operation outcomes.
//!
//! Every status produced by the engine or the storage tier maps onto one of these levels.
//! Outcomes at [`Severity::Warn`] or above are failures the caller has to see, everything below
//! is informational and may be dropped after logging.
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Ok,
    Info,
    Warn,
    Error,
    Severe,
    Abort,
}

impl Severity {
    /// Returns `true` if an outcome of this severity must be surfaced as a failure.
    pub fn is_failure(&self) -> bool {
        *self >= Severity::Warn
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Ok => "OK",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Severe => "SEVERE",
            Severity::Abort => "ABORT",
        };
        write!(f, "{label}")
    }
}
