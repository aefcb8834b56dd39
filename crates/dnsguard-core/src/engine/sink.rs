//! Per-interface failure reporting

use std::fmt;

use crate::error::Error;

/// Which sweep operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Writing the desired servers to an interface
    Apply,
    /// Writing an interface's original servers back
    Revert,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Apply => f.write_str("apply"),
            FailureKind::Revert => f.write_str("revert"),
        }
    }
}

/// A failed operation on one interface
///
/// Failures are isolated: the sweep that produced one keeps going.
#[derive(Debug)]
pub struct InterfaceFailure {
    pub kind: FailureKind,
    pub interface_index: u32,
    pub setting_id: String,
    pub error: Error,
}

impl fmt::Display for InterfaceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed for interface {} ({}): {}",
            self.kind, self.interface_index, self.setting_id, self.error
        )
    }
}

/// Receiver of per-interface failures
///
/// Never invoked for successful operations. Called from whichever task ran
/// the failing operation, so implementations must be cheap and non-blocking.
///
/// Any `Fn(&InterfaceFailure) + Send + Sync` closure is an `ErrorSink`.
pub trait ErrorSink: Send + Sync {
    fn report(&self, failure: &InterfaceFailure);
}

impl<F> ErrorSink for F
where
    F: Fn(&InterfaceFailure) + Send + Sync,
{
    fn report(&self, failure: &InterfaceFailure) {
        self(failure)
    }
}
