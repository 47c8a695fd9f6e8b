//! Error taxonomy for sweep execution.

use std::time::Duration;

use thiserror::Error;

/// Result type used by the collaborator traits in [`crate::interface`].
///
/// Drivers keep their own error types; anything that implements
/// `std::error::Error` boxes into a [`SweepError::Hardware`] at the
/// controller boundary.
pub type HardwareResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Errors that abort a sweep.
///
/// There is deliberately no retry policy: every fault propagates to the
/// caller of [`run`](crate::SweepController::run), which owns hardware-safe
/// shutdown (zero outputs, heaters off) before returning or re-raising.
///
/// A stop request from the operator is not an error; it surfaces as
/// [`SweepOutcome::Cancelled`](crate::SweepOutcome::Cancelled). A degenerate
/// derived-channel division is not an error either; the record carries `NaN`.
#[derive(Error, Debug)]
pub enum SweepError {
    /// Instrument, sensor or sink I/O failure. Fatal, no retry.
    #[error("hardware fault: {0}")]
    Hardware(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// Readback did not converge on the setpoint within the allotted time.
    #[error("setpoint {target} failed to settle within {elapsed:?}")]
    SettleTimeout {
        /// Target value the instrument was commanded to.
        target: f64,
        /// Wall-clock time spent polling before giving up.
        elapsed: Duration,
    },
}

/// Result type for sweep operations.
pub type SweepResult<T> = Result<T, SweepError>;
