//! Generic `ObservationSource` trait for camera + joint-state acquisition.
//!
//! Implementations must return promptly: the control loop never blocks
//! waiting for a late sample.  Returning `Ok(None)` means "no new data this
//! tick" and is tolerated by the scheduler, which synthesizes a default
//! observation instead.

use armctl_types::{ControlError, Observation};

/// A device (or device group) that produces one [`Observation`] per tick.
pub trait ObservationSource: Send {
    /// Stable identifier for this source, e.g. `"so101_follower"`.
    fn id(&self) -> &str;

    /// Return the newest available observation, or `None` when nothing new
    /// has arrived since the previous poll.
    ///
    /// Must be non-blocking or bounded-wait.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Observation`] on a sensor read failure.  The
    /// scheduler treats this the same as `None`: the tick proceeds on a
    /// synthesized default.
    fn poll(&mut self) -> Result<Option<Observation>, ControlError>;
}
