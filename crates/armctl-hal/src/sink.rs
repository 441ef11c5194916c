//! Generic `ActuatorSink` trait for position-controlled arm hardware.
//!
//! The sink receives absolute joint targets keyed by joint name, never raw
//! vector indices, so a driver wired for a different motor ordering still
//! resolves each command correctly.  Concrete implementations are chosen at
//! construction time; the loop never probes a driver for optional
//! capabilities at call time.

use armctl_types::{ControlError, JointTargets, JointVector};

/// A manipulator arm (or simulated stand-in) that accepts absolute joint
/// targets.
///
/// Only the scheduler writes to a sink; no concurrent writers are permitted.
pub trait ActuatorSink: Send {
    /// Stable identifier for this sink, e.g. `"so101_follower"`.
    fn id(&self) -> &str;

    /// Command every named joint to its absolute target position.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Actuation`] when the command cannot be
    /// applied (e.g. bus timeout).  Failures are transient: the scheduler
    /// logs them and retries naturally with the next tick's command.
    fn apply(&mut self, target: &JointTargets) -> Result<(), ControlError>;

    /// Read the most recently known joint positions, in canonical order.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Actuation`] when the present position cannot
    /// be read.
    fn read_state(&self) -> Result<JointVector, ControlError>;
}
