//! Generic `PolicyEngine` trait – one decision per tick.
//!
//! The scheduler only ever talks to this trait, so learned and rule-based
//! policies can be swapped at construction without touching loop logic.
//! Whether to execute a single step or a whole chunk before re-querying is
//! the caller's choice, not the engine's.

use armctl_types::{CanonicalObservation, ControlError, JointVector, RawAction};

/// A decision function mapping a canonical observation to a normalized
/// action (or chunk of future actions).
///
/// Calls are blocking and synchronous from the loop's perspective; an
/// in-flight inference cannot be preempted mid-call.
pub trait PolicyEngine: Send {
    /// Short human-readable engine name for startup logs, e.g. `"act"`.
    fn name(&self) -> &str;

    /// Produce the action for the current tick.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Inference`] when the decision function fails;
    /// the scheduler substitutes a zero delta and the tick proceeds.
    fn get_action(&mut self, obs: &CanonicalObservation) -> Result<RawAction, ControlError>;

    /// Produce the full chunk of future steps from one inference call, in
    /// execution order.  Used by the chunked execution mode, which plays
    /// the buffered steps on successive ticks before re-querying.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Inference`] when the decision function fails.
    fn get_action_sequence(
        &mut self,
        obs: &CanonicalObservation,
    ) -> Result<Vec<JointVector>, ControlError>;
}
