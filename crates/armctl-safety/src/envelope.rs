//! [`SafetyEnvelope`] – per-joint clamp on every proposed motion.
//!
//! For each joint `i`:
//!
//! ```text
//! raw_target[i]     = current[i] + delta[i]
//! target[i]         = min(max(raw_target[i], limits[i].min), limits[i].max)
//! adjusted_delta[i] = target[i] - current[i]
//! ```
//!
//! The clamp is total over all inputs — it never fails, and every
//! `target[i]` lies inside `[limits[i].min, limits[i].max]` no matter the
//! magnitude, sign, or finiteness of the proposed delta.  Every code path
//! that reaches the actuator must pass through [`SafetyEnvelope::clamp`]
//! first.
//!
//! # Example
//!
//! ```rust
//! use armctl_safety::envelope::SafetyEnvelope;
//! use armctl_types::{JointLimits, JointVector};
//!
//! let limits = JointLimits::new(vec![
//!     (-1.0, 1.0), (20.0, 35.0), (15.0, 25.0), (0.5, 2.0), (-0.5, 0.5), (1.0, 2.0),
//! ]).unwrap();
//! let envelope = SafetyEnvelope::new(limits);
//!
//! let current = JointVector::new(vec![0.9, 30.0, 20.0, 1.0, 0.0, 1.5]).unwrap();
//! let delta   = JointVector::new(vec![0.5, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
//!
//! let cmd = envelope.clamp(&current, &delta);
//! assert!((cmd.target.get(0) - 1.0).abs() < f32::EPSILON); // clamped, not 1.4
//! ```

use armctl_types::{JOINT_NAMES, JointLimits, JointVector};
use tracing::debug;

/// Result of one clamp: the bounded absolute target, the delta actually
/// granted, and which joints were adjusted.
#[derive(Debug, Clone)]
pub struct ClampedCommand {
    /// Absolute target, guaranteed within limits for every joint.
    pub target: JointVector,
    /// `target - current`: the motion that will actually be commanded.
    pub adjusted_delta: JointVector,
    /// Indices of joints whose proposal the envelope had to change.
    pub touched: Vec<usize>,
}

impl ClampedCommand {
    /// `true` when the proposal passed through unchanged.
    pub fn unchanged(&self) -> bool {
        self.touched.is_empty()
    }
}

/// Clamps proposed joint deltas against immutable per-joint absolute bounds.
///
/// Owns a read-only copy of the [`JointLimits`] loaded at startup.
#[derive(Debug, Clone)]
pub struct SafetyEnvelope {
    limits: JointLimits,
}

impl SafetyEnvelope {
    pub fn new(limits: JointLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &JointLimits {
        &self.limits
    }

    /// Clamp `current + delta` into the configured bounds, joint by joint.
    ///
    /// Total over all inputs.  A non-finite proposal (NaN/inf leaking out of
    /// a buggy policy) collapses to the held position, clamped into bounds.
    pub fn clamp(&self, current: &JointVector, delta: &JointVector) -> ClampedCommand {
        let mut target = Vec::with_capacity(JOINT_NAMES.len());
        let mut adjusted = Vec::with_capacity(JOINT_NAMES.len());
        let mut touched = Vec::new();

        for (i, (cur, d)) in current.iter().zip(delta.iter()).enumerate() {
            let (min, max) = self.limits.bound(i);
            let raw = cur + d;
            let bounded = if raw.is_finite() {
                raw.clamp(min, max)
            } else {
                cur.clamp(min, max)
            };
            if bounded != raw {
                touched.push(i);
                debug!(
                    joint = JOINT_NAMES[i],
                    proposed = raw,
                    bounded,
                    "clamp engaged"
                );
            }
            adjusted.push(bounded - cur);
            target.push(bounded);
        }

        // Lengths are guaranteed by the JointVector invariant.
        ClampedCommand {
            target: JointVector::new(target).unwrap_or_else(|_| JointVector::zeros()),
            adjusted_delta: JointVector::new(adjusted).unwrap_or_else(|_| JointVector::zeros()),
            touched,
        }
    }
}
