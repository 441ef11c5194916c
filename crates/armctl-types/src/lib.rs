//! `armctl-types` – shared data model for the arm control stack.
//!
//! Defines the per-tick entities that flow through the control loop
//! ([`Observation`] → [`CanonicalObservation`] → [`RawAction`] →
//! [`PhysicalDelta`]), the long-lived read-only [`JointLimits`], and the
//! [`ControlError`] taxonomy every other crate reports through.

use std::collections::{BTreeMap, HashMap};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Number of joints on the reference arm.
pub const JOINT_COUNT: usize = 6;

/// Stable, externally defined joint ordering.  Every [`JointVector`] index
/// refers to the joint at the same position in this list.
pub const JOINT_NAMES: [&str; JOINT_COUNT] = [
    "shoulder_pan",
    "shoulder_lift",
    "elbow_flex",
    "wrist_flex",
    "wrist_roll",
    "gripper",
];

/// Global error type spanning configuration faults, sensor failures,
/// inference failures, and actuator rejections.
///
/// Only [`ControlError::Config`] is fatal; the loop converts every other
/// variant into a safe per-tick default and keeps running.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ControlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Observation source failure: {0}")]
    Observation(String),

    #[error("Inference failure in {stage}: {details}")]
    Inference { stage: String, details: String },

    #[error("Actuation failure on {component}: {details}")]
    Actuation { component: String, details: String },
}

/// Absolute joint targets keyed by joint name, as consumed by an actuator.
///
/// Built from a [`JointVector`] via [`JointVector::to_targets`] so sinks
/// never depend on vector index order.
pub type JointTargets = BTreeMap<String, f32>;

/// Fixed-length ordered sequence of scalar joint values.
///
/// Invariant: every `JointVector` in the system has exactly [`JOINT_COUNT`]
/// elements; [`JointVector::new`] is the only way to construct one from
/// external data and enforces the length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointVector(Vec<f32>);

impl JointVector {
    /// Construct from raw values, validating the element count.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Config`] when `values` does not have exactly
    /// [`JOINT_COUNT`] elements.  Fatal at startup; recoverable per tick.
    pub fn new(values: Vec<f32>) -> Result<Self, ControlError> {
        if values.len() != JOINT_COUNT {
            return Err(ControlError::Config(format!(
                "joint vector has {} elements, expected {JOINT_COUNT}",
                values.len()
            )));
        }
        Ok(Self(values))
    }

    /// An all-zero joint vector.
    pub fn zeros() -> Self {
        Self(vec![0.0; JOINT_COUNT])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Value for joint `i`.  Panics on out-of-range indices, which cannot
    /// occur for indices below [`JOINT_COUNT`].
    pub fn get(&self, i: usize) -> f32 {
        self.0[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.0.iter().copied()
    }

    /// `true` when every element is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    /// Pair each value with its joint name in canonical order.
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        JOINT_NAMES.iter().copied().zip(self.0.iter().copied())
    }

    /// Build the name-keyed absolute target map the actuator consumes.
    pub fn to_targets(&self) -> JointTargets {
        self.named().map(|(name, v)| (name.to_string(), v)).collect()
    }
}

/// A joint-space delta in physical units, ready for the safety envelope.
pub type PhysicalDelta = JointVector;

/// A raw camera frame: height x width x 3 RGB bytes, row-major.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Expected byte length for the declared dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// One camera + joint-state sample.  Created fresh each tick by the
/// observation source and owned solely by that tick.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Raw frames keyed by camera name (e.g. `"image_top"`, `"image_wrist"`).
    pub images: HashMap<String, RawFrame>,
    pub joint_state: JointVector,
}

impl Observation {
    /// Cheap content digest used only for diagnostic correlation in
    /// [`ControlStep`] records.  Hashes the joint state bits and per-camera
    /// frame dimensions, not the pixel payload.
    pub fn digest(&self) -> u64 {
        let mut h = DefaultHasher::new();
        for v in self.joint_state.iter() {
            v.to_bits().hash(&mut h);
        }
        let mut names: Vec<&String> = self.images.keys().collect();
        names.sort();
        for name in names {
            let frame = &self.images[name];
            name.hash(&mut h);
            frame.width.hash(&mut h);
            frame.height.hash(&mut h);
            frame.data.len().hash(&mut h);
        }
        h.finish()
    }
}

/// A normalized image in CHW layout, as the decision function expects.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl ImageTensor {
    /// An all-zero tensor of the given shape, substituted for a missing
    /// camera channel.
    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
            data: vec![0.0; channels * height * width],
        }
    }

    /// Value at `(channel, row, col)`.
    pub fn at(&self, c: usize, y: usize, x: usize) -> f32 {
        self.data[(c * self.height + y) * self.width + x]
    }
}

/// Normalized observation in the canonical form the decision function
/// consumes.  Derived each tick, never retained.
#[derive(Debug, Clone)]
pub struct CanonicalObservation {
    pub images: HashMap<String, ImageTensor>,
    pub state: JointVector,
}

/// Decision-function output in normalized policy units: either a single
/// step or an ordered chunk of future steps from one inference call.
#[derive(Debug, Clone)]
pub enum RawAction {
    Single(JointVector),
    Chunk(Vec<JointVector>),
}

/// Immutable per-joint `(min, max)` absolute bounds, loaded once at startup
/// and shared read-only across all ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointLimits {
    bounds: Vec<(f32, f32)>,
}

impl JointLimits {
    /// Validate and freeze per-joint bounds, in canonical joint order.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Config`] when the bound count does not match
    /// [`JOINT_COUNT`], any bound is non-finite, or any `min > max`.
    pub fn new(bounds: Vec<(f32, f32)>) -> Result<Self, ControlError> {
        if bounds.len() != JOINT_COUNT {
            return Err(ControlError::Config(format!(
                "{} joint limits supplied, expected {JOINT_COUNT}",
                bounds.len()
            )));
        }
        for (i, (min, max)) in bounds.iter().enumerate() {
            if !min.is_finite() || !max.is_finite() {
                return Err(ControlError::Config(format!(
                    "limits for {} are not finite",
                    JOINT_NAMES[i]
                )));
            }
            if min > max {
                return Err(ControlError::Config(format!(
                    "limits for {} are inverted: min {min} > max {max}",
                    JOINT_NAMES[i]
                )));
            }
        }
        Ok(Self { bounds })
    }

    /// `(min, max)` bound for joint `i`.
    pub fn bound(&self, i: usize) -> (f32, f32) {
        self.bounds[i]
    }

    /// `true` when `value` lies within the bound for joint `i` (inclusive).
    pub fn contains(&self, i: usize, value: f32) -> bool {
        let (min, max) = self.bounds[i];
        value >= min && value <= max
    }
}

/// Per-tick diagnostic record.  Logged at debug level and discarded; not
/// required for correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlStep {
    pub id: Uuid,
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub observation_digest: u64,
    pub applied_delta: JointVector,
    pub clamp_adjustment: JointVector,
    pub latency_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joint_vector_rejects_wrong_length() {
        let result = JointVector::new(vec![0.0; 5]);
        assert!(matches!(result, Err(ControlError::Config(_))));
    }

    #[test]
    fn joint_vector_accepts_exact_length() {
        let jv = JointVector::new(vec![0.0, 25.0, 20.0, 1.0, 0.0, 1.5]).unwrap();
        assert!((jv.get(1) - 25.0).abs() < f32::EPSILON);
    }

    #[test]
    fn joint_vector_serde_roundtrip() {
        let jv = JointVector::new(vec![0.1, -0.2, 0.3, -0.4, 0.5, -0.6]).unwrap();
        let json = serde_json::to_string(&jv).unwrap();
        let back: JointVector = serde_json::from_str(&json).unwrap();
        assert_eq!(jv, back);
    }

    #[test]
    fn to_targets_uses_canonical_names() {
        let jv = JointVector::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let targets = jv.to_targets();
        assert_eq!(targets.len(), JOINT_COUNT);
        assert!((targets["shoulder_pan"] - 1.0).abs() < f32::EPSILON);
        assert!((targets["gripper"] - 6.0).abs() < f32::EPSILON);
    }

    #[test]
    fn is_zero_detects_zero_vector() {
        assert!(JointVector::zeros().is_zero());
        let jv = JointVector::new(vec![0.0, 0.0, 0.0, 0.0, 0.0, 1e-6]).unwrap();
        assert!(!jv.is_zero());
    }

    #[test]
    fn joint_limits_reject_wrong_count() {
        let result = JointLimits::new(vec![(-1.0, 1.0); 4]);
        assert!(matches!(result, Err(ControlError::Config(_))));
    }

    #[test]
    fn joint_limits_reject_inverted_bound() {
        let mut bounds = vec![(-1.0, 1.0); JOINT_COUNT];
        bounds[2] = (5.0, -5.0);
        let result = JointLimits::new(bounds);
        assert!(matches!(result, Err(ControlError::Config(_))));
    }

    #[test]
    fn joint_limits_reject_non_finite_bound() {
        let mut bounds = vec![(-1.0, 1.0); JOINT_COUNT];
        bounds[0] = (f32::NEG_INFINITY, 1.0);
        assert!(JointLimits::new(bounds).is_err());
    }

    #[test]
    fn joint_limits_contains_is_inclusive() {
        let limits = JointLimits::new(vec![(-1.0, 1.0); JOINT_COUNT]).unwrap();
        assert!(limits.contains(0, 1.0));
        assert!(limits.contains(0, -1.0));
        assert!(!limits.contains(0, 1.0001));
    }

    #[test]
    fn observation_digest_is_deterministic() {
        let obs = Observation {
            images: HashMap::new(),
            joint_state: JointVector::zeros(),
        };
        assert_eq!(obs.digest(), obs.digest());
    }

    #[test]
    fn observation_digest_changes_with_state() {
        let a = Observation {
            images: HashMap::new(),
            joint_state: JointVector::zeros(),
        };
        let b = Observation {
            images: HashMap::new(),
            joint_state: JointVector::new(vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0]).unwrap(),
        };
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn image_tensor_zeros_has_expected_shape() {
        let t = ImageTensor::zeros(3, 240, 320);
        assert_eq!(t.data.len(), 3 * 240 * 320);
        assert!(t.at(2, 239, 319).abs() < f32::EPSILON);
    }

    #[test]
    fn control_error_display() {
        let err = ControlError::Inference {
            stage: "forward".to_string(),
            details: "shape mismatch".to_string(),
        };
        assert!(err.to_string().contains("forward"));

        let err2 = ControlError::Actuation {
            component: "gripper".to_string(),
            details: "bus timeout".to_string(),
        };
        assert!(err2.to_string().contains("gripper"));
    }

    #[test]
    fn control_step_serde_roundtrip() {
        let step = ControlStep {
            id: Uuid::new_v4(),
            tick: 42,
            timestamp: Utc::now(),
            observation_digest: 7,
            applied_delta: JointVector::zeros(),
            clamp_adjustment: JointVector::zeros(),
            latency_ms: 3.5,
        };
        let json = serde_json::to_string(&step).unwrap();
        let back: ControlStep = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tick, 42);
        assert_eq!(back.id, step.id);
    }
}
