//! [`HeuristicFallback`] – rule-based policy for runs without a usable
//! learned model.
//!
//! Behavior per joint, in normalized units:
//!
//! - If the joint sits outside its comfort band (|z| above the band), emit
//!   a fixed corrective nudge back toward the calibration center.
//! - Otherwise emit a small random exploration step scaled per joint, so
//!   the arm visibly moves during bench runs without drifting away from
//!   its working region.
//! - The gripper only explores occasionally.
//!
//! The fallback never reads camera data: it is a pure function of joint
//! state (plus its RNG), which keeps it usable when perception is degraded.

use armctl_types::{CanonicalObservation, ControlError, JOINT_COUNT, JointVector, RawAction};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::engine::PolicyEngine;

/// Per-joint exploration magnitude in normalized units.  Derived from the
/// physical per-tick step sizes the arm tolerates, divided by the action
/// calibration scale for each joint.
const EXPLORATION_SCALE: [f32; JOINT_COUNT] = [1.0, 0.4, 0.6, 1.0, 0.5, 2.0];

/// |z| beyond which a joint is considered out of its comfort band.
const COMFORT_BAND: f32 = 1.0;

/// Magnitude of the corrective nudge back toward center, normalized.
const CORRECTION: f32 = 0.4;

/// Probability the gripper takes an exploration step on a given tick.
const GRIPPER_EXPLORE_PROB: f64 = 0.3;

const GRIPPER_INDEX: usize = 5;

const DEFAULT_CHUNK_LEN: usize = 20;

/// Rule-based stand-in for the learned policy.
pub struct HeuristicFallback {
    rng: StdRng,
    chunk_len: usize,
}

impl HeuristicFallback {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            chunk_len: DEFAULT_CHUNK_LEN,
        }
    }

    /// Deterministic variant for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            chunk_len: DEFAULT_CHUNK_LEN,
        }
    }

    pub fn with_chunk_len(mut self, chunk_len: usize) -> Self {
        self.chunk_len = chunk_len.max(1);
        self
    }

    fn step(&mut self, state: &JointVector) -> JointVector {
        let mut deltas = vec![0.0f32; JOINT_COUNT];
        for (i, delta) in deltas.iter_mut().enumerate() {
            let z = state.get(i);
            if z.abs() > COMFORT_BAND {
                *delta = -CORRECTION * z.signum();
                continue;
            }
            if i == GRIPPER_INDEX && !self.rng.random_bool(GRIPPER_EXPLORE_PROB) {
                continue;
            }
            let scale = EXPLORATION_SCALE[i];
            *delta = self.rng.random_range(-scale..scale);
        }
        // Length is JOINT_COUNT by construction.
        JointVector::new(deltas).unwrap_or_else(|_| JointVector::zeros())
    }
}

impl Default for HeuristicFallback {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyEngine for HeuristicFallback {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn get_action(&mut self, obs: &CanonicalObservation) -> Result<RawAction, ControlError> {
        Ok(RawAction::Single(self.step(&obs.state)))
    }

    fn get_action_sequence(
        &mut self,
        obs: &CanonicalObservation,
    ) -> Result<Vec<JointVector>, ControlError> {
        // Each buffered step assumes the previous one landed; chain the
        // predicted states so the chunk stays inside the comfort band.
        let mut state = obs.state.clone();
        let mut chunk = Vec::with_capacity(self.chunk_len);
        for _ in 0..self.chunk_len {
            let delta = self.step(&state);
            let next: Vec<f32> = state.iter().zip(delta.iter()).map(|(s, d)| s + d).collect();
            state = JointVector::new(next).unwrap_or_else(|_| JointVector::zeros());
            chunk.push(delta);
        }
        Ok(chunk)
    }
}
