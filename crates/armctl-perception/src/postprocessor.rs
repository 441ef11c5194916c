//! [`ActionPostprocessor`] – raw policy output → physical joint delta.
//!
//! Denormalizes elementwise with fixed calibration constants:
//! `physical[i] = raw[i] * std[i] + mean[i]`.  Accepts a single action or a
//! chunk and always yields exactly one [`PhysicalDelta`] — the first step of
//! a chunk, or the sole step in single-step mode.

use armctl_types::{ControlError, JOINT_COUNT, JointVector, PhysicalDelta, RawAction};

/// Converts normalized policy units into physical joint deltas.
#[derive(Debug, Clone)]
pub struct ActionPostprocessor {
    action_mean: Vec<f32>,
    action_std: Vec<f32>,
}

impl ActionPostprocessor {
    /// Build a postprocessor from fixed action calibration constants.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Config`] when a calibration vector does not
    /// have [`JOINT_COUNT`] elements or any std is zero or non-finite.
    pub fn new(action_mean: Vec<f32>, action_std: Vec<f32>) -> Result<Self, ControlError> {
        if action_mean.len() != JOINT_COUNT || action_std.len() != JOINT_COUNT {
            return Err(ControlError::Config(format!(
                "action calibration has {}/{} elements, expected {JOINT_COUNT}",
                action_mean.len(),
                action_std.len()
            )));
        }
        if action_std.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(ControlError::Config(
                "action std values must be finite and non-zero".to_string(),
            ));
        }
        Ok(Self {
            action_mean,
            action_std,
        })
    }

    /// Denormalize one raw action into a physical delta.
    ///
    /// For a chunk the first step is selected; the scheduler handles
    /// buffering of the remaining steps when running in chunked mode.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Inference`] for an empty chunk.
    pub fn process(&self, raw: &RawAction) -> Result<PhysicalDelta, ControlError> {
        match raw {
            RawAction::Single(step) => self.denormalize_step(step),
            RawAction::Chunk(steps) => {
                let first = steps.first().ok_or_else(|| ControlError::Inference {
                    stage: "postprocess".to_string(),
                    details: "policy returned an empty action chunk".to_string(),
                })?;
                self.denormalize_step(first)
            }
        }
    }

    /// Denormalize a single normalized step:
    /// `physical[i] = step[i] * std[i] + mean[i]`.
    pub fn denormalize_step(&self, step: &JointVector) -> Result<PhysicalDelta, ControlError> {
        let values = step
            .iter()
            .enumerate()
            .map(|(i, v)| v * self.action_std[i] + self.action_mean[i])
            .collect();
        JointVector::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_postprocessor() -> ActionPostprocessor {
        ActionPostprocessor::new(
            vec![0.0; 6],
            vec![0.05, 0.05, 0.05, 0.02, 0.02, 0.05],
        )
        .unwrap()
    }

    #[test]
    fn single_action_is_denormalized_per_joint() {
        let post = reference_postprocessor();
        let raw = RawAction::Single(JointVector::new(vec![1.0; 6]).unwrap());
        let delta = post.process(&raw).unwrap();
        assert!((delta.get(0) - 0.05).abs() < 1e-6);
        assert!((delta.get(3) - 0.02).abs() < 1e-6);
    }

    #[test]
    fn chunk_yields_its_first_step() {
        let post = reference_postprocessor();
        let first = JointVector::new(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        let second = JointVector::new(vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        let raw = RawAction::Chunk(vec![first, second]);

        let delta = post.process(&raw).unwrap();
        assert!((delta.get(0) - 0.05).abs() < 1e-6);
        assert!(delta.get(1).abs() < 1e-6);
    }

    #[test]
    fn empty_chunk_is_an_inference_error() {
        let post = reference_postprocessor();
        let result = post.process(&RawAction::Chunk(vec![]));
        assert!(matches!(result, Err(ControlError::Inference { .. })));
    }

    #[test]
    fn zero_raw_action_maps_to_mean() {
        let post = ActionPostprocessor::new(
            vec![0.01, 0.0, 0.0, 0.0, 0.0, 0.0],
            vec![0.05; 6],
        )
        .unwrap();
        let delta = post
            .process(&RawAction::Single(JointVector::zeros()))
            .unwrap();
        assert!((delta.get(0) - 0.01).abs() < 1e-6);
        assert!(delta.get(1).abs() < 1e-6);
    }

    #[test]
    fn zero_action_std_is_a_config_error() {
        let result = ActionPostprocessor::new(vec![0.0; 6], vec![0.0; 6]);
        assert!(matches!(result, Err(ControlError::Config(_))));
    }

    #[test]
    fn wrong_length_calibration_is_a_config_error() {
        let result = ActionPostprocessor::new(vec![0.0; 3], vec![0.05; 3]);
        assert!(matches!(result, Err(ControlError::Config(_))));
    }
}
