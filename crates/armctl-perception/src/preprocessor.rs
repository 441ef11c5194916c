//! [`PerceptionPreprocessor`] – raw observation → canonical form.
//!
//! Each expected camera channel is resized to the target resolution (when
//! its shape differs) and normalized per channel with fixed calibration
//! constants; the joint state is standardized elementwise.  A camera that
//! produced no frame this tick is substituted with an all-zero tensor of
//! the expected shape so a single dropped frame never fails the tick.
//!
//! # Example
//!
//! ```rust
//! use armctl_perception::preprocessor::PerceptionPreprocessor;
//! use armctl_types::JointVector;
//! use std::collections::HashMap;
//!
//! let pre = PerceptionPreprocessor::new(
//!     vec!["image_top".to_string()],
//!     320,
//!     240,
//!     [0.485, 0.456, 0.406],
//!     [0.229, 0.224, 0.225],
//!     vec![0.0, 25.0, 20.0, 1.0, 0.0, 1.5],
//!     vec![1.0, 5.0, 5.0, 1.0, 1.0, 0.5],
//! )
//! .unwrap();
//!
//! let state = JointVector::new(vec![0.0, 25.0, 20.0, 1.0, 0.0, 1.5]).unwrap();
//! let canonical = pre.process(&HashMap::new(), &state).unwrap();
//! // State at the calibration mean standardizes to all zeros.
//! assert!(canonical.state.is_zero());
//! // The missing camera was zero-filled, not treated as an error.
//! assert_eq!(canonical.images["image_top"].data.len(), 3 * 240 * 320);
//! ```

use std::collections::HashMap;

use armctl_types::{
    CanonicalObservation, ControlError, ImageTensor, JOINT_COUNT, JointVector, RawFrame,
};
use tracing::warn;

/// Normalizes raw frames and joint state into the canonical observation the
/// decision function expects.  Calibration constants are fixed at
/// construction and never recomputed at runtime.
#[derive(Debug, Clone)]
pub struct PerceptionPreprocessor {
    cameras: Vec<String>,
    target_width: usize,
    target_height: usize,
    image_mean: [f32; 3],
    image_std: [f32; 3],
    state_mean: Vec<f32>,
    state_std: Vec<f32>,
}

impl PerceptionPreprocessor {
    /// Build a preprocessor for the given expected camera channels and
    /// calibration constants.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Config`] when a calibration vector does not
    /// have [`JOINT_COUNT`] elements, any std is zero or non-finite, or the
    /// target resolution is zero.
    pub fn new(
        cameras: Vec<String>,
        target_width: usize,
        target_height: usize,
        image_mean: [f32; 3],
        image_std: [f32; 3],
        state_mean: Vec<f32>,
        state_std: Vec<f32>,
    ) -> Result<Self, ControlError> {
        if target_width == 0 || target_height == 0 {
            return Err(ControlError::Config(
                "image target resolution must be non-zero".to_string(),
            ));
        }
        if state_mean.len() != JOINT_COUNT || state_std.len() != JOINT_COUNT {
            return Err(ControlError::Config(format!(
                "state calibration has {}/{} elements, expected {JOINT_COUNT}",
                state_mean.len(),
                state_std.len()
            )));
        }
        if image_std.iter().chain(state_std.iter()).any(|s| !s.is_finite() || *s == 0.0) {
            return Err(ControlError::Config(
                "calibration std values must be finite and non-zero".to_string(),
            ));
        }
        Ok(Self {
            cameras,
            target_width,
            target_height,
            image_mean,
            image_std,
            state_mean,
            state_std,
        })
    }

    /// Convert one tick's raw inputs into a [`CanonicalObservation`].
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Config`] for a wrong-length joint state; a
    /// missing or malformed frame is zero-filled instead of failing.
    pub fn process(
        &self,
        images: &HashMap<String, RawFrame>,
        joint_state: &JointVector,
    ) -> Result<CanonicalObservation, ControlError> {
        let state = self.normalize_state(joint_state)?;

        let mut canonical_images = HashMap::with_capacity(self.cameras.len());
        for name in &self.cameras {
            let tensor = match images.get(name) {
                // A zero-area frame is malformed even though its (empty)
                // payload matches its declared dimensions.
                Some(frame)
                    if frame.expected_len() > 0 && frame.data.len() == frame.expected_len() =>
                {
                    self.normalize_frame(frame)
                }
                Some(frame) => {
                    warn!(
                        camera = %name,
                        width = frame.width,
                        height = frame.height,
                        got = frame.data.len(),
                        expected = frame.expected_len(),
                        "malformed frame; substituting zero tensor"
                    );
                    ImageTensor::zeros(3, self.target_height, self.target_width)
                }
                None => ImageTensor::zeros(3, self.target_height, self.target_width),
            };
            canonical_images.insert(name.clone(), tensor);
        }

        Ok(CanonicalObservation {
            images: canonical_images,
            state,
        })
    }

    /// Standardize the joint state elementwise:
    /// `normalized[i] = (state[i] - mean[i]) / std[i]`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Config`] when the state length is wrong.
    /// (The [`JointVector`] type enforces this on construction; the check
    /// here keeps the contract explicit at the normalization boundary.)
    pub fn normalize_state(&self, state: &JointVector) -> Result<JointVector, ControlError> {
        if state.as_slice().len() != JOINT_COUNT {
            return Err(ControlError::Config(format!(
                "joint state has {} elements, expected {JOINT_COUNT}",
                state.as_slice().len()
            )));
        }
        let values = state
            .iter()
            .enumerate()
            .map(|(i, v)| (v - self.state_mean[i]) / self.state_std[i])
            .collect();
        JointVector::new(values)
    }

    /// Inverse of [`normalize_state`][Self::normalize_state].  Diagnostic
    /// helper for reading canonical state back in physical units.
    pub fn denormalize_state(&self, state: &JointVector) -> Result<JointVector, ControlError> {
        let values = state
            .iter()
            .enumerate()
            .map(|(i, v)| v * self.state_std[i] + self.state_mean[i])
            .collect();
        JointVector::new(values)
    }

    /// Resize (nearest-neighbour) to the target resolution when the shape
    /// differs, then scale bytes to `[0, 1]` and standardize per channel.
    fn normalize_frame(&self, frame: &RawFrame) -> ImageTensor {
        let (w, h) = (self.target_width, self.target_height);
        let (src_w, src_h) = (frame.width as usize, frame.height as usize);
        let mut tensor = ImageTensor::zeros(3, h, w);

        for y in 0..h {
            // Nearest source row for this output row.
            let sy = if src_h == h { y } else { y * src_h / h };
            for x in 0..w {
                let sx = if src_w == w { x } else { x * src_w / w };
                let src_base = (sy * src_w + sx) * 3;
                for c in 0..3 {
                    let byte = frame.data[src_base + c];
                    let scaled = f32::from(byte) / 255.0;
                    let norm = (scaled - self.image_mean[c]) / self.image_std[c];
                    tensor.data[(c * h + y) * w + x] = norm;
                }
            }
        }
        tensor
    }
}
