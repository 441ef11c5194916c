//! In-process simulated arm for CI and headless testing.
//!
//! [`SimRig`] builds a matched [`ObservationSource`]/[`ActuatorSink`] pair
//! that share one joint-state store: targets applied through the sink are
//! reported back by the source on the next poll, so the full control stack
//! runs end to end without physical hardware.
//!
//! # Example
//!
//! ```rust
//! use armctl_hal::sim::SimRig;
//! use armctl_hal::{ActuatorSink, ObservationSource};
//! use armctl_types::JointVector;
//!
//! let (mut source, mut sink) = SimRig::new()
//!     .with_camera("image_top")
//!     .with_camera("image_wrist")
//!     .build();
//!
//! let target = JointVector::zeros().to_targets();
//! sink.apply(&target).expect("sim apply must succeed");
//! let obs = source.poll().unwrap().expect("sim always has data");
//! assert_eq!(obs.images.len(), 2);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use armctl_types::{
    ControlError, JOINT_NAMES, JointTargets, JointVector, Observation, RawFrame,
};
use tracing::trace;

/// Shared joint-state store between the sim source and sink.
type SharedState = Arc<Mutex<JointVector>>;

// ────────────────────────────────────────────────────────────────────────────
// Simulated observation source
// ────────────────────────────────────────────────────────────────────────────

/// Simulated camera + joint-state reader.  Always returns a fresh sample.
pub struct SimSource {
    id: String,
    state: SharedState,
    cameras: Vec<String>,
    frame_width: u32,
    frame_height: u32,
}

impl super::source::ObservationSource for SimSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn poll(&mut self) -> Result<Option<Observation>, ControlError> {
        let joint_state = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let mut images = HashMap::new();
        for name in &self.cameras {
            images.insert(
                name.clone(),
                test_pattern_frame(self.frame_width, self.frame_height),
            );
        }
        Ok(Some(Observation {
            images,
            joint_state,
        }))
    }
}

/// A horizontal grey ramp so downstream normalization sees non-constant
/// pixel data.
fn test_pattern_frame(width: u32, height: u32) -> RawFrame {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for _y in 0..height {
        for x in 0..width {
            let level = (x * 255 / width.max(1)) as u8;
            data.extend_from_slice(&[level, level, level]);
        }
    }
    RawFrame {
        width,
        height,
        data,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated actuator sink
// ────────────────────────────────────────────────────────────────────────────

/// Simulated arm that records the most recent commanded position.  The
/// position snaps to the target instantly; always succeeds.
pub struct SimSink {
    id: String,
    state: SharedState,
}

impl super::sink::ActuatorSink for SimSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&mut self, target: &JointTargets) -> Result<(), ControlError> {
        let mut values = Vec::with_capacity(JOINT_NAMES.len());
        for name in JOINT_NAMES {
            match target.get(name) {
                Some(v) => values.push(*v),
                None => {
                    return Err(ControlError::Actuation {
                        component: self.id.clone(),
                        details: format!("missing target for joint '{name}'"),
                    });
                }
            }
        }
        let next = JointVector::new(values).map_err(|e| ControlError::Actuation {
            component: self.id.clone(),
            details: e.to_string(),
        })?;
        trace!(sink = %self.id, target = ?next.as_slice(), "sim position snapped to target");
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
        Ok(())
    }

    fn read_state(&self) -> Result<JointVector, ControlError> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRig builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for a matched simulated source/sink pair.
///
/// Call the `with_*` methods to shape the rig, then [`build`][Self::build]
/// to obtain the pair.
pub struct SimRig {
    cameras: Vec<String>,
    start_pose: JointVector,
    frame_width: u32,
    frame_height: u32,
}

impl Default for SimRig {
    fn default() -> Self {
        Self {
            cameras: Vec::new(),
            start_pose: JointVector::zeros(),
            frame_width: 320,
            frame_height: 240,
        }
    }
}

impl SimRig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a simulated camera with the given channel name.
    pub fn with_camera(mut self, name: impl Into<String>) -> Self {
        self.cameras.push(name.into());
        self
    }

    /// Start the simulated arm at `pose` instead of all zeros.
    pub fn with_start_pose(mut self, pose: JointVector) -> Self {
        self.start_pose = pose;
        self
    }

    /// Override the frame resolution produced by simulated cameras.
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_width = width;
        self.frame_height = height;
        self
    }

    /// Consume the builder and return the wired `(source, sink)` pair.
    pub fn build(self) -> (SimSource, SimSink) {
        let state: SharedState = Arc::new(Mutex::new(self.start_pose));
        let source = SimSource {
            id: "sim_arm".to_string(),
            state: Arc::clone(&state),
            cameras: self.cameras,
            frame_width: self.frame_width,
            frame_height: self.frame_height,
        };
        let sink = SimSink {
            id: "sim_arm".to_string(),
            state,
        };
        (source, sink)
    }
}
