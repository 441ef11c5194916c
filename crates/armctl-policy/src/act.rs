//! [`ActPolicy`] – learned action-chunking policy loaded from a model
//! directory.
//!
//! A model directory holds two artifacts:
//!
//! - `config.json` – architecture hyperparameters.  Missing or malformed
//!   configuration is fatal at startup.
//! - `model.bin` – the trained parameter blob (little-endian `f32`s).  A
//!   missing or unreadable blob is **not** fatal: the policy proceeds with
//!   freshly initialised parameters and reports
//!   [`ModelLoadStatus::MissingWeights`], an explicit dry-run allowance for
//!   bench runs without trained weights.  Callers must consult
//!   [`ActPolicy::status`] rather than inferring the mode from logs.
//!
//! The network internals are opaque to the rest of the system: the loop
//! only sees `CanonicalObservation` in, normalized action chunk out.

use std::fs;
use std::path::Path;

use armctl_types::{CanonicalObservation, ControlError, JOINT_COUNT, JointVector, RawAction};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{info, warn};

/// Parameters per chunk step: a state matrix, a bias, and a visual
/// coupling vector.
const STEP_PARAMS: usize = JOINT_COUNT * JOINT_COUNT + JOINT_COUNT + JOINT_COUNT;

/// Architecture hyperparameters read from `config.json`.
///
/// Field defaults mirror the training-side configuration so a minimal
/// `{}` config is usable on the bench.
#[derive(Debug, Clone, Deserialize)]
pub struct ActConfig {
    #[serde(default = "default_dim_model")]
    pub dim_model: usize,
    #[serde(default = "default_n_heads")]
    pub n_heads: usize,
    #[serde(default = "default_dim_feedforward")]
    pub dim_feedforward: usize,
    #[serde(default = "default_n_encoder_layers")]
    pub n_encoder_layers: usize,
    #[serde(default = "default_n_decoder_layers")]
    pub n_decoder_layers: usize,
    #[serde(default = "default_dropout")]
    pub dropout: f32,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Number of future steps emitted per inference call (chunk length K).
    #[serde(default = "default_n_action_steps")]
    pub n_action_steps: usize,
    #[serde(default = "default_latent_dim")]
    pub latent_dim: usize,
    #[serde(default = "default_use_vae")]
    pub use_vae: bool,
}

fn default_dim_model() -> usize {
    512
}
fn default_n_heads() -> usize {
    8
}
fn default_dim_feedforward() -> usize {
    3200
}
fn default_n_encoder_layers() -> usize {
    4
}
fn default_n_decoder_layers() -> usize {
    1
}
fn default_dropout() -> f32 {
    0.1
}
fn default_chunk_size() -> usize {
    100
}
fn default_n_action_steps() -> usize {
    100
}
fn default_latent_dim() -> usize {
    32
}
fn default_use_vae() -> bool {
    true
}

impl ActConfig {
    fn validate(&self) -> Result<(), ControlError> {
        if self.n_action_steps == 0 {
            return Err(ControlError::Config(
                "n_action_steps must be at least 1".to_string(),
            ));
        }
        if self.n_action_steps > self.chunk_size {
            return Err(ControlError::Config(format!(
                "n_action_steps {} exceeds chunk_size {}",
                self.n_action_steps, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Outcome of parameter loading, surfaced to the caller instead of being
/// inferable only from a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelLoadStatus {
    /// `model.bin` was present, well-formed, and applied.
    Loaded,
    /// The blob was absent or unusable; the policy runs on freshly
    /// initialised parameters (dry-run mode).
    MissingWeights,
}

/// One chunk step's parameters.
struct StepHead {
    weight: Vec<f32>, // JOINT_COUNT x JOINT_COUNT, row-major
    bias: Vec<f32>,
    visual: Vec<f32>,
}

impl StepHead {
    fn forward(&self, state: &JointVector, visual_level: f32) -> JointVector {
        let mut out = vec![0.0f32; JOINT_COUNT];
        for (j, o) in out.iter_mut().enumerate() {
            let mut acc = self.bias[j] + self.visual[j] * visual_level;
            for (i, s) in state.iter().enumerate() {
                acc += self.weight[j * JOINT_COUNT + i] * s;
            }
            *o = acc;
        }
        // Length is JOINT_COUNT by construction.
        JointVector::new(out).unwrap_or_else(|_| JointVector::zeros())
    }
}

/// Learned policy: consumes a canonical observation, emits a normalized
/// action chunk of length `n_action_steps`.
pub struct ActPolicy {
    config: ActConfig,
    status: ModelLoadStatus,
    steps: Vec<StepHead>,
}

impl ActPolicy {
    /// Load a policy from `model_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Config`] when `config.json` is missing,
    /// unreadable, malformed, or fails validation.  A missing or malformed
    /// weights blob does **not** error; see [`ModelLoadStatus`].
    pub fn load(model_dir: &Path) -> Result<Self, ControlError> {
        let config_path = model_dir.join("config.json");
        let raw = fs::read_to_string(&config_path).map_err(|e| {
            ControlError::Config(format!(
                "cannot read model config at {}: {e}",
                config_path.display()
            ))
        })?;
        let config: ActConfig = serde_json::from_str(&raw).map_err(|e| {
            ControlError::Config(format!(
                "malformed model config at {}: {e}",
                config_path.display()
            ))
        })?;
        config.validate()?;

        let weights_path = model_dir.join("model.bin");
        let (steps, status) = match fs::read(&weights_path) {
            Ok(bytes) => match parse_weights(&bytes, config.n_action_steps) {
                Some(steps) => {
                    info!(path = %weights_path.display(), "model weights loaded");
                    (steps, ModelLoadStatus::Loaded)
                }
                None => {
                    warn!(
                        path = %weights_path.display(),
                        got = bytes.len(),
                        expected = config.n_action_steps * STEP_PARAMS * 4,
                        "weights blob has unexpected size; proceeding with \
                         freshly initialised parameters (dry run)"
                    );
                    (init_steps(config.n_action_steps), ModelLoadStatus::MissingWeights)
                }
            },
            Err(_) => {
                warn!(
                    path = %weights_path.display(),
                    "no weights blob found; proceeding with freshly \
                     initialised parameters (dry run)"
                );
                (init_steps(config.n_action_steps), ModelLoadStatus::MissingWeights)
            }
        };

        Ok(Self {
            config,
            status,
            steps,
        })
    }

    pub fn status(&self) -> ModelLoadStatus {
        self.status
    }

    pub fn config(&self) -> &ActConfig {
        &self.config
    }

    /// Chunk length K this policy emits per inference call.
    pub fn chunk_len(&self) -> usize {
        self.config.n_action_steps
    }

    /// Mean pixel level across all canonical image tensors; zero when no
    /// camera produced data this tick.
    fn visual_level(obs: &CanonicalObservation) -> f32 {
        let mut sum = 0.0f32;
        let mut count = 0usize;
        for tensor in obs.images.values() {
            if tensor.data.is_empty() {
                continue;
            }
            sum += tensor.data.iter().sum::<f32>() / tensor.data.len() as f32;
            count += 1;
        }
        if count == 0 { 0.0 } else { sum / count as f32 }
    }

    fn forward(&self, obs: &CanonicalObservation) -> Vec<JointVector> {
        let visual = Self::visual_level(obs);
        self.steps
            .iter()
            .map(|step| step.forward(&obs.state, visual))
            .collect()
    }
}

impl crate::engine::PolicyEngine for ActPolicy {
    fn name(&self) -> &str {
        "act"
    }

    fn get_action(&mut self, obs: &CanonicalObservation) -> Result<RawAction, ControlError> {
        let visual = Self::visual_level(obs);
        // Only the first head is needed for a single step.
        let first = self.steps.first().ok_or_else(|| ControlError::Inference {
            stage: "forward".to_string(),
            details: "policy has no action heads".to_string(),
        })?;
        Ok(RawAction::Single(first.forward(&obs.state, visual)))
    }

    fn get_action_sequence(
        &mut self,
        obs: &CanonicalObservation,
    ) -> Result<Vec<JointVector>, ControlError> {
        Ok(self.forward(obs))
    }
}

/// Decode the little-endian `f32` blob into step heads.  Returns `None` on
/// a size mismatch.
fn parse_weights(bytes: &[u8], n_steps: usize) -> Option<Vec<StepHead>> {
    if bytes.len() != n_steps * STEP_PARAMS * 4 {
        return None;
    }
    let floats: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let mut steps = Vec::with_capacity(n_steps);
    for k in 0..n_steps {
        let base = k * STEP_PARAMS;
        let w_end = base + JOINT_COUNT * JOINT_COUNT;
        let b_end = w_end + JOINT_COUNT;
        let v_end = b_end + JOINT_COUNT;
        steps.push(StepHead {
            weight: floats[base..w_end].to_vec(),
            bias: floats[w_end..b_end].to_vec(),
            visual: floats[b_end..v_end].to_vec(),
        });
    }
    Some(steps)
}

/// Small uniform initialisation for dry runs without trained weights, so an
/// untrained policy proposes near-zero normalized motion.
fn init_steps(n_steps: usize) -> Vec<StepHead> {
    let mut rng = StdRng::from_os_rng();
    (0..n_steps)
        .map(|_| StepHead {
            weight: (0..JOINT_COUNT * JOINT_COUNT)
                .map(|_| rng.random_range(-0.01..0.01))
                .collect(),
            bias: (0..JOINT_COUNT).map(|_| rng.random_range(-0.01..0.01)).collect(),
            visual: (0..JOINT_COUNT).map(|_| rng.random_range(-0.01..0.01)).collect(),
        })
        .collect()
}
