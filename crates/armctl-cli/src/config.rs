//! Session configuration – reads/writes `~/.armctl/config.toml`.
//!
//! Every field has a default matching the reference arm's calibration, so
//! a missing file (or a minimal one) still yields a runnable session.
//! `ARMCTL_*` environment variables override individual fields after the
//! file is parsed.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Persisted session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Control loop tick rate in Hz.
    #[serde(default = "default_fps")]
    pub fps: f64,

    /// Wall-clock run duration in seconds; 0 runs until Ctrl-C.
    #[serde(default)]
    pub max_duration_secs: u64,

    /// Execution mode: `"single_step"` or `"chunked"`.
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Consecutive-failure window for fault-log suppression.
    #[serde(default = "default_throttle_window")]
    pub throttle_window: u32,

    /// Directory holding `config.json` (+ optional `model.bin`) for the
    /// learned policy.
    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    /// Expected camera channels, in no particular order.
    #[serde(default = "default_cameras")]
    pub cameras: Vec<String>,

    #[serde(default = "default_image_width")]
    pub image_width: usize,
    #[serde(default = "default_image_height")]
    pub image_height: usize,

    /// Per-channel image normalization constants (RGB).
    #[serde(default = "default_image_mean")]
    pub image_mean: [f32; 3],
    #[serde(default = "default_image_std")]
    pub image_std: [f32; 3],

    /// Joint-state standardization constants, canonical joint order.
    #[serde(default = "default_state_mean")]
    pub state_mean: Vec<f32>,
    #[serde(default = "default_state_std")]
    pub state_std: Vec<f32>,

    /// Action denormalization constants, canonical joint order.
    #[serde(default = "default_action_mean")]
    pub action_mean: Vec<f32>,
    #[serde(default = "default_action_std")]
    pub action_std: Vec<f32>,

    /// Absolute per-joint position bounds, canonical joint order.
    #[serde(default = "default_joint_min")]
    pub joint_min: Vec<f32>,
    #[serde(default = "default_joint_max")]
    pub joint_max: Vec<f32>,

    /// Known-safe pose commanded before the loop starts.
    #[serde(default = "default_rest_pose")]
    pub rest_pose: Vec<f32>,
}

fn default_fps() -> f64 {
    15.0
}
fn default_mode() -> String {
    "single_step".to_string()
}
fn default_throttle_window() -> u32 {
    10
}
fn default_model_dir() -> String {
    "model".to_string()
}
fn default_cameras() -> Vec<String> {
    vec!["image_top".to_string(), "image_wrist".to_string()]
}
fn default_image_width() -> usize {
    320
}
fn default_image_height() -> usize {
    240
}
fn default_image_mean() -> [f32; 3] {
    [0.485, 0.456, 0.406]
}
fn default_image_std() -> [f32; 3] {
    [0.229, 0.224, 0.225]
}
fn default_state_mean() -> Vec<f32> {
    vec![0.0, 25.0, 20.0, 1.0, 0.0, 1.5]
}
fn default_state_std() -> Vec<f32> {
    vec![1.0, 5.0, 5.0, 1.0, 1.0, 0.5]
}
fn default_action_mean() -> Vec<f32> {
    vec![0.0; 6]
}
fn default_action_std() -> Vec<f32> {
    vec![0.05, 0.05, 0.05, 0.02, 0.02, 0.05]
}
fn default_joint_min() -> Vec<f32> {
    vec![-1.0, 20.0, 15.0, 0.5, -0.5, 1.0]
}
fn default_joint_max() -> Vec<f32> {
    vec![1.0, 35.0, 25.0, 2.0, 0.5, 2.0]
}
fn default_rest_pose() -> Vec<f32> {
    vec![0.0, 30.0, 20.0, 1.0, 0.0, 1.5]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            max_duration_secs: 0,
            mode: default_mode(),
            throttle_window: default_throttle_window(),
            model_dir: default_model_dir(),
            cameras: default_cameras(),
            image_width: default_image_width(),
            image_height: default_image_height(),
            image_mean: default_image_mean(),
            image_std: default_image_std(),
            state_mean: default_state_mean(),
            state_std: default_state_std(),
            action_mean: default_action_mean(),
            action_std: default_action_std(),
            joint_min: default_joint_min(),
            joint_max: default_joint_max(),
            rest_pose: default_rest_pose(),
        }
    }
}

/// Return the config path: `$ARMCTL_CONFIG` when set, otherwise
/// `~/.armctl/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(explicit) = std::env::var("ARMCTL_CONFIG") {
        return PathBuf::from(explicit);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".armctl").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `ARMCTL_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `ARMCTL_FPS` | `fps` |
/// | `ARMCTL_MAX_DURATION_SECS` | `max_duration_secs` |
/// | `ARMCTL_MODE` | `mode` |
/// | `ARMCTL_MODEL_DIR` | `model_dir` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ARMCTL_FPS")
        && let Ok(fps) = v.parse::<f64>()
    {
        cfg.fps = fps;
    }
    if let Ok(v) = std::env::var("ARMCTL_MAX_DURATION_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.max_duration_secs = secs;
    }
    if let Ok(v) = std::env::var("ARMCTL_MODE") {
        cfg.mode = v;
    }
    if let Ok(v) = std::env::var("ARMCTL_MODEL_DIR") {
        cfg.model_dir = v;
    }
}

/// Save the config to disk, creating `~/.armctl/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
