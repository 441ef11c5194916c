//! `armctl` – arm control session entry point.
//!
//! This binary wires the full stack together and runs one control session:
//!
//! 1. Loads `~/.armctl/config.toml` (or `$ARMCTL_CONFIG`), falling back to
//!    the reference arm's calibration defaults.
//! 2. Loads the learned policy from the configured model directory; when
//!    the model configuration is unusable it falls back to the rule-based
//!    heuristic policy and says so.
//! 3. Builds the simulated rig, resets the arm to its rest pose, and runs
//!    the control loop at the configured cadence.
//! 4. Intercepts **Ctrl-C** to stop the loop at the next tick boundary.

mod config;

use std::path::Path;
use std::process;
use std::sync::atomic::Ordering;
use std::time::Duration;

use armctl_hal::sim::SimRig;
use armctl_perception::{ActionPostprocessor, PerceptionPreprocessor};
use armctl_policy::{ActPolicy, HeuristicFallback, ModelLoadStatus, PolicyEngine};
use armctl_runtime::{ControlLoop, ExecutionMode, LoopConfig};
use armctl_safety::SafetyEnvelope;
use armctl_types::{ControlError, JointLimits, JointVector};
use tracing::{error, info, warn};

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // Initialise tracing-subscriber using RUST_LOG (defaults to "info").
    // Set ARMCTL_LOG_FORMAT=json to emit newline-delimited JSON logs
    // suitable for log aggregators.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("ARMCTL_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            info!(path = %config::config_path().display(), "config loaded");
            cfg
        }
        Ok(None) => {
            info!("no config file found; using calibration defaults");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            error!(error = %e, "unusable config file");
            process::exit(1);
        }
    };

    match run_session(&cfg) {
        Ok(ticks) => info!(ticks, "session complete"),
        Err(e) => {
            error!(error = %e, "session failed");
            process::exit(1);
        }
    }
}

/// Assemble the stack from `cfg` and run the loop to completion.
fn run_session(cfg: &config::Config) -> Result<u64, ControlError> {
    let mode = parse_mode(&cfg.mode)?;
    let limits = JointLimits::new(
        cfg.joint_min
            .iter()
            .zip(cfg.joint_max.iter())
            .map(|(min, max)| (*min, *max))
            .collect(),
    )?;
    let rest_pose = JointVector::new(cfg.rest_pose.clone())?;

    let preprocessor = PerceptionPreprocessor::new(
        cfg.cameras.clone(),
        cfg.image_width,
        cfg.image_height,
        cfg.image_mean,
        cfg.image_std,
        cfg.state_mean.clone(),
        cfg.state_std.clone(),
    )?;
    let postprocessor = ActionPostprocessor::new(cfg.action_mean.clone(), cfg.action_std.clone())?;

    // ── Policy selection ──────────────────────────────────────────────────
    let policy: Box<dyn PolicyEngine> = match ActPolicy::load(Path::new(&cfg.model_dir)) {
        Ok(policy) => {
            match policy.status() {
                ModelLoadStatus::Loaded => {
                    info!(model_dir = %cfg.model_dir, "learned policy loaded")
                }
                ModelLoadStatus::MissingWeights => {
                    warn!(model_dir = %cfg.model_dir, "learned policy running without trained weights")
                }
            }
            Box::new(policy)
        }
        Err(e) => {
            warn!(
                model_dir = %cfg.model_dir,
                error = %e,
                "learned policy unavailable; using heuristic fallback"
            );
            Box::new(HeuristicFallback::new())
        }
    };

    // ── Hardware rig ──────────────────────────────────────────────────────
    let mut rig = SimRig::new()
        .with_start_pose(rest_pose.clone())
        .with_frame_size(cfg.image_width as u32, cfg.image_height as u32);
    for camera in &cfg.cameras {
        rig = rig.with_camera(camera.clone());
    }
    let (source, sink) = rig.build();

    let loop_config = LoopConfig {
        fps: cfg.fps,
        max_duration: Duration::from_secs(cfg.max_duration_secs),
        mode,
        throttle_window: cfg.throttle_window,
        rest_pose,
    };
    let mut ctl = ControlLoop::new(
        loop_config,
        Box::new(source),
        Box::new(sink),
        preprocessor,
        postprocessor,
        policy,
        SafetyEnvelope::new(limits),
    )?;

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let stop = ctl.stop_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        stop.store(true, Ordering::Release);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; stop via run duration only");
    }

    ctl.reset_to_rest()?;
    ctl.run()
}

fn parse_mode(mode: &str) -> Result<ExecutionMode, ControlError> {
    match mode {
        "single_step" => Ok(ExecutionMode::SingleStep),
        "chunked" => Ok(ExecutionMode::Chunked),
        other => Err(ControlError::Config(format!(
            "unknown execution mode '{other}' (expected 'single_step' or 'chunked')"
        ))),
    }
}
