//! [`ControlLoop`] – the fixed-cadence inference-to-actuation scheduler.
//!
//! Each tick runs the full pipeline once, in order:
//!
//! 1. **Observe** – poll the [`ObservationSource`].  No new sample is not a
//!    fault: the tick proceeds on a synthesized observation built from the
//!    last known joint state (no camera frames).
//! 2. **Canonicalize** – normalize frames and joint state through the
//!    [`PerceptionPreprocessor`].
//! 3. **Decide** – query the [`PolicyEngine`] (directly in single-step
//!    mode; via the buffered chunk in chunked mode).  An inference failure
//!    substitutes a zero delta: the arm holds position for one tick.
//! 4. **Denormalize** – convert the raw policy output into a physical
//!    joint delta with the [`ActionPostprocessor`].
//! 5. **Clamp** – pass `current + delta` through the [`SafetyEnvelope`].
//!    This is the only path to the actuator; nothing bypasses it.
//! 6. **Actuate** – command the clamped absolute target on the
//!    [`ActuatorSink`].  A rejected command is logged and retried naturally
//!    on the next tick.
//! 7. **Pace** – sleep for whatever remains of the tick period.  A tick
//!    that overruns its period starts the next one immediately; the loop
//!    does not try to claw back lost time.
//!
//! The loop never exits on a per-tick fault.  Only a stop request (Ctrl-C
//! via the shared stop flag) or the configured run duration ends it.
//!
//! # Example
//!
//! ```rust,no_run
//! use armctl_runtime::control_loop::{ControlLoop, LoopConfig};
//!
//! // Assemble sources, sinks, processors, policy, and envelope, then:
//! // let mut ctl = ControlLoop::new(LoopConfig::default(), /* ... */)?;
//! // ctl.reset_to_rest()?;
//! // ctl.run()?;
//! ```

use std::collections::VecDeque;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use armctl_hal::{ActuatorSink, ObservationSource};
use armctl_perception::{ActionPostprocessor, PerceptionPreprocessor};
use armctl_policy::PolicyEngine;
use armctl_safety::{FeedHealth, FeedWatchdog, SafetyEnvelope};
use armctl_types::{
    ControlError, ControlStep, JointVector, Observation, PhysicalDelta,
};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::throttle::FaultThrottle;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Watchdog feed name for the observation stream.
const OBSERVATION_FEED: &str = "observation";

/// Lifecycle of a [`ControlLoop`].  One-way: a stopped loop is never
/// restarted; build a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    Running,
    Stopped,
}

/// How policy output is consumed across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One inference call per tick; only the first step of any chunk is used.
    SingleStep,
    /// One inference call fills a buffer of future steps; each tick plays
    /// the next buffered step and the policy is re-queried only when the
    /// buffer drains.
    Chunked,
}

/// Configuration bundle for [`ControlLoop`].
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Tick rate in Hz.  Must be finite and positive.
    pub fps: f64,
    /// Wall-clock run duration; [`Duration::ZERO`] runs until stopped.
    pub max_duration: Duration,
    pub mode: ExecutionMode,
    /// Consecutive-failure window for fault-log suppression.
    pub throttle_window: u32,
    /// Known-safe pose commanded by [`ControlLoop::reset_to_rest`], also the
    /// state assumed before the first real observation arrives.
    pub rest_pose: JointVector,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            fps: 15.0,
            max_duration: Duration::ZERO,
            mode: ExecutionMode::SingleStep,
            throttle_window: 10,
            rest_pose: JointVector::new(vec![0.0, 30.0, 20.0, 1.0, 0.0, 1.5])
                .unwrap_or_else(|_| JointVector::zeros()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

/// The scheduler.  Owns every pipeline stage and drives one tick at a time;
/// all stages run synchronously on the caller's thread.
pub struct ControlLoop {
    config: LoopConfig,
    source: Box<dyn ObservationSource>,
    sink: Box<dyn ActuatorSink>,
    preprocessor: PerceptionPreprocessor,
    postprocessor: ActionPostprocessor,
    policy: Box<dyn PolicyEngine>,
    envelope: SafetyEnvelope,
    /// Shared stop request, typically wired to a Ctrl-C handler.
    stop: Arc<AtomicBool>,
    watchdog: FeedWatchdog,
    /// Joint state from the most recent real observation.  Never updated
    /// from commanded targets, so a stalled feed holds the arm where it was
    /// last *seen*, not where it was last told to go.
    last_state: JointVector,
    /// Buffered normalized steps, chunked mode only.
    chunk_buffer: VecDeque<JointVector>,
    ticks: u64,
    state: LoopState,
    observation_was_stale: bool,
    observation_faults: FaultThrottle,
    inference_faults: FaultThrottle,
    actuation_faults: FaultThrottle,
}

impl ControlLoop {
    /// Assemble a loop from its pipeline stages.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Config`] for a non-finite or non-positive
    /// tick rate.
    pub fn new(
        config: LoopConfig,
        source: Box<dyn ObservationSource>,
        sink: Box<dyn ActuatorSink>,
        preprocessor: PerceptionPreprocessor,
        postprocessor: ActionPostprocessor,
        policy: Box<dyn PolicyEngine>,
        envelope: SafetyEnvelope,
    ) -> Result<Self, ControlError> {
        if !config.fps.is_finite() || config.fps <= 0.0 {
            return Err(ControlError::Config(format!(
                "tick rate must be finite and positive, got {}",
                config.fps
            )));
        }

        let mut watchdog = FeedWatchdog::new();
        // Ten silent ticks (at least one second) before the feed counts as
        // stale.
        let staleness = Duration::from_secs_f64((10.0 / config.fps).max(1.0));
        watchdog.register(OBSERVATION_FEED, staleness);

        let throttle_window = config.throttle_window;
        let last_state = config.rest_pose.clone();

        info!(
            source = source.id(),
            sink = sink.id(),
            policy = policy.name(),
            fps = config.fps,
            mode = ?config.mode,
            "control loop assembled"
        );

        Ok(Self {
            config,
            source,
            sink,
            preprocessor,
            postprocessor,
            policy,
            envelope,
            stop: Arc::new(AtomicBool::new(false)),
            watchdog,
            last_state,
            chunk_buffer: VecDeque::new(),
            ticks: 0,
            state: LoopState::Init,
            observation_was_stale: false,
            observation_faults: FaultThrottle::new(throttle_window),
            inference_faults: FaultThrottle::new(throttle_window),
            actuation_faults: FaultThrottle::new(throttle_window),
        })
    }

    /// Shared flag that stops [`run`][Self::run] at the next tick boundary
    /// when set.  Wire this to a Ctrl-C handler.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Move the arm to the configured rest pose, through the envelope like
    /// every other command.  Called once before [`run`][Self::run] so a
    /// session always starts from a known-safe posture.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Actuation`] when the sink rejects the
    /// command.  Startup-time failure here is worth surfacing, unlike the
    /// tolerated per-tick rejections.
    pub fn reset_to_rest(&mut self) -> Result<(), ControlError> {
        let current = self
            .sink
            .read_state()
            .unwrap_or_else(|_| self.last_state.clone());
        let delta: Vec<f32> = self
            .config
            .rest_pose
            .iter()
            .zip(current.iter())
            .map(|(rest, cur)| rest - cur)
            .collect();
        let delta = JointVector::new(delta)?;

        let cmd = self.envelope.clamp(&current, &delta);
        self.sink.apply(&cmd.target.to_targets())?;
        self.last_state = cmd.target.clone();
        info!(target = ?cmd.target.as_slice(), "arm reset to rest pose");
        Ok(())
    }

    /// Run ticks at the configured cadence until the stop flag is set or
    /// the run duration elapses.  Returns the number of ticks executed.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Config`] when called on a loop that has
    /// already run to completion.
    pub fn run(&mut self) -> Result<u64, ControlError> {
        if self.state == LoopState::Stopped {
            return Err(ControlError::Config(
                "control loop has already run to completion".to_string(),
            ));
        }
        self.state = LoopState::Running;

        let period = Duration::from_secs_f64(1.0 / self.config.fps);
        let deadline = (self.config.max_duration > Duration::ZERO)
            .then(|| Instant::now() + self.config.max_duration);

        info!(fps = self.config.fps, "control loop running");
        while !self.stop.load(Ordering::Acquire) {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    info!("configured run duration reached");
                    break;
                }
            }

            let started = Instant::now();
            self.tick();

            let stale = self.watchdog.health(OBSERVATION_FEED) == FeedHealth::Stale;
            if stale && !self.observation_was_stale {
                warn!("observation feed went stale; running on last known state");
            } else if !stale && self.observation_was_stale {
                info!("observation feed recovered");
            }
            self.observation_was_stale = stale;

            // Overruns are absorbed, not compensated: the next tick simply
            // starts late.
            if let Some(remaining) = period.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }

        self.state = LoopState::Stopped;
        info!(ticks = self.ticks, "control loop stopped");
        Ok(self.ticks)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Execute one full pipeline pass.  Total: every fault inside the tick
    /// degrades to a safe default instead of propagating.
    pub fn tick(&mut self) -> ControlStep {
        let started = Instant::now();
        self.ticks += 1;

        // ── 1. Observe ──────────────────────────────────────────────────────
        let observation = match self.source.poll() {
            Ok(Some(obs)) => {
                self.observation_faults.clear();
                self.watchdog.mark_fresh(OBSERVATION_FEED);
                self.last_state = obs.joint_state.clone();
                obs
            }
            Ok(None) => {
                self.observation_faults.clear();
                self.synthesized_observation()
            }
            Err(e) => {
                if self.observation_faults.record() {
                    warn!(
                        source = self.source.id(),
                        error = %e,
                        consecutive = self.observation_faults.consecutive(),
                        "observation poll failed; using last known state"
                    );
                }
                self.synthesized_observation()
            }
        };

        // ── 2–4. Canonicalize, decide, denormalize ──────────────────────────
        let proposed = match self.propose_delta(&observation) {
            Ok(delta) => {
                self.inference_faults.clear();
                delta
            }
            Err(e) => {
                if self.inference_faults.record() {
                    warn!(
                        policy = self.policy.name(),
                        error = %e,
                        consecutive = self.inference_faults.consecutive(),
                        "inference failed; holding position this tick"
                    );
                }
                JointVector::zeros()
            }
        };

        // ── 5. Clamp ────────────────────────────────────────────────────────
        let cmd = self.envelope.clamp(&self.last_state, &proposed);

        // ── 6. Actuate ──────────────────────────────────────────────────────
        match self.sink.apply(&cmd.target.to_targets()) {
            Ok(()) => self.actuation_faults.clear(),
            Err(e) => {
                if self.actuation_faults.record() {
                    warn!(
                        sink = self.sink.id(),
                        error = %e,
                        consecutive = self.actuation_faults.consecutive(),
                        "actuation rejected; retrying on next tick"
                    );
                }
            }
        }

        let adjustment: Vec<f32> = cmd
            .adjusted_delta
            .iter()
            .zip(proposed.iter())
            .map(|(granted, asked)| granted - asked)
            .collect();
        let step = ControlStep {
            id: Uuid::new_v4(),
            tick: self.ticks,
            timestamp: Utc::now(),
            observation_digest: observation.digest(),
            applied_delta: cmd.adjusted_delta,
            clamp_adjustment: JointVector::new(adjustment)
                .unwrap_or_else(|_| JointVector::zeros()),
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        debug!(
            tick = step.tick,
            latency_ms = step.latency_ms,
            clamped = !cmd.touched.is_empty(),
            "tick complete"
        );
        step
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    /// Default observation for ticks without a fresh sample: no camera
    /// frames (the preprocessor zero-fills them), joint state held at the
    /// last real reading.
    fn synthesized_observation(&self) -> Observation {
        Observation {
            images: Default::default(),
            joint_state: self.last_state.clone(),
        }
    }

    /// Stages 2–4: canonical observation in, physical delta out.
    fn propose_delta(&mut self, observation: &Observation) -> Result<PhysicalDelta, ControlError> {
        let canonical = self
            .preprocessor
            .process(&observation.images, &observation.joint_state)?;

        match self.config.mode {
            ExecutionMode::SingleStep => {
                let raw = self.policy.get_action(&canonical)?;
                self.postprocessor.process(&raw)
            }
            ExecutionMode::Chunked => {
                if self.chunk_buffer.is_empty() {
                    let steps = self.policy.get_action_sequence(&canonical)?;
                    if steps.is_empty() {
                        return Err(ControlError::Inference {
                            stage: "chunk".to_string(),
                            details: "policy returned an empty action chunk".to_string(),
                        });
                    }
                    debug!(len = steps.len(), "action chunk buffered");
                    self.chunk_buffer.extend(steps);
                }
                let step = self.chunk_buffer.pop_front().ok_or_else(|| {
                    ControlError::Inference {
                        stage: "chunk".to_string(),
                        details: "chunk buffer unexpectedly empty".to_string(),
                    }
                })?;
                self.postprocessor.denormalize_step(&step)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use armctl_types::{
        CanonicalObservation, JOINT_NAMES, JointLimits, JointTargets, RawAction,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    // ── Mocks ────────────────────────────────────────────────────────────────

    struct ScriptSource {
        script: VecDeque<Result<Option<Observation>, ControlError>>,
    }

    impl ScriptSource {
        fn new(script: Vec<Result<Option<Observation>, ControlError>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl ObservationSource for ScriptSource {
        fn id(&self) -> &str {
            "script"
        }

        fn poll(&mut self) -> Result<Option<Observation>, ControlError> {
            self.script.pop_front().unwrap_or(Ok(None))
        }
    }

    #[derive(Clone)]
    struct RecordingSink {
        applied: Arc<Mutex<Vec<JointTargets>>>,
        state: Arc<Mutex<JointVector>>,
        fail: Arc<AtomicBool>,
    }

    impl RecordingSink {
        fn new(start: JointVector) -> Self {
            Self {
                applied: Arc::new(Mutex::new(Vec::new())),
                state: Arc::new(Mutex::new(start)),
                fail: Arc::new(AtomicBool::new(false)),
            }
        }

        fn applied(&self) -> Vec<JointTargets> {
            self.applied.lock().unwrap().clone()
        }
    }

    impl ActuatorSink for RecordingSink {
        fn id(&self) -> &str {
            "recording"
        }

        fn apply(&mut self, target: &JointTargets) -> Result<(), ControlError> {
            if self.fail.load(Ordering::Acquire) {
                return Err(ControlError::Actuation {
                    component: "recording".to_string(),
                    details: "injected failure".to_string(),
                });
            }
            let values: Vec<f32> = JOINT_NAMES.iter().map(|n| target[*n]).collect();
            *self.state.lock().unwrap() = JointVector::new(values).unwrap();
            self.applied.lock().unwrap().push(target.clone());
            Ok(())
        }

        fn read_state(&self) -> Result<JointVector, ControlError> {
            Ok(self.state.lock().unwrap().clone())
        }
    }

    struct ScriptedPolicy {
        action: JointVector,
        fail: bool,
        chunk: Vec<JointVector>,
        sequence_calls: Arc<AtomicUsize>,
    }

    impl ScriptedPolicy {
        fn constant(action: JointVector) -> Self {
            Self {
                chunk: vec![action.clone()],
                action,
                fail: false,
                sequence_calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing() -> Self {
            let mut p = Self::constant(JointVector::zeros());
            p.fail = true;
            p
        }
    }

    impl PolicyEngine for ScriptedPolicy {
        fn name(&self) -> &str {
            "scripted"
        }

        fn get_action(&mut self, _obs: &CanonicalObservation) -> Result<RawAction, ControlError> {
            if self.fail {
                return Err(ControlError::Inference {
                    stage: "forward".to_string(),
                    details: "injected failure".to_string(),
                });
            }
            Ok(RawAction::Single(self.action.clone()))
        }

        fn get_action_sequence(
            &mut self,
            _obs: &CanonicalObservation,
        ) -> Result<Vec<JointVector>, ControlError> {
            if self.fail {
                return Err(ControlError::Inference {
                    stage: "forward".to_string(),
                    details: "injected failure".to_string(),
                });
            }
            self.sequence_calls.fetch_add(1, Ordering::AcqRel);
            Ok(self.chunk.clone())
        }
    }

    // ── Fixtures ─────────────────────────────────────────────────────────────

    fn reference_limits() -> JointLimits {
        JointLimits::new(vec![
            (-1.0, 1.0),
            (20.0, 35.0),
            (15.0, 25.0),
            (0.5, 2.0),
            (-0.5, 0.5),
            (1.0, 2.0),
        ])
        .unwrap()
    }

    fn rest_pose() -> JointVector {
        JointVector::new(vec![0.0, 30.0, 20.0, 1.0, 0.0, 1.5]).unwrap()
    }

    fn preprocessor() -> PerceptionPreprocessor {
        PerceptionPreprocessor::new(
            vec![],
            320,
            240,
            [0.485, 0.456, 0.406],
            [0.229, 0.224, 0.225],
            vec![0.0, 25.0, 20.0, 1.0, 0.0, 1.5],
            vec![1.0, 5.0, 5.0, 1.0, 1.0, 0.5],
        )
        .unwrap()
    }

    fn postprocessor() -> ActionPostprocessor {
        ActionPostprocessor::new(vec![0.0; 6], vec![0.05, 0.05, 0.05, 0.02, 0.02, 0.05]).unwrap()
    }

    fn observation(state: JointVector) -> Observation {
        Observation {
            images: HashMap::new(),
            joint_state: state,
        }
    }

    fn build_loop(
        config: LoopConfig,
        source: ScriptSource,
        sink: RecordingSink,
        policy: ScriptedPolicy,
    ) -> ControlLoop {
        ControlLoop::new(
            config,
            Box::new(source),
            Box::new(sink),
            preprocessor(),
            postprocessor(),
            Box::new(policy),
            SafetyEnvelope::new(reference_limits()),
        )
        .unwrap()
    }

    fn target_vec(targets: &JointTargets) -> Vec<f32> {
        JOINT_NAMES.iter().map(|n| targets[*n]).collect()
    }

    // ── Tests ────────────────────────────────────────────────────────────────

    #[test]
    fn zero_fps_is_a_config_error() {
        let config = LoopConfig {
            fps: 0.0,
            ..LoopConfig::default()
        };
        let result = ControlLoop::new(
            config,
            Box::new(ScriptSource::new(vec![])),
            Box::new(RecordingSink::new(rest_pose())),
            preprocessor(),
            postprocessor(),
            Box::new(ScriptedPolicy::constant(JointVector::zeros())),
            SafetyEnvelope::new(reference_limits()),
        );
        assert!(matches!(result, Err(ControlError::Config(_))));
    }

    #[test]
    fn zero_policy_output_holds_the_observed_pose() {
        let source = ScriptSource::new(vec![Ok(Some(observation(rest_pose())))]);
        let sink = RecordingSink::new(rest_pose());
        let handle = sink.clone();
        let mut ctl = build_loop(
            LoopConfig::default(),
            source,
            sink,
            ScriptedPolicy::constant(JointVector::zeros()),
        );

        let step = ctl.tick();
        assert!(step.applied_delta.is_zero());
        let applied = handle.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(target_vec(&applied[0]), rest_pose().as_slice());
    }

    #[test]
    fn proposed_motion_is_clamped_before_actuation() {
        // Pan at 0.98 with a +0.05 physical delta (normalized 1.0) must land
        // on the 1.0 limit, never 1.03.
        let mut start = rest_pose().as_slice().to_vec();
        start[0] = 0.98;
        let start = JointVector::new(start).unwrap();

        let source = ScriptSource::new(vec![Ok(Some(observation(start)))]);
        let sink = RecordingSink::new(rest_pose());
        let handle = sink.clone();
        let action = JointVector::new(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        let mut ctl = build_loop(
            LoopConfig::default(),
            source,
            sink,
            ScriptedPolicy::constant(action),
        );

        let step = ctl.tick();
        let applied = handle.applied();
        assert!((target_vec(&applied[0])[0] - 1.0).abs() < 1e-6);
        // Granted 0.02 of the asked 0.05.
        assert!((step.applied_delta.get(0) - 0.02).abs() < 1e-5);
        assert!((step.clamp_adjustment.get(0) + 0.03).abs() < 1e-5);
    }

    #[test]
    fn observation_dropout_runs_on_last_known_state() {
        let seen = JointVector::new(vec![0.5, 28.0, 22.0, 1.2, 0.1, 1.4]).unwrap();
        let source = ScriptSource::new(vec![
            Ok(Some(observation(seen.clone()))),
            Ok(None),
            Err(ControlError::Observation("bus timeout".to_string())),
        ]);
        let sink = RecordingSink::new(rest_pose());
        let handle = sink.clone();
        let mut ctl = build_loop(
            LoopConfig::default(),
            source,
            sink,
            ScriptedPolicy::constant(JointVector::zeros()),
        );

        ctl.tick();
        ctl.tick();
        ctl.tick();

        // Every tick, with or without a fresh sample, held the seen pose.
        let applied = handle.applied();
        assert_eq!(applied.len(), 3);
        for targets in &applied {
            assert_eq!(target_vec(targets), seen.as_slice());
        }
    }

    #[test]
    fn inference_failure_holds_position_for_one_tick() {
        let source = ScriptSource::new(vec![Ok(Some(observation(rest_pose())))]);
        let sink = RecordingSink::new(rest_pose());
        let handle = sink.clone();
        let mut ctl = build_loop(
            LoopConfig::default(),
            source,
            sink,
            ScriptedPolicy::failing(),
        );

        let step = ctl.tick();
        assert!(step.applied_delta.is_zero());
        // The zero delta still reached the actuator as an absolute command.
        assert_eq!(target_vec(&handle.applied()[0]), rest_pose().as_slice());
    }

    #[test]
    fn actuation_failure_does_not_stop_the_loop() {
        let source = ScriptSource::new(vec![
            Ok(Some(observation(rest_pose()))),
            Ok(Some(observation(rest_pose()))),
        ]);
        let sink = RecordingSink::new(rest_pose());
        let handle = sink.clone();
        handle.fail.store(true, Ordering::Release);
        let mut ctl = build_loop(
            LoopConfig::default(),
            source,
            sink,
            ScriptedPolicy::constant(JointVector::zeros()),
        );

        let step = ctl.tick();
        assert_eq!(step.tick, 1);
        assert!(handle.applied().is_empty());

        // Recovery: next tick's command goes through.
        handle.fail.store(false, Ordering::Release);
        ctl.tick();
        assert_eq!(handle.applied().len(), 1);
    }

    #[test]
    fn chunked_mode_requeries_only_when_the_buffer_drains() {
        let step = JointVector::new(vec![0.1, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        let mut policy = ScriptedPolicy::constant(step.clone());
        policy.chunk = vec![step; 3];
        let calls = Arc::clone(&policy.sequence_calls);

        let source = ScriptSource::new(vec![]);
        let sink = RecordingSink::new(rest_pose());
        let config = LoopConfig {
            mode: ExecutionMode::Chunked,
            ..LoopConfig::default()
        };
        let mut ctl = build_loop(config, source, sink, policy);

        for _ in 0..6 {
            ctl.tick();
        }
        assert_eq!(calls.load(Ordering::Acquire), 2);
    }

    #[test]
    fn reset_to_rest_commands_the_rest_pose() {
        let off_rest = JointVector::new(vec![0.8, 24.0, 18.0, 0.7, -0.3, 1.1]).unwrap();
        let sink = RecordingSink::new(off_rest);
        let handle = sink.clone();
        let mut ctl = build_loop(
            LoopConfig::default(),
            ScriptSource::new(vec![]),
            sink,
            ScriptedPolicy::constant(JointVector::zeros()),
        );

        ctl.reset_to_rest().unwrap();
        let applied = handle.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(target_vec(&applied[0]), rest_pose().as_slice());
    }

    #[test]
    fn run_honors_the_stop_flag() {
        let sink = RecordingSink::new(rest_pose());
        let mut ctl = build_loop(
            LoopConfig::default(),
            ScriptSource::new(vec![]),
            sink,
            ScriptedPolicy::constant(JointVector::zeros()),
        );

        assert_eq!(ctl.state(), LoopState::Init);
        ctl.stop_flag().store(true, Ordering::Release);
        let ticks = ctl.run().unwrap();
        assert_eq!(ticks, 0);
        assert_eq!(ctl.state(), LoopState::Stopped);
    }

    /// Policy whose forward pass takes longer than the tick period.
    struct SlowPolicy {
        compute_time: Duration,
    }

    impl PolicyEngine for SlowPolicy {
        fn name(&self) -> &str {
            "slow"
        }

        fn get_action(&mut self, _obs: &CanonicalObservation) -> Result<RawAction, ControlError> {
            thread::sleep(self.compute_time);
            Ok(RawAction::Single(JointVector::zeros()))
        }

        fn get_action_sequence(
            &mut self,
            _obs: &CanonicalObservation,
        ) -> Result<Vec<JointVector>, ControlError> {
            thread::sleep(self.compute_time);
            Ok(vec![JointVector::zeros()])
        }
    }

    #[test]
    fn overrunning_ticks_start_the_next_one_immediately() {
        // Period 10 ms, compute 25 ms: every tick overruns, sleep collapses
        // to zero, and the loop keeps dispatching at compute speed with no
        // negative-sleep fault and no catch-up.
        let config = LoopConfig {
            fps: 100.0,
            max_duration: Duration::from_millis(120),
            ..LoopConfig::default()
        };
        let sink = RecordingSink::new(rest_pose());
        let handle = sink.clone();
        let mut ctl = ControlLoop::new(
            config,
            Box::new(ScriptSource::new(vec![])),
            Box::new(sink),
            preprocessor(),
            postprocessor(),
            Box::new(SlowPolicy {
                compute_time: Duration::from_millis(25),
            }),
            SafetyEnvelope::new(reference_limits()),
        )
        .unwrap();

        let ticks = ctl.run().unwrap();
        // Compute-bound cadence: roughly one tick per 25 ms, never the
        // twelve a 10 ms period would allow.
        assert!((2..=8).contains(&ticks), "unexpected tick count {ticks}");
        assert_eq!(handle.applied().len() as u64, ticks);
        assert_eq!(ctl.state(), LoopState::Stopped);
    }

    #[test]
    fn run_stops_after_the_configured_duration() {
        let config = LoopConfig {
            fps: 200.0,
            max_duration: Duration::from_millis(50),
            ..LoopConfig::default()
        };
        let sink = RecordingSink::new(rest_pose());
        let mut ctl = build_loop(
            config,
            ScriptSource::new(vec![]),
            sink,
            ScriptedPolicy::constant(JointVector::zeros()),
        );

        let ticks = ctl.run().unwrap();
        assert!(ticks >= 1);

        // A finished loop does not run twice.
        assert!(matches!(ctl.run(), Err(ControlError::Config(_))));
    }
}
