//! `armctl-runtime` – the fixed-cadence control loop.
//!
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: the
//!   observe → canonicalize → decide → clamp → actuate scheduler.
//! - [`throttle`] – [`FaultThrottle`][throttle::FaultThrottle]: suppresses
//!   repeated per-tick fault logs so a dead sensor cannot flood the log at
//!   loop rate.

pub mod control_loop;
pub mod throttle;

pub use control_loop::{ControlLoop, ExecutionMode, LoopConfig, LoopState};
pub use throttle::FaultThrottle;
