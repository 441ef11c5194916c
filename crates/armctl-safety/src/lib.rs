//! `armctl-safety` – the safety envelope around every actuation command.
//!
//! This crate does not decide; it enforces.  Nothing reaches the actuator
//! without passing through it.
//!
//! # Modules
//!
//! - [`envelope`] – [`SafetyEnvelope`][envelope::SafetyEnvelope]: total,
//!   non-bypassable per-joint clamp that bounds every commanded absolute
//!   position inside the configured [`JointLimits`][armctl_types::JointLimits],
//!   regardless of what the policy proposed.
//! - [`watchdog`] – [`FeedWatchdog`][watchdog::FeedWatchdog]: staleness
//!   monitor for the observation feed, so a silently frozen sensor stream
//!   is surfaced instead of being masked by synthesized defaults.

pub mod envelope;
pub mod watchdog;

pub use envelope::{ClampedCommand, SafetyEnvelope};
pub use watchdog::{FeedHealth, FeedWatchdog};
