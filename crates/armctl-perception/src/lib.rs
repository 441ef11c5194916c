//! `armctl-perception` – normalization boundary around the decision function.
//!
//! Converts between the raw world (byte frames, physical joint angles) and
//! the canonical normalized form the policy was trained on.
//!
//! # Modules
//!
//! - [`preprocessor`] – [`PerceptionPreprocessor`][preprocessor::PerceptionPreprocessor]:
//!   resizes and per-channel-normalizes camera frames and standardizes the
//!   joint state into a [`CanonicalObservation`][armctl_types::CanonicalObservation].
//! - [`postprocessor`] – [`ActionPostprocessor`][postprocessor::ActionPostprocessor]:
//!   denormalizes raw policy output back into a physical joint delta.

pub mod postprocessor;
pub mod preprocessor;

pub use postprocessor::ActionPostprocessor;
pub use preprocessor::PerceptionPreprocessor;
