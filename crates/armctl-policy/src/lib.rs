//! `armctl-policy` – the decision function behind the control loop.
//!
//! The loop is polymorphic over [`PolicyEngine`][engine::PolicyEngine]:
//!
//! - [`act`] – [`ActPolicy`][act::ActPolicy]: wraps a trained
//!   action-chunking model loaded from a model directory
//!   (`config.json` + weights blob).
//! - [`heuristic`] – [`HeuristicFallback`][heuristic::HeuristicFallback]:
//!   deterministic-in-structure rule policy used when the learned model is
//!   unavailable or failing.  Consumes joint state only, never perception.

pub mod act;
pub mod engine;
pub mod heuristic;

pub use act::{ActConfig, ActPolicy, ModelLoadStatus};
pub use engine::PolicyEngine;
pub use heuristic::HeuristicFallback;
