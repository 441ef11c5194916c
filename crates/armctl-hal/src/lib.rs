//! `armctl-hal` – hardware abstraction for the arm control loop.
//!
//! The control loop only ever talks to the two traits defined here, so
//! drivers can be swapped without touching scheduling or policy logic.
//!
//! # Modules
//!
//! - [`source`] – [`ObservationSource`][source::ObservationSource]: supplies
//!   one camera + joint-state sample per tick.
//! - [`sink`] – [`ActuatorSink`][sink::ActuatorSink]: accepts absolute
//!   joint-target commands and reports the present joint state.
//! - [`mailbox`] – [`ObservationMailbox`][mailbox::ObservationMailbox]:
//!   single-slot, overwrite-latest cell for event-driven observation
//!   delivery.
//! - [`sim`] – [`SimRig`][sim::SimRig]: simulated source/sink pair for
//!   headless tests and CI runs without physical hardware.

pub mod mailbox;
pub mod sim;
pub mod sink;
pub mod source;

pub use mailbox::{MailboxSource, ObservationMailbox};
pub use sim::SimRig;
pub use sink::ActuatorSink;
pub use source::ObservationSource;
