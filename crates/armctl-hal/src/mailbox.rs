//! [`ObservationMailbox`] – single-slot, overwrite-latest observation cell.
//!
//! When observation delivery is event-driven (frames and joint readings
//! arriving from callbacks or a reader thread) rather than pull-based, the
//! newest sample is parked here.  Writers overwrite whatever is in the slot;
//! the tick handler takes the latest value present.  No history is kept and
//! no reader ever blocks waiting on the cell: an empty slot simply yields
//! `None`, which the scheduler covers with its synthesized default.

use std::sync::{Arc, Mutex};

use armctl_types::{ControlError, Observation};

use crate::source::ObservationSource;

/// Shared one-element cell holding the most recent [`Observation`].
///
/// A plain mutex suffices: the critical section is a pointer-sized swap, and
/// in the single-threaded deployment the lock is always uncontended.
#[derive(Default)]
pub struct ObservationMailbox {
    slot: Mutex<Option<Observation>>,
}

impl ObservationMailbox {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot with the newest observation.  Any sample still in
    /// the slot is discarded unread.
    pub fn post(&self, obs: Observation) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(obs);
    }

    /// Remove and return the latest observation, leaving the slot empty.
    pub fn take(&self) -> Option<Observation> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.take()
    }

    /// `true` when a fresh observation is waiting.
    pub fn is_fresh(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.is_some()
    }
}

/// [`ObservationSource`] adapter over a shared [`ObservationMailbox`].
///
/// Writers hold one `Arc` clone and `post`; the control loop owns this
/// source and polls it once per tick.
pub struct MailboxSource {
    id: String,
    mailbox: Arc<ObservationMailbox>,
}

impl MailboxSource {
    pub fn new(id: impl Into<String>, mailbox: Arc<ObservationMailbox>) -> Self {
        Self {
            id: id.into(),
            mailbox,
        }
    }
}

impl ObservationSource for MailboxSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn poll(&mut self) -> Result<Option<Observation>, ControlError> {
        Ok(self.mailbox.take())
    }
}
