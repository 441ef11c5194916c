//! [`FaultThrottle`] – per-fault-class log suppression.
//!
//! The loop degrades rather than stops, so a persistent fault (unplugged
//! camera, dead bus) would otherwise emit one log line per tick.  The
//! throttle admits the first failure of each consecutive run and then one
//! more per `window` repeats; any success resets the run.

/// Counts consecutive failures of one fault class and decides which of
/// them deserve a log line.
#[derive(Debug)]
pub struct FaultThrottle {
    window: u32,
    consecutive: u32,
}

impl FaultThrottle {
    /// `window` of 1 logs every failure; larger windows log the first of
    /// each `window`-sized run.
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            consecutive: 0,
        }
    }

    /// Record one failure.  Returns `true` when this failure should be
    /// logged.
    pub fn record(&mut self) -> bool {
        let log = self.consecutive % self.window == 0;
        self.consecutive += 1;
        log
    }

    /// Record a success, ending the current failure run.
    pub fn clear(&mut self) {
        self.consecutive = 0;
    }

    /// Length of the current consecutive-failure run.
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}
