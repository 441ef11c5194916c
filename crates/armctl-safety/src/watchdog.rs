//! [`FeedWatchdog`] – observation-feed staleness monitor.
//!
//! The control loop keeps running on synthesized defaults when the
//! observation source goes quiet, which is safe but easy to miss.  The
//! watchdog makes that condition visible: the scheduler calls
//! [`FeedWatchdog::mark_fresh`] whenever a real sample arrives, and a
//! supervisor (or the loop itself) checks [`FeedWatchdog::stale_feeds`] to
//! report feeds that have been silent past their deadline.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Freshness state reported for a single feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedHealth {
    /// A real sample arrived within the staleness deadline.
    Fresh,
    /// No real sample has arrived within the deadline.
    Stale,
}

struct FeedEntry {
    last_fresh: Instant,
    deadline: Duration,
}

/// Tracks per-feed arrival times and flags feeds that have gone quiet.
#[derive(Default)]
pub struct FeedWatchdog {
    feeds: HashMap<String, FeedEntry>,
}

impl FeedWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `feed` with a maximum silence `deadline`.  The feed starts
    /// fresh; re-registering resets the clock.
    pub fn register(&mut self, feed: &str, deadline: Duration) {
        self.feeds.insert(
            feed.to_string(),
            FeedEntry {
                last_fresh: Instant::now(),
                deadline,
            },
        );
    }

    /// Record that a real (non-synthesized) sample arrived on `feed`.
    ///
    /// No-ops for unregistered feeds.
    pub fn mark_fresh(&mut self, feed: &str) {
        if let Some(entry) = self.feeds.get_mut(feed) {
            entry.last_fresh = Instant::now();
        }
    }

    /// Return the [`FeedHealth`] of `feed`.  Unknown feeds report stale.
    pub fn health(&self, feed: &str) -> FeedHealth {
        match self.feeds.get(feed) {
            Some(entry) if entry.last_fresh.elapsed() <= entry.deadline => FeedHealth::Fresh,
            _ => FeedHealth::Stale,
        }
    }

    /// Names of all feeds past their deadline, in unspecified order.
    pub fn stale_feeds(&self) -> Vec<String> {
        self.feeds
            .iter()
            .filter(|(_, entry)| entry.last_fresh.elapsed() > entry.deadline)
            .map(|(name, _)| name.clone())
            .collect()
    }
}
