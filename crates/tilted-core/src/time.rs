//! Monotonic time source used to bound every blocking wait

use core::future::Future;

use embassy_time::{Duration, Instant};

/// Port for the node's monotonic clock.
///
/// On the boards this is backed by the embassy time driver; the simulator
/// uses a virtual clock so that a 30 minute sleep takes no wall time.
pub trait Clock {
    /// Current instant on the node's monotonic timeline.
    fn now(&self) -> Instant;

    /// Suspend the caller for `duration`.
    fn delay(&mut self, duration: Duration) -> impl Future<Output = ()>;
}

/// A point in time after which a bounded wait gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `budget` after `start`.
    pub fn after(start: Instant, budget: Duration) -> Self {
        Self { at: start + budget }
    }

    /// Whether the deadline has passed at `now`.
    pub fn expired(&self, now: Instant) -> bool {
        now > self.at
    }

    pub fn instant(&self) -> Instant {
        self.at
    }
}
