use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Phase of the timeout watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogPhase {
    /// Waiting for a flag to fall.
    Armed,
    /// A forced refresh is in flight.
    Fired,
    /// The forced refresh settled; re-arms at `until`.
    Cooling {
        /// Instant the watchdog re-arms.
        until: Instant,
    },
}

/// Forces one details refresh when the side to move runs out of time, then
/// stays quiet for a cooldown so the authority can settle the timeout.
#[derive(Debug, Clone)]
pub struct TimeoutWatchdog {
    phase: WatchdogPhase,
    cooldown: Duration,
}

impl TimeoutWatchdog {
    /// Armed watchdog with the given cooldown.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            phase: WatchdogPhase::Armed,
            cooldown,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> WatchdogPhase {
        self.phase
    }

    /// Periodic check. `flag_down` tells whether the side to move shows no time
    /// left in an ongoing game; returns `true` when a refresh must be forced.
    pub fn check(&mut self, flag_down: bool, now: Instant) -> bool {
        if let WatchdogPhase::Cooling { until } = self.phase {
            if now < until {
                return false;
            }
            debug!("timeout watchdog re-armed");
            self.phase = WatchdogPhase::Armed;
        }

        if self.phase == WatchdogPhase::Armed && flag_down {
            debug!("flag down; forcing details refresh");
            self.phase = WatchdogPhase::Fired;
            return true;
        }
        false
    }

    /// The forced refresh finished, successfully or not.
    pub fn settled(&mut self, now: Instant) {
        if self.phase == WatchdogPhase::Fired {
            self.phase = WatchdogPhase::Cooling {
                until: now + self.cooldown,
            };
        }
    }
}
