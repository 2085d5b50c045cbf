//! Clock extrapolation between authoritative snapshots.
//!
//! The authority only reports remaining time when polled. Between polls the
//! display value is derived from the last baseline and a monotonic instant; the
//! derived value never feeds back into game logic.

use tokio::time::Instant;

use crate::{
    dto::{ClockSnapshot, GameDetails, LifecycleStatus},
    rules::Side,
};

/// Extrapolation anchor captured from the latest clock-bearing snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockBaseline {
    /// White's remaining time at `anchored_at`.
    pub white_ms: u64,
    /// Black's remaining time at `anchored_at`.
    pub black_ms: u64,
    /// Whether the authority reported the clock as running.
    pub running: bool,
    /// Side whose clock runs, when known.
    pub side_to_move: Option<Side>,
    /// Monotonic instant the snapshot was merged.
    pub anchored_at: Instant,
}

impl ClockBaseline {
    /// Baseline taken from a full details snapshot.
    ///
    /// The clock only counts as running while the game itself is ongoing.
    pub fn from_details(details: &GameDetails, now: Instant) -> Self {
        Self {
            white_ms: clamp_ms(details.white_ms),
            black_ms: clamp_ms(details.black_ms),
            running: details.running && details.status.is_ongoing(),
            side_to_move: details.next_to_move,
            anchored_at: now,
        }
    }

    /// Baseline refreshed from a clock-only snapshot.
    ///
    /// Absent fields keep their previous values and the side to move is carried
    /// over, since the clock endpoint does not report it.
    pub fn refreshed(&self, clock: &ClockSnapshot, now: Instant) -> Self {
        Self {
            white_ms: clock.white_ms.map(clamp_ms).unwrap_or(self.white_ms),
            black_ms: clock.black_ms.map(clamp_ms).unwrap_or(self.black_ms),
            running: clock.running.unwrap_or(self.running),
            side_to_move: self.side_to_move,
            anchored_at: now,
        }
    }

    /// Baseline whose remaining times come from a younger clock-only snapshot
    /// but whose turn and lifecycle gating come from `details`.
    ///
    /// The clock endpoint never reports the side to move, so a details snapshot
    /// still owns it even when it lands after a younger clock response.
    pub fn with_turn_of(&self, details: &GameDetails) -> Self {
        Self {
            running: self.running && details.status.is_ongoing(),
            side_to_move: details.next_to_move,
            ..*self
        }
    }

    /// Remaining time for `side` at `now`.
    ///
    /// Only the side to move loses time, and only while the baseline is running
    /// and the game is ongoing; otherwise the stored value is returned as is.
    pub fn remaining(&self, side: Side, status: LifecycleStatus, now: Instant) -> u64 {
        let stored = match side {
            Side::White => self.white_ms,
            Side::Black => self.black_ms,
        };

        if !self.running || !status.is_ongoing() || self.side_to_move != Some(side) {
            return stored;
        }

        let elapsed = now.saturating_duration_since(self.anchored_at).as_millis();
        let elapsed = u64::try_from(elapsed).unwrap_or(u64::MAX);
        stored.saturating_sub(elapsed)
    }
}

fn clamp_ms(ms: i64) -> u64 {
    u64::try_from(ms).unwrap_or(0)
}

/// Render remaining time for display.
///
/// `h:mm:ss` from one hour, `m:ss` from ten seconds, `ss.t` below that.
pub fn format_clock(ms: u64) -> String {
    let total_sec = ms / 1000;
    let hours = total_sec / 3600;
    let minutes = (total_sec % 3600) / 60;
    let seconds = total_sec % 60;

    if total_sec < 10 {
        let tenths = (ms % 1000) / 100;
        return format!("{seconds:02}.{tenths}");
    }
    if hours > 0 {
        return format!("{hours}:{minutes:02}:{seconds:02}");
    }
    format!("{minutes}:{seconds:02}")
}
