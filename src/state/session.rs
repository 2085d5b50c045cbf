//! Last-accepted description of the viewed game and its seats.

use crate::{
    dto::{ClockSnapshot, GameDetails, GameId, LifecycleStatus, UserId},
    rules::Side,
};

/// One seat at the board. Either field may be missing while a game is waiting
/// for an opponent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Seat {
    /// Account holding the seat.
    pub user_id: Option<UserId>,
    /// Display name of that account.
    pub username: Option<String>,
}

impl Seat {
    /// Username, falling back to the numeric id, then to `-`.
    pub fn label(&self) -> String {
        match (&self.username, self.user_id) {
            (Some(name), _) if !name.trim().is_empty() => name.clone(),
            (_, Some(id)) => id.to_string(),
            _ => "-".to_string(),
        }
    }
}

/// Raw clock values as last reported by the authority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawClock {
    /// White's remaining milliseconds.
    pub white_ms: i64,
    /// Black's remaining milliseconds.
    pub black_ms: i64,
    /// Whether the authority is running a clock.
    pub running: bool,
}

/// Authoritative description of one game as of the last successful sync.
///
/// Replaced wholesale on every details snapshot; only [`SessionView::patch_clock`]
/// touches it in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// Game identity.
    pub game_id: GameId,
    /// White's seat.
    pub white: Seat,
    /// Black's seat.
    pub black: Seat,
    /// Lifecycle status.
    pub status: LifecycleStatus,
    /// Clock values from the authority.
    pub clock: RawClock,
    /// Side to move, if the authority reported one.
    pub side_to_move: Option<Side>,
    /// Account that has a draw offer outstanding.
    pub draw_offer_by: Option<UserId>,
}

impl From<&GameDetails> for SessionView {
    fn from(details: &GameDetails) -> Self {
        Self {
            game_id: details.id,
            white: Seat {
                user_id: details.white_id,
                username: details.white_username.clone(),
            },
            black: Seat {
                user_id: details.black_id,
                username: details.black_username.clone(),
            },
            status: details.status,
            clock: RawClock {
                white_ms: details.white_ms,
                black_ms: details.black_ms,
                running: details.running,
            },
            side_to_move: details.next_to_move,
            draw_offer_by: details.draw_offer_by,
        }
    }
}

impl SessionView {
    /// Seat at `side`.
    pub fn seat(&self, side: Side) -> &Seat {
        match side {
            Side::White => &self.white,
            Side::Black => &self.black,
        }
    }

    /// Side played by `user`, `None` for spectators and anonymous viewers.
    pub fn side_of(&self, user: Option<UserId>) -> Option<Side> {
        let user = user?;
        if self.white.user_id == Some(user) {
            Some(Side::White)
        } else if self.black.user_id == Some(user) {
            Some(Side::Black)
        } else {
            None
        }
    }

    /// Whether `user` faces a draw offer made by the other player.
    pub fn has_offer_for(&self, user: Option<UserId>) -> bool {
        let Some(side) = self.side_of(user) else {
            return false;
        };
        match (self.draw_offer_by, self.seat(side.opponent()).user_id) {
            (Some(offerer), Some(opponent)) => offerer == opponent,
            _ => false,
        }
    }

    /// Side that made the outstanding draw offer, if any.
    pub fn draw_offer_side(&self) -> Option<Side> {
        let offerer = self.draw_offer_by?;
        self.side_of(Some(offerer))
    }

    /// Apply the narrower clock-only refresh; identity and status stay put.
    pub fn patch_clock(&mut self, clock: &ClockSnapshot) {
        if let Some(ms) = clock.white_ms {
            self.clock.white_ms = ms;
        }
        if let Some(ms) = clock.black_ms {
            self.clock.black_ms = ms;
        }
        if let Some(running) = clock.running {
            self.clock.running = running;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> SessionView {
        let details: GameDetails = serde_json::from_str(
            r#"{"id":9,"whiteId":1,"blackId":2,"blackUsername":"carla","status":"ONGOING",
                "whiteMs":60000,"blackMs":60000,"running":true,"nextToMove":"WHITE","drawOfferBy":2}"#,
        )
        .unwrap();
        SessionView::from(&details)
    }

    #[test]
    fn seats_resolve_from_identity() {
        let view = view();
        assert_eq!(view.side_of(Some(1)), Some(Side::White));
        assert_eq!(view.side_of(Some(2)), Some(Side::Black));
        assert_eq!(view.side_of(Some(3)), None);
        assert_eq!(view.side_of(None), None);
    }

    #[test]
    fn labels_prefer_username_then_id() {
        let view = view();
        assert_eq!(view.white.label(), "1");
        assert_eq!(view.black.label(), "carla");
        assert_eq!(Seat::default().label(), "-");
    }

    #[test]
    fn draw_offers_only_count_when_made_by_the_opponent() {
        let view = view();
        assert!(view.has_offer_for(Some(1)));
        assert!(!view.has_offer_for(Some(2)));
        assert!(!view.has_offer_for(None));
        assert_eq!(view.draw_offer_side(), Some(Side::Black));
    }

    #[test]
    fn clock_patch_leaves_status_alone() {
        let mut view = view();
        view.patch_clock(&ClockSnapshot {
            white_ms: Some(1_000),
            running: Some(false),
            status: Some(LifecycleStatus::Timeout),
            ..Default::default()
        });
        assert_eq!(view.clock.white_ms, 1_000);
        assert_eq!(view.clock.black_ms, 60_000);
        assert!(!view.clock.running);
        assert_eq!(view.status, LifecycleStatus::Ongoing);
    }
}
