use serde::Deserialize;
use serde_with::{DefaultOnError, DefaultOnNull, serde_as};

use crate::rules::Side;

/// Numeric identifier of a game on the authority.
pub type GameId = i64;
/// Numeric identifier of a user account.
pub type UserId = i64;

/// Lifecycle status reported by the authority.
///
/// Unrecognised strings decode to [`LifecycleStatus::Unknown`] instead of failing
/// the whole payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "String")]
pub enum LifecycleStatus {
    /// Created, waiting for both seats to fill.
    Created,
    /// In progress with clocks running.
    Ongoing,
    /// White won (checkmate or resignation).
    WhiteWin,
    /// Black won (checkmate or resignation).
    BlackWin,
    /// Drawn by agreement or by rule.
    Draw,
    /// A flag fell.
    Timeout,
    /// A player resigned.
    Resign,
    /// Anything the client does not know about.
    #[default]
    Unknown,
}

impl From<String> for LifecycleStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "CREATED" => Self::Created,
            "ONGOING" => Self::Ongoing,
            "WHITE_WIN" => Self::WhiteWin,
            "BLACK_WIN" => Self::BlackWin,
            "DRAW" => Self::Draw,
            "TIMEOUT" => Self::Timeout,
            "RESIGN" => Self::Resign,
            _ => Self::Unknown,
        }
    }
}

impl LifecycleStatus {
    /// Whether the status belongs to the ended set.
    pub fn is_ended(self) -> bool {
        matches!(
            self,
            Self::WhiteWin | Self::BlackWin | Self::Draw | Self::Timeout | Self::Resign
        )
    }

    /// Whether moves may be played and clocks run.
    pub fn is_ongoing(self) -> bool {
        self == Self::Ongoing
    }

    /// Wire spelling of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Ongoing => "ONGOING",
            Self::WhiteWin => "WHITE_WIN",
            Self::BlackWin => "BLACK_WIN",
            Self::Draw => "DRAW",
            Self::Timeout => "TIMEOUT",
            Self::Resign => "RESIGN",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Human readable reason shown when a game ends.
    pub fn end_reason(self) -> Option<&'static str> {
        match self {
            Self::WhiteWin => Some("White wins (checkmate or resignation)"),
            Self::BlackWin => Some("Black wins (checkmate or resignation)"),
            Self::Draw => Some("Draw (agreed or by rule)"),
            Self::Timeout => Some("Time expired"),
            Self::Resign => Some("Resigned"),
            Self::Created | Self::Ongoing | Self::Unknown => None,
        }
    }
}

/// Body of `GET /games/{id}/details`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDetails {
    /// Game identity.
    pub id: GameId,
    /// Account seated as white.
    #[serde(default)]
    pub white_id: Option<UserId>,
    /// Account seated as black.
    #[serde(default)]
    pub black_id: Option<UserId>,
    /// White's display name.
    #[serde(default)]
    pub white_username: Option<String>,
    /// Black's display name.
    #[serde(default)]
    pub black_username: Option<String>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: LifecycleStatus,
    /// White's remaining milliseconds.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub white_ms: i64,
    /// Black's remaining milliseconds.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub black_ms: i64,
    /// Whether a clock is running.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub running: bool,
    /// Side to move; unreadable values decode to `None`.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub next_to_move: Option<Side>,
    /// Account with a draw offer outstanding.
    #[serde(default)]
    pub draw_offer_by: Option<UserId>,
}

/// Body of `GET /games/{id}/clock`; every field may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSnapshot {
    /// White's remaining milliseconds.
    #[serde(default)]
    pub white_ms: Option<i64>,
    /// Black's remaining milliseconds.
    #[serde(default)]
    pub black_ms: Option<i64>,
    /// Whether a clock is running.
    #[serde(default)]
    pub running: Option<bool>,
    /// Lifecycle status; not merged into the session view.
    #[serde(default)]
    pub status: Option<LifecycleStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_decode_with_missing_and_null_fields() {
        let details: GameDetails = serde_json::from_str(
            r#"{"id":7,"whiteId":1,"status":"ONGOING","whiteMs":null,"blackMs":30000,
                "running":true,"nextToMove":"BLACK","drawOfferBy":null}"#,
        )
        .unwrap();
        assert_eq!(details.id, 7);
        assert_eq!(details.white_id, Some(1));
        assert_eq!(details.black_id, None);
        assert_eq!(details.white_ms, 0);
        assert_eq!(details.black_ms, 30_000);
        assert_eq!(details.next_to_move, Some(Side::Black));
        assert_eq!(details.status, LifecycleStatus::Ongoing);
    }

    #[test]
    fn unknown_status_and_side_do_not_fail_decoding() {
        let details: GameDetails =
            serde_json::from_str(r#"{"id":1,"status":"ABORTED","nextToMove":"RED"}"#).unwrap();
        assert_eq!(details.status, LifecycleStatus::Unknown);
        assert_eq!(details.next_to_move, None);
        assert!(!details.status.is_ended());
    }

    #[test]
    fn ended_set_matches_end_reasons() {
        for status in [
            LifecycleStatus::WhiteWin,
            LifecycleStatus::BlackWin,
            LifecycleStatus::Draw,
            LifecycleStatus::Timeout,
            LifecycleStatus::Resign,
        ] {
            assert!(status.is_ended());
            assert!(status.end_reason().is_some());
        }
        assert!(!LifecycleStatus::Ongoing.is_ended());
        assert!(!LifecycleStatus::Created.is_ended());
    }

    #[test]
    fn clock_snapshot_tolerates_partial_bodies() {
        let clock: ClockSnapshot = serde_json::from_str(r#"{"whiteMs":1200}"#).unwrap();
        assert_eq!(clock.white_ms, Some(1200));
        assert_eq!(clock.running, None);
        assert_eq!(clock.status, None);
    }
}
