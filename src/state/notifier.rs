use tracing::info;

use crate::dto::{GameId, LifecycleStatus};

use super::session::SessionView;

/// Signal raised once when a game is first seen in an ended status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEnded {
    /// Game that ended.
    pub game_id: GameId,
    /// Ended status that triggered the signal.
    pub status: LifecycleStatus,
    /// Human readable reason.
    pub reason: String,
    /// White player's label at the time of the signal.
    pub white: String,
    /// Black player's label at the time of the signal.
    pub black: String,
}

/// One-shot end-of-game detector keyed on the last merged status.
#[derive(Debug, Default)]
pub struct TerminalNotifier {
    game_id: Option<GameId>,
    last_status: Option<LifecycleStatus>,
}

impl TerminalNotifier {
    /// Fresh notifier that has not seen any status.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything seen so far.
    pub fn reset(&mut self) {
        self.game_id = None;
        self.last_status = None;
    }

    /// Record `view` and return the end signal when it is the first ended
    /// status observed for this game.
    pub fn observe(&mut self, view: &SessionView) -> Option<GameEnded> {
        if self.game_id != Some(view.game_id) {
            self.reset();
            self.game_id = Some(view.game_id);
        }

        let was_ended = self.last_status.is_some_and(LifecycleStatus::is_ended);
        self.last_status = Some(view.status);

        if was_ended || !view.status.is_ended() {
            return None;
        }

        let reason = view.status.end_reason().unwrap_or_default().to_string();
        info!(
            game_id = view.game_id,
            status = view.status.as_str(),
            %reason,
            "game ended"
        );
        Some(GameEnded {
            game_id: view.game_id,
            status: view.status,
            reason,
            white: view.white.label(),
            black: view.black.label(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::GameDetails;

    fn view(id: GameId, status: &str) -> SessionView {
        let details: GameDetails = serde_json::from_str(&format!(
            r#"{{"id":{id},"whiteId":1,"blackId":2,"whiteUsername":"ada","status":"{status}"}}"#
        ))
        .unwrap();
        SessionView::from(&details)
    }

    #[test]
    fn fires_once_on_the_transition_to_ended() {
        let mut notifier = TerminalNotifier::new();
        assert_eq!(notifier.observe(&view(1, "ONGOING")), None);
        let ended = notifier.observe(&view(1, "TIMEOUT")).unwrap();
        assert_eq!(ended.status, LifecycleStatus::Timeout);
        assert_eq!(ended.reason, "Time expired");
        assert_eq!(ended.white, "ada");
        assert_eq!(ended.black, "2");
        assert_eq!(notifier.observe(&view(1, "TIMEOUT")), None);
        assert_eq!(notifier.observe(&view(1, "WHITE_WIN")), None);
    }

    #[test]
    fn first_observation_of_a_finished_game_counts() {
        let mut notifier = TerminalNotifier::new();
        assert!(notifier.observe(&view(4, "RESIGN")).is_some());
        assert!(notifier.observe(&view(4, "RESIGN")).is_none());
    }

    #[test]
    fn a_new_game_identity_rearms_the_notifier() {
        let mut notifier = TerminalNotifier::new();
        assert!(notifier.observe(&view(1, "DRAW")).is_some());
        assert!(notifier.observe(&view(2, "DRAW")).is_some());
    }
}
