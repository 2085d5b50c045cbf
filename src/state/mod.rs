//! Reconciliation core for one viewed game.
//!
//! [`MatchState`] is owned by a single session task; every snapshot and user
//! command is applied to it in turn, so none of its parts needs a lock.

pub mod clock;
pub mod ledger;
pub mod merger;
pub mod notifier;
pub mod pipeline;
pub mod session;
pub mod view;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
    api::{ApiError, TerminalAction},
    dto::{ClockSnapshot, GameDetails, GameId, MoveItem, PostMoveRequest, UserId},
    rules::{RulesEngine, Side, Square},
};

pub use self::clock::{ClockBaseline, format_clock};
pub use self::merger::{DetailsMerge, Merge, RequestEpoch, SnapshotMerger};
pub use self::notifier::{GameEnded, TerminalNotifier};
pub use self::pipeline::{Click, MoveId, MovePipeline, MoveRefusal, SettleError, TurnContext};
pub use self::session::SessionView;
pub use self::view::MatchView;

/// Independently polled feeds; an authorization failure halts only its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concern {
    /// `GET /games/{id}/details`.
    Details,
    /// `GET /games/{id}/clock`.
    Clock,
    /// `GET /games/{id}/moves`.
    Moves,
}

impl Concern {
    /// Message shown when the authority refuses this feed with a 403.
    pub fn forbidden_message(self) -> &'static str {
        match self {
            Concern::Details | Concern::Clock => "You do not have access to this game.",
            Concern::Moves => "You are not permitted to view the moves of this game.",
        }
    }
}

/// A move that must be sent to the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Id to settle the pending move with.
    pub id: MoveId,
    /// Request body.
    pub request: PostMoveRequest,
}

/// Session-scoped state: merged snapshots, the move pipeline and the messages
/// shown to the player.
#[derive(Debug)]
pub struct MatchState {
    merger: SnapshotMerger,
    pipeline: MovePipeline,
    local_user: Option<UserId>,
    access_error: Option<String>,
    error: Option<String>,
    info: Option<String>,
}

impl MatchState {
    /// Fresh state for `game_id` as seen by `local_user`.
    pub fn new(
        game_id: GameId,
        local_user: Option<UserId>,
        position: Box<dyn RulesEngine>,
        now: Instant,
    ) -> Self {
        Self {
            merger: SnapshotMerger::new(game_id, position, now),
            pipeline: MovePipeline::new(),
            local_user,
            access_error: None,
            error: None,
            info: None,
        }
    }

    /// Game this state belongs to.
    pub fn game_id(&self) -> GameId {
        self.merger.game_id()
    }

    /// Merged snapshots.
    pub fn merger(&self) -> &SnapshotMerger {
        &self.merger
    }

    /// Selection and submission state.
    pub fn pipeline(&self) -> &MovePipeline {
        &self.pipeline
    }

    /// Tag for a request about to be issued.
    pub fn issue_epoch(&mut self) -> RequestEpoch {
        self.merger.issue_epoch()
    }

    /// Merge a details snapshot.
    pub fn on_details(
        &mut self,
        epoch: RequestEpoch,
        details: &GameDetails,
        now: Instant,
    ) -> DetailsMerge {
        self.merger.on_details(epoch, details, now)
    }

    /// Merge a clock-only snapshot.
    pub fn on_clock_only(
        &mut self,
        epoch: RequestEpoch,
        clock: &ClockSnapshot,
        now: Instant,
    ) -> Merge {
        self.merger.on_clock_only(epoch, clock, now)
    }

    /// Merge a move list; a rebuilt position drops any selection.
    pub fn on_moves(&mut self, epoch: RequestEpoch, moves: Vec<MoveItem>) -> Merge {
        let merge = self.merger.on_moves(epoch, moves);
        if merge == Merge::Applied {
            self.pipeline.clear_selection();
        }
        merge
    }

    /// Record a 403 on `concern`.
    pub fn on_forbidden(&mut self, concern: Concern) {
        warn!(
            game_id = self.game_id(),
            ?concern,
            "authority refused access; polling halted"
        );
        self.access_error = Some(concern.forbidden_message().to_string());
    }

    /// Who may move right now.
    pub fn turn(&self) -> TurnContext {
        let session = self.merger.session();
        TurnContext {
            status: session.map(|s| s.status).unwrap_or_default(),
            local_side: session.and_then(|s| s.side_of(self.local_user)),
            side_to_move: session.and_then(|s| s.side_to_move),
        }
    }

    /// Handle a click on `square`, returning the move to submit, if any.
    pub fn click(&mut self, square: Square) -> Option<Submission> {
        let turn = self.turn();
        let outcome = self
            .pipeline
            .click(square, &turn, self.merger.ledger().position());
        self.after_choice(outcome)
    }

    /// Choose `from`-`to` directly, returning the move to submit, if any.
    pub fn choose(&mut self, from: Square, to: Square) -> Option<Submission> {
        let turn = self.turn();
        let outcome = self
            .pipeline
            .choose(from, to, &turn, self.merger.ledger().position());
        self.after_choice(outcome)
    }

    fn after_choice(&mut self, outcome: Result<Click, MoveRefusal>) -> Option<Submission> {
        match outcome {
            Ok(Click::Selected { .. }) => {
                self.error = None;
                self.info = Some("Choose a target.".to_string());
                None
            }
            Ok(Click::Submit { id, request }) => Some(Submission { id, request }),
            Err(refusal) => {
                self.info = Some(refusal.to_string());
                None
            }
        }
    }

    /// Settle submission `id` with the authority's answer.
    ///
    /// Returns whether the move was accepted.
    pub fn on_submitted(&mut self, id: MoveId, result: Result<(), &ApiError>) -> bool {
        match result {
            Ok(()) => match self.pipeline.confirm(id) {
                Ok(pending) => {
                    info!(game_id = self.game_id(), san = %pending.san, "move accepted");
                    self.info = Some("Move sent.".to_string());
                    self.error = None;
                    true
                }
                Err(err) => {
                    warn!(error = %err, "acceptance for unknown submission ignored");
                    false
                }
            },
            Err(api_err) => {
                match self.pipeline.roll_back(id) {
                    Ok(pending) => {
                        warn!(
                            game_id = self.game_id(),
                            san = %pending.san,
                            error = %api_err,
                            "move rejected; rolled back"
                        );
                        self.error = Some(api_err.user_message());
                        self.info = None;
                    }
                    Err(err) => warn!(error = %err, "rejection for unknown submission ignored"),
                }
                false
            }
        }
    }

    /// Check the local guards for `action`, showing the refusal if any.
    pub fn allow_action(&mut self, action: TerminalAction) -> bool {
        match self.action_guard(action) {
            Ok(()) => true,
            Err(refusal) => {
                self.info = Some(refusal.to_string());
                false
            }
        }
    }

    fn action_guard(&self, action: TerminalAction) -> Result<(), MoveRefusal> {
        let session = self.merger.session().ok_or(MoveRefusal::NotOngoing)?;
        if !session.status.is_ongoing() {
            return Err(MoveRefusal::NotOngoing);
        }
        if session.side_of(self.local_user).is_none() {
            return Err(MoveRefusal::Spectator);
        }
        match action {
            TerminalAction::AcceptDraw | TerminalAction::DeclineDraw
                if !session.has_offer_for(self.local_user) =>
            {
                Err(MoveRefusal::NoDrawOffer)
            }
            _ => Ok(()),
        }
    }

    /// Record a failed terminal action.
    pub fn on_action_failed(&mut self, action: TerminalAction, err: &ApiError) {
        warn!(
            game_id = self.game_id(),
            action = action.path(),
            error = %err,
            "terminal action failed"
        );
        self.error = Some(err.user_message());
        self.info = None;
    }

    /// Extrapolated remaining time for `side`.
    pub fn remaining(&self, side: Side, now: Instant) -> u64 {
        let status = self.turn().status;
        self.merger.baseline().remaining(side, status, now)
    }

    /// Whether the side to move has run out of time in an ongoing game.
    pub fn flag_down(&self, now: Instant) -> bool {
        let Some(session) = self.merger.session() else {
            return false;
        };
        if !session.status.is_ongoing() {
            return false;
        }
        session
            .side_to_move
            .is_some_and(|side| self.remaining(side, now) == 0)
    }

    /// Render-ready snapshot at `now`.
    pub fn view(&self, now: Instant) -> MatchView {
        let session = self.merger.session();
        let turn = self.turn();
        let flipped = turn.local_side == Some(Side::Black);

        let line = |side: Side| {
            let remaining_ms = self.remaining(side, now);
            view::PlayerLine {
                side,
                label: session
                    .map(|s| s.seat(side).label())
                    .unwrap_or_else(|| "-".to_string()),
                remaining_ms,
                clock: format_clock(remaining_ms),
                to_move: turn.side_to_move == Some(side),
            }
        };

        let (position, submitting) = match self.pipeline.pending() {
            Some(pending) => (pending.candidate(), true),
            None => (self.merger.ledger().position(), false),
        };
        let (selected, targets) = match self.pipeline.selection() {
            Some((from, targets)) => (Some(from), targets.to_vec()),
            None => (None, Vec::new()),
        };

        MatchView {
            game_id: self.game_id(),
            loaded: session.is_some(),
            status: turn.status,
            end_reason: turn.status.end_reason().map(str::to_string),
            board_end: position.end_state(),
            white: line(Side::White),
            black: line(Side::Black),
            local_side: turn.local_side,
            flipped,
            fen: position.fen(),
            rows: view::board_rows(position, selected, &targets, flipped),
            selected,
            targets,
            submitting,
            move_count: self.merger.ledger().len(),
            draw_offer_by: session.and_then(SessionView::draw_offer_side),
            error: self.access_error.clone().or_else(|| self.error.clone()),
            info: self.info.clone(),
        }
    }
}
