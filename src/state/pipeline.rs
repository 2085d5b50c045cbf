//! Optimistic move pipeline.
//!
//! A chosen move is played on a private copy of the working position and held
//! as a [`PendingLocalMove`] until the authority answers. The working position
//! itself only advances through the ledger, so settling a submission either
//! way leaves it untouched.

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dto::{LifecycleStatus, PostMoveRequest},
    rules::{PieceKind, RulesEngine, Side, Square},
};

/// Identifier of one submission attempt.
pub type MoveId = Uuid;

/// What the local player may do right now, derived from the session view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnContext {
    /// Lifecycle status of the game.
    pub status: LifecycleStatus,
    /// Side played by the local identity, `None` for spectators.
    pub local_side: Option<Side>,
    /// Side to move according to the authority.
    pub side_to_move: Option<Side>,
}

impl TurnContext {
    fn mover(&self) -> Result<Side, MoveRefusal> {
        if !self.status.is_ongoing() {
            return Err(MoveRefusal::NotOngoing);
        }
        let side = self.local_side.ok_or(MoveRefusal::Spectator)?;
        if self.side_to_move != Some(side) {
            return Err(MoveRefusal::NotYourTurn);
        }
        Ok(side)
    }
}

/// Local refusals raised before anything reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveRefusal {
    /// The game is not ongoing.
    #[error("The game is not in progress.")]
    NotOngoing,
    /// The local identity holds no seat.
    #[error("Only players can move.")]
    Spectator,
    /// The other side is to move.
    #[error("It is not your turn.")]
    NotYourTurn,
    /// The working position is already mate or drawn by rule.
    #[error("The position on the board is already decided.")]
    PositionDecided,
    /// The origin square does not hold one of the player's pieces.
    #[error("Select one of your pieces first.")]
    NoOwnPiece,
    /// The move is not legal in the working position.
    #[error("Illegal move.")]
    Illegal {
        /// Origin square.
        from: Square,
        /// Destination square.
        to: Square,
    },
    /// A submission is still waiting for the authority.
    #[error("A move is already being submitted.")]
    SubmissionInFlight,
    /// Accepting or declining without an offer from the opponent.
    #[error("There is no draw offer to answer.")]
    NoDrawOffer,
}

/// Errors raised when settling a submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettleError {
    /// No submission is pending.
    #[error("no submission is pending")]
    NoPending,
    /// The pending submission has another id.
    #[error("pending submission {expected} does not match {got}")]
    IdMismatch {
        /// Id of the pending submission.
        expected: MoveId,
        /// Id that was provided.
        got: MoveId,
    },
}

/// A move shown to the player but not yet confirmed by the authority.
#[derive(Debug, Clone)]
pub struct PendingLocalMove {
    /// Submission id.
    pub id: MoveId,
    /// Origin square.
    pub from: Square,
    /// Destination square.
    pub to: Square,
    /// Promotion piece, always a queen when present.
    pub promotion: Option<PieceKind>,
    /// Notation of the move.
    pub san: String,
    /// Coordinate form of the move.
    pub uci: String,
    /// Working position before the move.
    pub fen_before: String,
    /// Position after the move.
    pub fen_after: String,
    candidate: Box<dyn RulesEngine>,
}

impl PendingLocalMove {
    /// Position displayed while the submission is in flight.
    pub fn candidate(&self) -> &dyn RulesEngine {
        self.candidate.as_ref()
    }

    /// Body sent to the authority.
    pub fn request(&self) -> PostMoveRequest {
        PostMoveRequest {
            san: self.san.clone(),
            uci: self.uci.clone(),
            fen_after: self.fen_after.clone(),
            played_ms: 0,
        }
    }
}

/// Phase of the pipeline.
#[derive(Debug, Clone, Default)]
pub enum PipelinePhase {
    /// Nothing selected.
    #[default]
    Idle,
    /// An own piece is selected and its legal targets are offered.
    Selecting {
        /// Selected square.
        from: Square,
        /// Legal destinations from `from`.
        targets: Vec<Square>,
    },
    /// A move was chosen and is waiting for the authority.
    Submitting(PendingLocalMove),
}

/// What a click or move choice led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Click {
    /// A piece was (re)selected.
    Selected {
        /// Selected square.
        from: Square,
        /// Legal destinations from `from`.
        targets: Vec<Square>,
    },
    /// A move was chosen and must be sent to the authority.
    Submit {
        /// Submission id to settle with.
        id: MoveId,
        /// Body for the authority.
        request: PostMoveRequest,
    },
}

/// Selection and submission state for the local player.
#[derive(Debug, Default)]
pub struct MovePipeline {
    phase: PipelinePhase,
}

impl MovePipeline {
    /// Idle pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> &PipelinePhase {
        &self.phase
    }

    /// Selected square and its targets, when selecting.
    pub fn selection(&self) -> Option<(Square, &[Square])> {
        match &self.phase {
            PipelinePhase::Selecting { from, targets } => Some((*from, targets.as_slice())),
            _ => None,
        }
    }

    /// In-flight submission, if any.
    pub fn pending(&self) -> Option<&PendingLocalMove> {
        match &self.phase {
            PipelinePhase::Submitting(pending) => Some(pending),
            _ => None,
        }
    }

    /// Drop a selection; an in-flight submission is kept.
    pub fn clear_selection(&mut self) {
        if matches!(self.phase, PipelinePhase::Selecting { .. }) {
            self.phase = PipelinePhase::Idle;
        }
    }

    /// Handle a click on `square`: select an own piece, or attempt a move from
    /// the current selection.
    pub fn click(
        &mut self,
        square: Square,
        turn: &TurnContext,
        position: &dyn RulesEngine,
    ) -> Result<Click, MoveRefusal> {
        if self.pending().is_some() {
            return Err(MoveRefusal::SubmissionInFlight);
        }
        let side = turn.mover()?;
        if position.is_game_over() {
            return Err(MoveRefusal::PositionDecided);
        }
        let own_piece = position
            .piece_at(square)
            .is_some_and(|piece| piece.side == side);

        let selected = self.selection().map(|(from, _)| from);
        match selected {
            _ if own_piece => Ok(self.select(square, position)),
            None => Err(MoveRefusal::NoOwnPiece),
            Some(from) => self.choose(from, square, turn, position),
        }
    }

    /// Play `from`-`to` on a copy of `position` and enter `Submitting`.
    ///
    /// Promotions always pick a queen.
    pub fn choose(
        &mut self,
        from: Square,
        to: Square,
        turn: &TurnContext,
        position: &dyn RulesEngine,
    ) -> Result<Click, MoveRefusal> {
        if self.pending().is_some() {
            return Err(MoveRefusal::SubmissionInFlight);
        }
        let side = turn.mover()?;
        if position.is_game_over() {
            return Err(MoveRefusal::PositionDecided);
        }
        if !position
            .piece_at(from)
            .is_some_and(|piece| piece.side == side)
        {
            return Err(MoveRefusal::NoOwnPiece);
        }

        let candidates: Vec<_> = position
            .legal_moves_from(from)
            .into_iter()
            .filter(|legal| legal.to == to)
            .collect();
        if candidates.is_empty() {
            return Err(MoveRefusal::Illegal { from, to });
        }
        let promotion = candidates
            .iter()
            .any(|legal| legal.promotion.is_some())
            .then_some(PieceKind::Queen);

        let mut candidate = position.boxed_clone();
        let applied = candidate
            .apply(from, to, promotion)
            .map_err(|_| MoveRefusal::Illegal { from, to })?;

        let pending = PendingLocalMove {
            id: Uuid::new_v4(),
            from,
            to,
            promotion,
            san: applied.san,
            uci: applied.uci,
            fen_before: position.fen(),
            fen_after: applied.fen_after,
            candidate,
        };
        debug!(id = %pending.id, san = %pending.san, "move chosen");

        let click = Click::Submit {
            id: pending.id,
            request: pending.request(),
        };
        self.phase = PipelinePhase::Submitting(pending);
        Ok(click)
    }

    /// The authority accepted submission `id`.
    pub fn confirm(&mut self, id: MoveId) -> Result<PendingLocalMove, SettleError> {
        self.settle(id)
    }

    /// The authority refused submission `id`; the candidate is discarded.
    pub fn roll_back(&mut self, id: MoveId) -> Result<PendingLocalMove, SettleError> {
        self.settle(id)
    }

    fn settle(&mut self, id: MoveId) -> Result<PendingLocalMove, SettleError> {
        let expected = self.pending().map(|pending| pending.id).ok_or(SettleError::NoPending)?;
        if expected != id {
            return Err(SettleError::IdMismatch { expected, got: id });
        }

        match std::mem::take(&mut self.phase) {
            PipelinePhase::Submitting(pending) => Ok(pending),
            _ => Err(SettleError::NoPending),
        }
    }

    fn select(&mut self, from: Square, position: &dyn RulesEngine) -> Click {
        let mut targets: Vec<Square> = position
            .legal_moves_from(from)
            .into_iter()
            .map(|legal| legal.to)
            .collect();
        targets.sort();
        targets.dedup();

        self.phase = PipelinePhase::Selecting {
            from,
            targets: targets.clone(),
        };
        Click::Selected { from, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::BitboardEngine;

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    fn white_to_move() -> TurnContext {
        TurnContext {
            status: LifecycleStatus::Ongoing,
            local_side: Some(Side::White),
            side_to_move: Some(Side::White),
        }
    }

    #[test]
    fn moves_are_refused_unless_the_game_is_ongoing() {
        let position = BitboardEngine::new();
        let mut pipeline = MovePipeline::new();
        let turn = TurnContext {
            status: LifecycleStatus::Created,
            ..white_to_move()
        };
        assert_eq!(
            pipeline.choose(sq("e2"), sq("e4"), &turn, &position),
            Err(MoveRefusal::NotOngoing)
        );
        assert!(pipeline.pending().is_none());
    }

    #[test]
    fn spectators_and_waiting_players_cannot_move() {
        let position = BitboardEngine::new();
        let mut pipeline = MovePipeline::new();
        let spectator = TurnContext {
            local_side: None,
            ..white_to_move()
        };
        assert_eq!(
            pipeline.click(sq("e2"), &spectator, &position),
            Err(MoveRefusal::Spectator)
        );
        let waiting = TurnContext {
            local_side: Some(Side::Black),
            ..white_to_move()
        };
        assert_eq!(
            pipeline.click(sq("e7"), &waiting, &position),
            Err(MoveRefusal::NotYourTurn)
        );
        let unknown = TurnContext {
            side_to_move: None,
            ..white_to_move()
        };
        assert_eq!(
            pipeline.click(sq("e2"), &unknown, &position),
            Err(MoveRefusal::NotYourTurn)
        );
    }

    #[test]
    fn clicking_selects_then_moves() {
        let position = BitboardEngine::new();
        let mut pipeline = MovePipeline::new();
        let turn = white_to_move();

        assert_eq!(
            pipeline.click(sq("e4"), &turn, &position),
            Err(MoveRefusal::NoOwnPiece)
        );
        assert_eq!(
            pipeline.click(sq("e2"), &turn, &position),
            Ok(Click::Selected {
                from: sq("e2"),
                targets: vec![sq("e3"), sq("e4")],
            })
        );
        // Another own piece replaces the selection.
        assert!(matches!(
            pipeline.click(sq("g1"), &turn, &position),
            Ok(Click::Selected { from, .. }) if from == sq("g1")
        ));
        assert_eq!(
            pipeline.click(sq("g4"), &turn, &position),
            Err(MoveRefusal::Illegal {
                from: sq("g1"),
                to: sq("g4"),
            })
        );
        let Ok(Click::Submit { request, .. }) = pipeline.click(sq("f3"), &turn, &position) else {
            panic!("expected a submission");
        };
        assert_eq!(request.san, "Nf3");
        assert_eq!(request.uci, "g1f3");
        assert_eq!(request.played_ms, 0);
    }

    #[test]
    fn a_second_submission_waits_for_the_first() {
        let position = BitboardEngine::new();
        let mut pipeline = MovePipeline::new();
        let turn = white_to_move();
        pipeline.choose(sq("e2"), sq("e4"), &turn, &position).unwrap();
        assert_eq!(
            pipeline.choose(sq("d2"), sq("d4"), &turn, &position),
            Err(MoveRefusal::SubmissionInFlight)
        );
        assert_eq!(
            pipeline.click(sq("d2"), &turn, &position),
            Err(MoveRefusal::SubmissionInFlight)
        );
    }

    #[test]
    fn rolling_back_leaves_the_working_position_untouched() {
        let position = BitboardEngine::new();
        let before = position.fen();
        let mut pipeline = MovePipeline::new();

        let Ok(Click::Submit { id, .. }) =
            pipeline.choose(sq("e2"), sq("e4"), &white_to_move(), &position)
        else {
            panic!("expected a submission");
        };
        let shown = pipeline.pending().unwrap().candidate().fen();
        assert_ne!(shown, before);

        let pending = pipeline.roll_back(id).unwrap();
        assert_eq!(pending.fen_before, before);
        assert_eq!(position.fen(), before);
        assert!(matches!(pipeline.phase(), PipelinePhase::Idle));
    }

    #[test]
    fn settling_checks_the_submission_id() {
        let position = BitboardEngine::new();
        let mut pipeline = MovePipeline::new();
        assert_eq!(
            pipeline.confirm(Uuid::new_v4()).unwrap_err(),
            SettleError::NoPending
        );

        let Ok(Click::Submit { id, .. }) =
            pipeline.choose(sq("e2"), sq("e4"), &white_to_move(), &position)
        else {
            panic!("expected a submission");
        };
        let other = Uuid::new_v4();
        assert_eq!(
            pipeline.confirm(other).unwrap_err(),
            SettleError::IdMismatch {
                expected: id,
                got: other,
            }
        );
        assert!(pipeline.pending().is_some());
        assert_eq!(pipeline.confirm(id).unwrap().san, "e4");
        assert!(pipeline.pending().is_none());
    }

    #[test]
    fn promotions_pick_a_queen() {
        let position = BitboardEngine::from_fen("8/4P3/8/8/8/8/k7/4K3 w - - 0 1").unwrap();
        let mut pipeline = MovePipeline::new();
        let Ok(Click::Submit { request, .. }) =
            pipeline.choose(sq("e7"), sq("e8"), &white_to_move(), &position)
        else {
            panic!("expected a submission");
        };
        assert_eq!(request.uci, "e7e8q");
        assert!(request.san.starts_with("e8=Q"));
    }

    #[test]
    fn clearing_a_selection_keeps_a_pending_submission() {
        let position = BitboardEngine::new();
        let mut pipeline = MovePipeline::new();
        let turn = white_to_move();
        pipeline.click(sq("e2"), &turn, &position).unwrap();
        pipeline.clear_selection();
        assert!(pipeline.selection().is_none());

        pipeline.choose(sq("e2"), sq("e4"), &turn, &position).unwrap();
        pipeline.clear_selection();
        assert!(pipeline.pending().is_some());
    }
}
