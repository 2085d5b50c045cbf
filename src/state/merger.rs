//! Snapshot merging for the three independently paced feeds.
//!
//! Every fetch is tagged with a [`RequestEpoch`] when it is issued. A response
//! is dropped when a younger response has already been applied to the state it
//! would overwrite, so overlapping polls never move state backwards.

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    dto::{ClockSnapshot, GameDetails, GameId, MoveItem},
    rules::RulesEngine,
};

use super::{
    clock::ClockBaseline,
    ledger::MoveLedger,
    notifier::{GameEnded, TerminalNotifier},
    session::SessionView,
};

/// Monotonic tag attached to a request when it is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestEpoch(u64);

/// Result of merging a details snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailsMerge {
    /// The snapshot replaced the session view.
    Merged {
        /// End signal, present only on the first ended observation.
        ended: Option<GameEnded>,
    },
    /// A younger snapshot was already merged.
    Stale,
    /// The snapshot would move an ended game back into play.
    Downgrade,
    /// The snapshot describes another game.
    ForeignGame,
}

/// Result of merging a clock-only or moves snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// State changed.
    Applied,
    /// Nothing changed.
    Unchanged,
    /// A younger response was already merged.
    Stale,
}

#[derive(Debug, Default, Clone, Copy)]
struct AppliedEpochs {
    session: Option<RequestEpoch>,
    baseline: Option<RequestEpoch>,
    ledger: Option<RequestEpoch>,
}

fn is_stale(applied: Option<RequestEpoch>, incoming: RequestEpoch) -> bool {
    applied.is_some_and(|applied| incoming < applied)
}

/// Owner of the session view, the clock baseline, the ledger and the
/// end-of-game notifier for one game.
#[derive(Debug)]
pub struct SnapshotMerger {
    game_id: GameId,
    session: Option<SessionView>,
    baseline: ClockBaseline,
    ledger: MoveLedger,
    notifier: TerminalNotifier,
    next_epoch: u64,
    applied: AppliedEpochs,
}

impl SnapshotMerger {
    /// Empty merger for `game_id` whose ledger replays into `position`.
    pub fn new(game_id: GameId, position: Box<dyn RulesEngine>, now: Instant) -> Self {
        Self {
            game_id,
            session: None,
            baseline: ClockBaseline {
                white_ms: 0,
                black_ms: 0,
                running: false,
                side_to_move: None,
                anchored_at: now,
            },
            ledger: MoveLedger::new(position),
            notifier: TerminalNotifier::new(),
            next_epoch: 0,
            applied: AppliedEpochs::default(),
        }
    }

    /// Game this merger belongs to.
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Tag for a request about to be issued.
    pub fn issue_epoch(&mut self) -> RequestEpoch {
        self.next_epoch += 1;
        RequestEpoch(self.next_epoch)
    }

    /// Latest merged session view, `None` until the first details snapshot.
    pub fn session(&self) -> Option<&SessionView> {
        self.session.as_ref()
    }

    /// Active clock baseline.
    pub fn baseline(&self) -> &ClockBaseline {
        &self.baseline
    }

    /// Confirmed moves and working position.
    pub fn ledger(&self) -> &MoveLedger {
        &self.ledger
    }

    /// Replace the session view and clock baseline from a details snapshot.
    pub fn on_details(
        &mut self,
        epoch: RequestEpoch,
        details: &GameDetails,
        now: Instant,
    ) -> DetailsMerge {
        if details.id != self.game_id {
            warn!(
                game_id = self.game_id,
                received = details.id,
                "details snapshot for another game ignored"
            );
            return DetailsMerge::ForeignGame;
        }
        if is_stale(self.applied.session, epoch) {
            debug!(game_id = self.game_id, ?epoch, "stale details snapshot discarded");
            return DetailsMerge::Stale;
        }
        if let Some(current) = self.session.as_ref().map(|session| session.status) {
            if current.is_ended() && !details.status.is_ended() {
                warn!(
                    game_id = self.game_id,
                    from = current.as_str(),
                    to = details.status.as_str(),
                    "status downgrade from the authority ignored"
                );
                return DetailsMerge::Downgrade;
            }
        }

        let view = SessionView::from(details);
        let ended = self.notifier.observe(&view);
        self.session = Some(view);
        self.applied.session = Some(epoch);

        if is_stale(self.applied.baseline, epoch) {
            debug!(game_id = self.game_id, ?epoch, "younger clock values kept");
            self.baseline = self.baseline.with_turn_of(details);
        } else {
            self.baseline = ClockBaseline::from_details(details, now);
            self.applied.baseline = Some(epoch);
        }

        DetailsMerge::Merged { ended }
    }

    /// Refresh only the clock values, leaving status, identity and ledger alone.
    pub fn on_clock_only(
        &mut self,
        epoch: RequestEpoch,
        clock: &ClockSnapshot,
        now: Instant,
    ) -> Merge {
        if is_stale(self.applied.baseline, epoch) {
            debug!(game_id = self.game_id, ?epoch, "stale clock snapshot discarded");
            return Merge::Stale;
        }

        self.baseline = self.baseline.refreshed(clock, now);
        self.applied.baseline = Some(epoch);
        if let Some(session) = self.session.as_mut() {
            session.patch_clock(clock);
        }
        Merge::Applied
    }

    /// Merge a fetched move list into the ledger.
    pub fn on_moves(&mut self, epoch: RequestEpoch, moves: Vec<MoveItem>) -> Merge {
        if is_stale(self.applied.ledger, epoch) {
            debug!(game_id = self.game_id, ?epoch, "stale move list discarded");
            return Merge::Stale;
        }

        self.applied.ledger = Some(epoch);
        if self.ledger.merge(moves) {
            Merge::Applied
        } else {
            Merge::Unchanged
        }
    }
}
