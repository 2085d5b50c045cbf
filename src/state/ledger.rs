//! Confirmed move history and the working position replayed from it.

use tracing::{debug, warn};

use crate::{dto::MoveItem, rules::RulesEngine};

/// Confirmed move history mirrored into a working rules-engine position.
///
/// The merged length is the only change signal: a fetched list of the same
/// length is not replayed once a position exists.
#[derive(Debug)]
pub struct MoveLedger {
    position: Box<dyn RulesEngine>,
    moves: Vec<MoveItem>,
    merged_len: Option<usize>,
    rebuilds: u64,
}

impl MoveLedger {
    /// Wrap `position`, which is reset on the first merge.
    pub fn new(position: Box<dyn RulesEngine>) -> Self {
        Self {
            position,
            moves: Vec::new(),
            merged_len: None,
            rebuilds: 0,
        }
    }

    /// Working position derived from the ledger.
    pub fn position(&self) -> &dyn RulesEngine {
        self.position.as_ref()
    }

    /// Whether a ledger has been merged at least once.
    pub fn has_position(&self) -> bool {
        self.merged_len.is_some()
    }

    /// Confirmed moves, oldest first.
    pub fn moves(&self) -> &[MoveItem] {
        &self.moves
    }

    /// Number of confirmed moves.
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Whether no move has been confirmed yet.
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// How many times the working position has been rebuilt.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Merge a fetched move list, returning whether the position was rebuilt.
    ///
    /// The ledger only grows: a list shorter than the merged one is ignored.
    pub fn merge(&mut self, moves: Vec<MoveItem>) -> bool {
        match self.merged_len {
            Some(len) if moves.len() == len => return false,
            Some(len) if moves.len() < len => {
                debug!(
                    merged = len,
                    fetched = moves.len(),
                    "shorter move list ignored"
                );
                return false;
            }
            _ => {}
        }

        self.moves = moves;
        self.merged_len = Some(self.moves.len());
        self.replay();
        self.rebuilds += 1;
        debug!(
            plies = self.moves.len(),
            rebuilds = self.rebuilds,
            "working position rebuilt"
        );
        true
    }

    /// Stored positions are authoritative; notation is only replayed when a
    /// move carries no position.
    fn replay(&mut self) {
        self.position.reset();

        for item in &self.moves {
            if !item.fen_after.trim().is_empty() {
                match self.position.load(&item.fen_after) {
                    Ok(()) => continue,
                    Err(err) => {
                        warn!(ply = item.ply, error = %err, "stored position rejected; replaying notation")
                    }
                }
            }
            if item.san.trim().is_empty() {
                continue;
            }
            if let Err(err) = self.position.apply_san(&item.san) {
                warn!(ply = item.ply, san = %item.san, error = %err, "skipping unreadable move");
            }
        }
    }
}
