use std::fmt::Write as _;

use crate::{
    dto::{GameId, LifecycleStatus},
    rules::{BoardPiece, EndState, RulesEngine, Side, Square},
};

/// One player's line: name and clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerLine {
    /// Side of the board.
    pub side: Side,
    /// Username, id, or `-`.
    pub label: String,
    /// Extrapolated remaining time.
    pub remaining_ms: u64,
    /// Display form of `remaining_ms`.
    pub clock: String,
    /// Whether this side is to move.
    pub to_move: bool,
}

/// One board square as displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellView {
    /// Square shown in this cell.
    pub square: Square,
    /// Piece on the square.
    pub piece: Option<BoardPiece>,
    /// Light square.
    pub light: bool,
    /// The square is the current selection.
    pub selected: bool,
    /// The square is a legal target of the selection.
    pub target: bool,
}

/// Render-ready snapshot of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchView {
    /// Game shown.
    pub game_id: GameId,
    /// Whether a details snapshot has been merged yet.
    pub loaded: bool,
    /// Lifecycle status.
    pub status: LifecycleStatus,
    /// Reason shown once the game has ended.
    pub end_reason: Option<String>,
    /// Outcome read off the displayed position, ahead of the authority's status.
    pub board_end: Option<EndState>,
    /// White's line.
    pub white: PlayerLine,
    /// Black's line.
    pub black: PlayerLine,
    /// Side played by the local identity.
    pub local_side: Option<Side>,
    /// The board is shown from black's side.
    pub flipped: bool,
    /// Position shown, including an in-flight local move.
    pub fen: String,
    /// Board rows from the viewer's far side to the near side.
    pub rows: Vec<Vec<CellView>>,
    /// Selected square.
    pub selected: Option<Square>,
    /// Legal targets of the selection.
    pub targets: Vec<Square>,
    /// A local move is waiting for the authority.
    pub submitting: bool,
    /// Confirmed moves.
    pub move_count: usize,
    /// Side that has a draw offer outstanding.
    pub draw_offer_by: Option<Side>,
    /// Error message.
    pub error: Option<String>,
    /// Informational message.
    pub info: Option<String>,
}

impl MatchView {
    /// Plain-text board, white pieces upper case, `*` on targets and `()`
    /// around the selection.
    pub fn board_text(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let Some(first) = row.first() else {
                continue;
            };
            let _ = write!(out, "{} ", first.square.rank_char());
            for cell in row {
                let glyph = cell.piece.map(piece_char).unwrap_or(if cell.target {
                    '*'
                } else if cell.light {
                    '.'
                } else {
                    ':'
                });
                if cell.selected {
                    let _ = write!(out, "({glyph})");
                } else if cell.target && cell.piece.is_some() {
                    let _ = write!(out, "*{glyph} ");
                } else {
                    let _ = write!(out, " {glyph} ");
                }
            }
            out.push('\n');
        }
        if let Some(row) = self.rows.first() {
            out.push_str("  ");
            for cell in row {
                let _ = write!(out, " {} ", cell.square.file_char());
            }
            out.push('\n');
        }
        out
    }
}

/// FEN-style letter for `piece`, upper case for white.
pub fn piece_char(piece: BoardPiece) -> char {
    let letter = piece.kind.letter();
    match piece.side {
        Side::White => letter.to_ascii_uppercase(),
        Side::Black => letter,
    }
}

pub(super) fn board_rows(
    position: &dyn RulesEngine,
    selected: Option<Square>,
    targets: &[Square],
    flipped: bool,
) -> Vec<Vec<CellView>> {
    let ranks: Vec<u8> = if flipped {
        (0..8).collect()
    } else {
        (0..8).rev().collect()
    };
    let files: Vec<u8> = if flipped {
        (0..8).rev().collect()
    } else {
        (0..8).collect()
    };

    ranks
        .iter()
        .map(|&rank| {
            files
                .iter()
                .filter_map(|&file| Square::new(file, rank))
                .map(|square| CellView {
                    square,
                    piece: position.piece_at(square),
                    light: (square.file() + square.rank()) % 2 == 1,
                    selected: selected == Some(square),
                    target: targets.contains(&square),
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{BitboardEngine, PieceKind};

    #[test]
    fn rows_run_from_the_far_side() {
        let position = BitboardEngine::new();
        let rows = board_rows(&position, None, &[], false);
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0][0].square.to_string(), "a8");
        assert_eq!(rows[7][7].square.to_string(), "h1");
        assert!(rows[7][7].light);
        assert!(!rows[7][0].light);

        let flipped = board_rows(&position, None, &[], true);
        assert_eq!(flipped[0][0].square.to_string(), "h1");
        assert_eq!(flipped[7][7].square.to_string(), "a8");
    }

    #[test]
    fn piece_letters_follow_fen_case() {
        assert_eq!(
            piece_char(BoardPiece {
                side: Side::White,
                kind: PieceKind::Knight,
            }),
            'N'
        );
        assert_eq!(
            piece_char(BoardPiece {
                side: Side::Black,
                kind: PieceKind::Queen,
            }),
            'q'
        );
    }
}
