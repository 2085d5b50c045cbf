//! Rules-engine oracle seam: engine-neutral board vocabulary plus the trait every
//! rules engine implementation provides.

mod board;
mod material;
mod san;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::board::BitboardEngine;

/// One of the two sides of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    /// The side that moves first.
    White,
    /// The side that moves second.
    Black,
}

impl Side {
    /// The other side.
    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => f.write_str("white"),
            Side::Black => f.write_str("black"),
        }
    }
}

/// Kind of a chess piece, independent of its colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    /// Pawn.
    Pawn,
    /// Knight.
    Knight,
    /// Bishop.
    Bishop,
    /// Rook.
    Rook,
    /// Queen.
    Queen,
    /// King.
    King,
}

impl PieceKind {
    /// Upper-case letter used in SAN (`None` for pawns).
    pub fn san_letter(self) -> Option<char> {
        match self {
            PieceKind::Pawn => None,
            PieceKind::Knight => Some('N'),
            PieceKind::Bishop => Some('B'),
            PieceKind::Rook => Some('R'),
            PieceKind::Queen => Some('Q'),
            PieceKind::King => Some('K'),
        }
    }

    /// Lower-case letter used in coordinate (UCI) notation and FEN.
    pub fn letter(self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }
}

/// A piece standing on a square.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardPiece {
    /// Owner of the piece.
    pub side: Side,
    /// What the piece is.
    pub kind: PieceKind,
}

/// A board square in algebraic coordinates (`a1` through `h8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square {
    file: u8,
    rank: u8,
}

impl Square {
    /// Build a square from zero-based file and rank indices.
    pub fn new(file: u8, rank: u8) -> Option<Self> {
        (file < 8 && rank < 8).then_some(Self { file, rank })
    }

    /// Zero-based file index (`a` is 0).
    pub fn file(self) -> u8 {
        self.file
    }

    /// Zero-based rank index (rank `1` is 0).
    pub fn rank(self) -> u8 {
        self.rank
    }

    /// File letter, `a` through `h`.
    pub fn file_char(self) -> char {
        char::from(b'a' + self.file)
    }

    /// Rank digit, `1` through `8`.
    pub fn rank_char(self) -> char {
        char::from(b'1' + self.rank)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.file_char(), self.rank_char())
    }
}

impl FromStr for Square {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RulesError::InvalidSquare(s.to_string());
        let mut chars = s.trim().chars();
        let (Some(file), Some(rank), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(invalid());
        };
        let file = file.to_ascii_lowercase();
        if !('a'..='h').contains(&file) || !('1'..='8').contains(&rank) {
            return Err(invalid());
        }
        Ok(Self {
            file: file as u8 - b'a',
            rank: rank as u8 - b'1',
        })
    }
}

/// A legal move available from a square, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalMove {
    /// Origin square.
    pub from: Square,
    /// Destination square.
    pub to: Square,
    /// Promotion piece, when the move promotes a pawn.
    pub promotion: Option<PieceKind>,
    /// Standard algebraic notation for the move in the current position.
    pub san: String,
}

/// Result of applying a move to a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    /// Standard algebraic notation, including check/mate suffixes.
    pub san: String,
    /// Coordinate form, e.g. `e2e4` or `e7e8q`.
    pub uci: String,
    /// Complete FEN of the resulting position.
    pub fen_after: String,
}

/// Outcome derived from a position, independent of the authority's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndState {
    /// The side to move is mated.
    Checkmate {
        /// Side that delivered mate.
        winner: Side,
    },
    /// The side to move has no legal move and is not in check.
    Stalemate,
    /// Drawn by rule (insufficient material or the fifty-move rule).
    Draw,
}

/// Failures raised by a rules engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    /// The position string could not be parsed.
    #[error("invalid position `{fen}`: {reason}")]
    InvalidFen {
        /// Rejected position string.
        fen: String,
        /// Parser explanation.
        reason: String,
    },
    /// A square name could not be parsed.
    #[error("invalid square `{0}`")]
    InvalidSquare(String),
    /// The requested move is not legal in the current position.
    #[error("illegal move {from}{to}")]
    IllegalMove {
        /// Origin square.
        from: Square,
        /// Destination square.
        to: Square,
    },
    /// No legal move matches the given notation.
    #[error("no legal move matches `{0}`")]
    UnknownSan(String),
}

/// Contract consumed from a chess rules engine.
///
/// The working position of a session is a boxed implementation selected once
/// at construction; callers never probe for capabilities.
pub trait RulesEngine: Send + Sync + fmt::Debug {
    /// Reset to the standard starting position.
    fn reset(&mut self);

    /// Replace the position with the one described by `fen`.
    fn load(&mut self, fen: &str) -> Result<(), RulesError>;

    /// Complete FEN of the current position.
    fn fen(&self) -> String;

    /// Side whose turn it is in the current position.
    fn side_to_move(&self) -> Side;

    /// Piece standing on `square`, if any.
    fn piece_at(&self, square: Square) -> Option<BoardPiece>;

    /// Every legal move starting on `square`.
    fn legal_moves_from(&self, square: Square) -> Vec<LegalMove>;

    /// Play `from`-`to` (with an optional promotion) and advance the position.
    fn apply(
        &mut self,
        from: Square,
        to: Square,
        promotion: Option<PieceKind>,
    ) -> Result<AppliedMove, RulesError>;

    /// Play the legal move whose SAN matches `san` and advance the position.
    fn apply_san(&mut self, san: &str) -> Result<AppliedMove, RulesError>;

    /// Terminal state of the current position, `None` while play continues.
    fn end_state(&self) -> Option<EndState>;

    /// Whether the current position is terminal for any reason.
    fn is_game_over(&self) -> bool {
        self.end_state().is_some()
    }

    /// Clone into a fresh boxed engine holding the same position.
    fn boxed_clone(&self) -> Box<dyn RulesEngine>;
}

impl Clone for Box<dyn RulesEngine> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}
