use std::str::FromStr;

use chess::{Board, BoardStatus, ChessMove, Color, File, MoveGen, Piece, Rank};

use super::{
    AppliedMove, BoardPiece, EndState, LegalMove, PieceKind, RulesEngine, RulesError, Side,
    Square, material::has_insufficient_material, san,
};

/// Halfmove count at which the fifty-move rule draws the game.
const FIFTY_MOVE_HALFMOVES: u32 = 100;

/// [`RulesEngine`] backed by the `chess` crate's bitboard move generator.
///
/// The crate's board does not carry the FEN move counters, so they are tracked
/// alongside it and spliced back into [`RulesEngine::fen`].
#[derive(Debug, Clone)]
pub struct BitboardEngine {
    board: Board,
    halfmove: u32,
    fullmove: u32,
}

impl Default for BitboardEngine {
    fn default() -> Self {
        Self {
            board: Board::default(),
            halfmove: 0,
            fullmove: 1,
        }
    }
}

impl BitboardEngine {
    /// Engine positioned at the standard starting position.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine positioned at `fen`.
    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        let mut engine = Self::default();
        engine.load(fen)?;
        Ok(engine)
    }

    fn play(&mut self, mv: ChessMove) -> AppliedMove {
        let san = san::write_san(&self.board, mv);
        let resets_clock = self.board.piece_on(mv.get_source()) == Some(Piece::Pawn)
            || self.board.piece_on(mv.get_dest()).is_some();
        let mover = self.board.side_to_move();

        self.board = self.board.make_move_new(mv);
        self.halfmove = if resets_clock { 0 } else { self.halfmove + 1 };
        if mover == Color::Black {
            self.fullmove += 1;
        }

        AppliedMove {
            san,
            uci: uci(mv),
            fen_after: self.fen(),
        }
    }
}

impl RulesEngine for BitboardEngine {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn load(&mut self, fen: &str) -> Result<(), RulesError> {
        let board = Board::from_str(fen.trim()).map_err(|err| RulesError::InvalidFen {
            fen: fen.to_string(),
            reason: err.to_string(),
        })?;

        let mut fields = fen.split_whitespace().skip(4);
        let halfmove = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
        let fullmove = fields
            .next()
            .and_then(|f| f.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(1);

        self.board = board;
        self.halfmove = halfmove;
        self.fullmove = fullmove;
        Ok(())
    }

    fn fen(&self) -> String {
        let rendered = self.board.to_string();
        let placement = rendered
            .split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join(" ");
        format!("{placement} {} {}", self.halfmove, self.fullmove)
    }

    fn side_to_move(&self) -> Side {
        side_of(self.board.side_to_move())
    }

    fn piece_at(&self, square: Square) -> Option<BoardPiece> {
        let target = to_chess(square);
        let kind = self.board.piece_on(target)?;
        let color = self.board.color_on(target)?;
        Some(BoardPiece {
            side: side_of(color),
            kind: kind_of(kind),
        })
    }

    fn legal_moves_from(&self, square: Square) -> Vec<LegalMove> {
        let source = to_chess(square);
        MoveGen::new_legal(&self.board)
            .filter(|mv| mv.get_source() == source)
            .map(|mv| LegalMove {
                from: square,
                to: from_chess(mv.get_dest()),
                promotion: mv.get_promotion().map(kind_of),
                san: san::write_san(&self.board, mv),
            })
            .collect()
    }

    fn apply(
        &mut self,
        from: Square,
        to: Square,
        promotion: Option<PieceKind>,
    ) -> Result<AppliedMove, RulesError> {
        let wanted = ChessMove::new(to_chess(from), to_chess(to), promotion.map(piece_of));
        if !self.board.legal(wanted) {
            return Err(RulesError::IllegalMove { from, to });
        }
        Ok(self.play(wanted))
    }

    fn apply_san(&mut self, text: &str) -> Result<AppliedMove, RulesError> {
        let wanted = san::strip_annotations(text);
        let found = MoveGen::new_legal(&self.board)
            .find(|mv| san::strip_annotations(&san::write_san(&self.board, *mv)) == wanted)
            .ok_or_else(|| RulesError::UnknownSan(text.to_string()))?;
        Ok(self.play(found))
    }

    fn end_state(&self) -> Option<EndState> {
        match self.board.status() {
            BoardStatus::Checkmate => Some(EndState::Checkmate {
                winner: side_of(self.board.side_to_move()).opponent(),
            }),
            BoardStatus::Stalemate => Some(EndState::Stalemate),
            BoardStatus::Ongoing => (self.halfmove >= FIFTY_MOVE_HALFMOVES
                || has_insufficient_material(&self.board))
            .then_some(EndState::Draw),
        }
    }

    fn boxed_clone(&self) -> Box<dyn RulesEngine> {
        Box::new(self.clone())
    }
}

fn uci(mv: ChessMove) -> String {
    let mut text = format!(
        "{}{}",
        from_chess(mv.get_source()),
        from_chess(mv.get_dest())
    );
    if let Some(piece) = mv.get_promotion() {
        text.push(kind_of(piece).letter());
    }
    text
}

pub(super) fn to_chess(square: Square) -> chess::Square {
    chess::Square::make_square(
        Rank::from_index(square.rank() as usize),
        File::from_index(square.file() as usize),
    )
}

pub(super) fn from_chess(square: chess::Square) -> Square {
    Square {
        file: square.get_file().to_index() as u8,
        rank: square.get_rank().to_index() as u8,
    }
}

pub(super) fn kind_of(piece: Piece) -> PieceKind {
    match piece {
        Piece::Pawn => PieceKind::Pawn,
        Piece::Knight => PieceKind::Knight,
        Piece::Bishop => PieceKind::Bishop,
        Piece::Rook => PieceKind::Rook,
        Piece::Queen => PieceKind::Queen,
        Piece::King => PieceKind::King,
    }
}

fn piece_of(kind: PieceKind) -> Piece {
    match kind {
        PieceKind::Pawn => Piece::Pawn,
        PieceKind::Knight => Piece::Knight,
        PieceKind::Bishop => Piece::Bishop,
        PieceKind::Rook => Piece::Rook,
        PieceKind::Queen => Piece::Queen,
        PieceKind::King => Piece::King,
    }
}

fn side_of(color: Color) -> Side {
    match color {
        Color::White => Side::White,
        Color::Black => Side::Black,
    }
}
