use chess::{BitBoard, Board, Color, Piece};

/// Whether neither side keeps enough material to ever deliver mate.
///
/// Covers king vs king, king and a single minor piece vs king, and
/// king and bishop vs king and bishop with both bishops on one square colour.
pub(super) fn has_insufficient_material(board: &Board) -> bool {
    let heavy_or_pawn =
        *board.pieces(Piece::Pawn) | *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);
    if heavy_or_pawn.popcnt() > 0 {
        return false;
    }

    let white = minors(board, Color::White);
    let black = minors(board, Color::Black);

    match (white.count(), black.count()) {
        (0, 0) | (1, 0) | (0, 1) => true,
        (1, 1) => match (white.bishop_square_colour, black.bishop_square_colour) {
            (Some(w), Some(b)) => w == b,
            _ => false,
        },
        _ => false,
    }
}

struct Minors {
    knights: u32,
    bishops: u32,
    bishop_square_colour: Option<bool>,
}

impl Minors {
    fn count(&self) -> u32 {
        self.knights + self.bishops
    }
}

fn minors(board: &Board, color: Color) -> Minors {
    let own = *board.color_combined(color);
    let bishops: BitBoard = *board.pieces(Piece::Bishop) & own;
    let bishop_square_colour = bishops
        .into_iter()
        .next()
        .map(|square| (square.get_rank().to_index() + square.get_file().to_index()) % 2 == 0);

    Minors {
        knights: (*board.pieces(Piece::Knight) & own).popcnt(),
        bishops: bishops.popcnt(),
        bishop_square_colour,
    }
}
