//! Standard algebraic notation for moves generated by the bitboard engine.

use chess::{Board, BoardStatus, ChessMove, MoveGen, Piece};

use super::board::{from_chess, kind_of};

/// Render `mv` (legal in `board`) as SAN, including `+`/`#` suffixes.
pub(super) fn write_san(board: &Board, mv: ChessMove) -> String {
    let source = mv.get_source();
    let dest = mv.get_dest();
    let Some(piece) = board.piece_on(source) else {
        return format!("{}{}", from_chess(source), from_chess(dest));
    };

    let from = from_chess(source);
    let to = from_chess(dest);
    let mut text = String::new();

    if piece == Piece::King && from.file().abs_diff(to.file()) == 2 {
        text.push_str(if to.file() > from.file() { "O-O" } else { "O-O-O" });
    } else if piece == Piece::Pawn {
        // Pawns only change file when capturing, en passant included.
        if from.file() != to.file() {
            text.push(from.file_char());
            text.push('x');
        }
        text.push_str(&to.to_string());
        if let Some(promotion) = mv.get_promotion().and_then(|p| kind_of(p).san_letter()) {
            text.push('=');
            text.push(promotion);
        }
    } else {
        text.extend(kind_of(piece).san_letter());
        text.push_str(&disambiguation(board, mv, piece));
        if board.piece_on(dest).is_some() {
            text.push('x');
        }
        text.push_str(&to.to_string());
    }

    let after = board.make_move_new(mv);
    if after.status() == BoardStatus::Checkmate {
        text.push('#');
    } else if after.checkers().popcnt() > 0 {
        text.push('+');
    }
    text
}

/// Drop check, mate and annotation glyphs so notation can be compared.
pub(super) fn strip_annotations(san: &str) -> &str {
    san.trim().trim_end_matches(['+', '#', '!', '?'])
}

fn disambiguation(board: &Board, mv: ChessMove, piece: Piece) -> String {
    let from = from_chess(mv.get_source());
    let rivals = MoveGen::new_legal(board)
        .filter(|other| {
            other.get_dest() == mv.get_dest()
                && other.get_source() != mv.get_source()
                && board.piece_on(other.get_source()) == Some(piece)
        })
        .map(|other| from_chess(other.get_source()))
        .collect::<Vec<_>>();

    if rivals.is_empty() {
        String::new()
    } else if rivals.iter().all(|rival| rival.file() != from.file()) {
        from.file_char().to_string()
    } else if rivals.iter().all(|rival| rival.rank() != from.rank()) {
        from.rank_char().to_string()
    } else {
        from.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn mv(board: &Board, from: &str, to: &str) -> ChessMove {
        let from = chess::Square::from_str(from).unwrap();
        let to = chess::Square::from_str(to).unwrap();
        MoveGen::new_legal(board)
            .find(|m| m.get_source() == from && m.get_dest() == to)
            .unwrap()
    }

    #[test]
    fn knights_sharing_a_target_are_disambiguated_by_file() {
        let board = Board::from_str("4k3/8/8/8/8/5N2/8/1N2K3 w - - 0 1").unwrap();
        assert_eq!(write_san(&board, mv(&board, "b1", "d2")), "Nbd2");
        assert_eq!(write_san(&board, mv(&board, "f3", "d2")), "Nfd2");
        assert_eq!(write_san(&board, mv(&board, "f3", "e5")), "Ne5");
    }

    #[test]
    fn rooks_on_one_file_are_disambiguated_by_rank() {
        let board = Board::from_str("R7/8/7k/8/8/8/8/R3K3 w - - 0 1").unwrap();
        assert_eq!(write_san(&board, mv(&board, "a1", "a4")), "R1a4");
    }

    #[test]
    fn pawn_captures_and_castling() {
        let board =
            Board::from_str("r3k2r/pppq1ppp/8/3p4/4P3/8/PPPQ1PPP/R3K2R w KQkq - 0 1").unwrap();
        assert_eq!(write_san(&board, mv(&board, "e4", "d5")), "exd5");
        assert_eq!(write_san(&board, mv(&board, "e1", "g1")), "O-O");
        assert_eq!(write_san(&board, mv(&board, "e1", "c1")), "O-O-O");
    }

    #[test]
    fn annotations_are_stripped() {
        assert_eq!(strip_annotations("Qh4#"), "Qh4");
        assert_eq!(strip_annotations("Nf3+!?"), "Nf3");
        assert_eq!(strip_annotations(" e4 "), "e4");
    }
}
