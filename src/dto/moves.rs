use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnNull, VecSkipError, serde_as};
use tracing::warn;

/// One confirmed move as listed by `GET /games/{id}/moves`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveItem {
    /// Ledger entry id.
    #[serde(default)]
    pub id: i64,
    /// One-based half-move index.
    #[serde(default)]
    pub ply: u32,
    /// Standard algebraic notation.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub san: String,
    /// Coordinate form.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub uci: String,
    /// Position after the move; preferred over replaying `san`.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub fen_after: String,
    /// Time spent on the move.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub played_ms: i64,
}

/// Body of `POST /games/{id}/move`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMoveRequest {
    /// Standard algebraic notation.
    pub san: String,
    /// Coordinate form.
    pub uci: String,
    /// Position after the move.
    pub fen_after: String,
    /// Time spent on the move; always sent as 0.
    pub played_ms: i64,
}

#[serde_as]
#[derive(Deserialize)]
#[serde(transparent)]
struct MoveList(#[serde_as(as = "VecSkipError<_>")] Vec<MoveItem>);

/// Decode a move list body, coercing anything that is not an array to an empty list
/// and skipping individual entries that do not decode.
pub fn decode_move_list(body: &[u8]) -> Vec<MoveItem> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Vec::new();
    }

    match serde_json::from_slice::<MoveList>(body) {
        Ok(MoveList(moves)) => moves,
        Err(err) => {
            warn!(error = %err, "move list payload is not an array; treating as empty");
            Vec::new()
        }
    }
}
