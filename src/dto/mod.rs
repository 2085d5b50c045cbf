//! Wire representations of the authority's JSON payloads.

/// Game details, clock snapshots and lifecycle status.
pub mod game;
/// Move ledger entries and move submission bodies.
pub mod moves;

pub use game::{ClockSnapshot, GameDetails, GameId, LifecycleStatus, UserId};
pub use moves::{MoveItem, PostMoveRequest, decode_move_list};
