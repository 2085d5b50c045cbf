//! Remote authority seam: the request/response endpoints of the game service and
//! the credential source attached to every request.

/// Bearer credentials and local identity.
pub mod credentials;
/// Failures talking to the authority.
pub mod error;
/// reqwest-backed implementation of [`GameAuthority`].
pub mod http;

use futures::future::BoxFuture;

use crate::dto::{ClockSnapshot, GameDetails, GameId, MoveItem, PostMoveRequest};

pub use self::credentials::{CredentialSource, StaticCredentials};
pub use self::error::{ApiError, ApiResult};
pub use self::http::HttpAuthority;

/// Game-ending or draw-negotiation request sent to the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalAction {
    /// `POST /games/{id}/resign`.
    Resign,
    /// `POST /games/{id}/draw/offer`.
    OfferDraw,
    /// `POST /games/{id}/draw/accept`.
    AcceptDraw,
    /// `POST /games/{id}/draw/decline`.
    DeclineDraw,
}

impl TerminalAction {
    /// Path segment below `/games/{id}/`.
    pub fn path(self) -> &'static str {
        match self {
            TerminalAction::Resign => "resign",
            TerminalAction::OfferDraw => "draw/offer",
            TerminalAction::AcceptDraw => "draw/accept",
            TerminalAction::DeclineDraw => "draw/decline",
        }
    }
}

/// Abstraction over the remote service holding the canonical game state.
///
/// Futures are `'static` so callers can move them into spawned tasks.
pub trait GameAuthority: Send + Sync {
    /// `GET /games/{id}/details`.
    fn details(&self, game: GameId) -> BoxFuture<'static, ApiResult<GameDetails>>;
    /// `GET /games/{id}/clock`.
    fn clock(&self, game: GameId) -> BoxFuture<'static, ApiResult<ClockSnapshot>>;
    /// `GET /games/{id}/moves`; malformed bodies yield an empty list.
    fn moves(&self, game: GameId) -> BoxFuture<'static, ApiResult<Vec<MoveItem>>>;
    /// `POST /games/{id}/move`.
    fn submit_move(&self, game: GameId, body: PostMoveRequest)
    -> BoxFuture<'static, ApiResult<()>>;
    /// `POST` one of the terminal action endpoints.
    fn perform(&self, game: GameId, action: TerminalAction) -> BoxFuture<'static, ApiResult<()>>;
}
