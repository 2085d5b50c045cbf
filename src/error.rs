use thiserror::Error;

use crate::{api::ApiError, dto::GameId};

/// Fatal failures while setting up or driving a match session.
///
/// Everything that happens during normal polling is recovered locally; only
/// these end the session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No game identity was supplied.
    #[error("no game id given (pass it as the first argument or set LIVE_MATCH_GAME_ID)")]
    MissingGameId,
    /// The supplied game identity is not a positive number.
    #[error("invalid game id `{0}`")]
    InvalidGameId(String),
    /// The authority client could not be built.
    #[error("failed to set up the authority client")]
    Client(#[from] ApiError),
    /// The session task is gone.
    #[error("match session has stopped")]
    Closed,
}

/// Parse a game identity supplied on the command line or in the environment.
pub fn parse_game_id(raw: Option<&str>) -> Result<GameId, SessionError> {
    let raw = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(SessionError::MissingGameId)?;
    match raw.parse::<GameId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(SessionError::InvalidGameId(raw.to_string())),
    }
}
