use std::env;

use tracing::warn;

use crate::dto::UserId;

/// Environment variable holding the bearer token.
const TOKEN_ENV: &str = "LIVE_MATCH_ACCESS_TOKEN";
/// Older variable name still honoured when [`TOKEN_ENV`] is unset.
const LEGACY_TOKEN_ENV: &str = "LIVE_MATCH_JWT";
/// Environment variable holding the numeric id of the local user.
const USER_ID_ENV: &str = "LIVE_MATCH_USER_ID";

/// Supplies the bearer credential and the identity of the local user.
///
/// Passed explicitly into the authority client and the session so nothing reads
/// ambient session state.
pub trait CredentialSource: Send + Sync {
    /// Token attached as `Authorization: Bearer ...`, if signed in.
    fn bearer_token(&self) -> Option<String>;
    /// Identity of the local user, `None` when browsing anonymously.
    fn user_id(&self) -> Option<UserId>;
}

/// Credentials fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    token: Option<String>,
    user_id: Option<UserId>,
}

impl StaticCredentials {
    /// Build credentials from explicit values.
    pub fn new(token: Option<String>, user_id: Option<UserId>) -> Self {
        Self { token, user_id }
    }

    /// Read the token and user id from the environment.
    pub fn from_env() -> Self {
        let token = env::var(TOKEN_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| {
                env::var(LEGACY_TOKEN_ENV)
                    .ok()
                    .filter(|value| !value.trim().is_empty())
            });
        let user_id = env::var(USER_ID_ENV)
            .ok()
            .and_then(|value| parse_user_id(&value));
        Self { token, user_id }
    }
}

/// Parse a configured user id; a malformed value is reported and treated as
/// no identity.
fn parse_user_id(raw: &str) -> Option<UserId> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(id) => Some(id),
        Err(err) => {
            warn!(
                variable = USER_ID_ENV,
                value = raw,
                error = %err,
                "ignoring malformed user id; watching as a spectator"
            );
            None
        }
    }
}

impl CredentialSource for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn user_id(&self) -> Option<UserId> {
        self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_ids_parse_or_fall_back_to_spectator() {
        assert_eq!(parse_user_id(" 42 "), Some(42));
        assert_eq!(parse_user_id(""), None);
        assert_eq!(parse_user_id("alice"), None);
    }
}
