use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use crate::dto::{
    ClockSnapshot, GameDetails, GameId, MoveItem, PostMoveRequest, decode_move_list,
};

use super::{
    GameAuthority, TerminalAction,
    credentials::CredentialSource,
    error::{ApiError, ApiResult},
};

/// [`GameAuthority`] speaking JSON over HTTP to the game service.
#[derive(Clone)]
pub struct HttpAuthority {
    client: Client,
    base_url: Arc<str>,
    credentials: Arc<dyn CredentialSource>,
}

impl HttpAuthority {
    /// Build a client for `base_url`; `timeout` bounds every request.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Arc<dyn CredentialSource>,
    ) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ApiError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            credentials,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match self.credentials.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> ApiResult<Response> {
        let response = builder.send().await.map_err(|source| ApiError::Send {
            path: path.to_string(),
            source,
        })?;
        check_status(path, response).await
    }

    async fn body(&self, path: &str) -> ApiResult<Vec<u8>> {
        let response = self.send(self.request(Method::GET, path), path).await?;
        let bytes = response.bytes().await.map_err(|source| ApiError::Send {
            path: path.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }

    async fn get_json<T>(&self, path: &str) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let body = self.body(path).await?;
        serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })
    }

    async fn post<B>(&self, path: &str, body: &B) -> ApiResult<()>
    where
        B: ?Sized + Serialize,
    {
        self.send(self.request(Method::POST, path).json(body), path)
            .await
            .map(|_| ())
    }
}

impl GameAuthority for HttpAuthority {
    fn details(&self, game: GameId) -> BoxFuture<'static, ApiResult<GameDetails>> {
        let authority = self.clone();
        Box::pin(async move {
            authority
                .get_json(&format!("games/{game}/details"))
                .await
        })
    }

    fn clock(&self, game: GameId) -> BoxFuture<'static, ApiResult<ClockSnapshot>> {
        let authority = self.clone();
        Box::pin(async move { authority.get_json(&format!("games/{game}/clock")).await })
    }

    fn moves(&self, game: GameId) -> BoxFuture<'static, ApiResult<Vec<MoveItem>>> {
        let authority = self.clone();
        Box::pin(async move {
            let body = authority.body(&format!("games/{game}/moves")).await?;
            Ok(decode_move_list(&body))
        })
    }

    fn submit_move(
        &self,
        game: GameId,
        body: PostMoveRequest,
    ) -> BoxFuture<'static, ApiResult<()>> {
        let authority = self.clone();
        Box::pin(async move {
            debug!(game, uci = %body.uci, "submitting move");
            authority.post(&format!("games/{game}/move"), &body).await
        })
    }

    fn perform(&self, game: GameId, action: TerminalAction) -> BoxFuture<'static, ApiResult<()>> {
        let authority = self.clone();
        Box::pin(async move {
            debug!(game, action = action.path(), "sending terminal action");
            authority
                .post(
                    &format!("games/{game}/{}", action.path()),
                    &Value::Object(Default::default()),
                )
                .await
        })
    }
}

/// Map non-success statuses onto [`ApiError`], keeping any explanation the
/// service put in the body.
async fn check_status(path: &str, response: Response) -> ApiResult<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::FORBIDDEN => Err(ApiError::Forbidden {
            path: path.to_string(),
        }),
        StatusCode::UNAUTHORIZED => Err(ApiError::Unauthenticated {
            path: path.to_string(),
        }),
        status => {
            let text = response.text().await.unwrap_or_default();
            Err(ApiError::Status {
                path: path.to_string(),
                status,
                message: extract_message(&text),
            })
        }
    }
}

fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(fields)) => ["error", "message", "detail"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        Ok(Value::String(text)) => Some(text),
        Ok(_) => None,
        Err(_) => Some(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_bodies_yield_a_readable_message() {
        assert_eq!(
            extract_message(r#"{"error":"not your turn"}"#).as_deref(),
            Some("not your turn")
        );
        assert_eq!(
            extract_message(r#"{"status":400,"message":"stale position"}"#).as_deref(),
            Some("stale position")
        );
        assert_eq!(
            extract_message("Illegal move").as_deref(),
            Some("Illegal move")
        );
        assert_eq!(extract_message("  "), None);
        assert_eq!(extract_message("[1,2]"), None);
    }
}
