//! Messaging REST client.
//!
//! Implements [`MessagingApi`] over reqwest against the messaging endpoints:
//!
//! - `GET  /api/messaging/messages/?conversation_id=<id>`
//! - `POST /api/messaging/messages/`
//! - `POST /api/messaging/messages/<id>/mark_as_read/`
//! - `GET  /api/messaging/conversation-with-user/<user_id>/`
//!
//! Every request carries `Authorization: Bearer <token>` read from the token
//! store at call time, so a token replaced mid-session is picked up by the
//! next request.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use rendezvous_client::{
    ApiError, ConversationSummary, MessagingApi, SendMessageRequest, TokenStore, TokenStoreError,
};
use rendezvous_proto::{ConversationId, MessageId, WireMessage};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;
use url::Url;

/// Path prefix of the messaging app.
pub const API_PREFIX: &str = "/api/messaging";

/// Longest response body kept in an error.
const MAX_ERROR_BODY: usize = 512;

/// REST client errors.
#[derive(Debug, Error)]
pub enum RestError {
    /// No token in the store
    #[error("not logged in")]
    MissingToken,

    /// Token store failed
    #[error("token store: {0}")]
    TokenStore(#[from] TokenStoreError),

    /// Endpoint URL could not be built
    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    /// Request failed before a response arrived
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status
    #[error("server returned {status}: {body}")]
    Status {
        /// Response status
        status: StatusCode,
        /// Response body, truncated
        body: String,
    },

    /// Response body did not decode
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<RestError> for ApiError {
    fn from(err: RestError) -> Self {
        match err {
            RestError::MissingToken => Self::Unauthorized,
            RestError::Status { status, .. } if status == StatusCode::UNAUTHORIZED => {
                Self::Unauthorized
            },
            RestError::Status { status, body } => Self::Status { status: status.as_u16(), body },
            RestError::Http(e) if e.is_timeout() => Self::Timeout,
            RestError::Http(e) if e.is_decode() => Self::Decode(e.to_string()),
            RestError::Http(e) => Self::Transport(e.to_string()),
            RestError::Decode(e) => Self::Decode(e.to_string()),
            RestError::TokenStore(e) => Self::Transport(e.to_string()),
            RestError::Url(e) => Self::Transport(e.to_string()),
        }
    }
}

/// History comes back either bare or wrapped by the paginator.
#[derive(Deserialize)]
#[serde(untagged)]
enum MessagePage {
    Paginated { results: Vec<WireMessage> },
    Plain(Vec<WireMessage>),
}

impl MessagePage {
    fn into_messages(self) -> Vec<WireMessage> {
        match self {
            Self::Paginated { results } | Self::Plain(results) => results,
        }
    }
}

/// reqwest-backed [`MessagingApi`].
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl RestClient {
    /// Client for the API served at `base_url`, e.g. `http://127.0.0.1:8000`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse or the HTTP client
    /// cannot be built.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, RestError> {
        Url::parse(base_url)?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string(), tokens })
    }

    /// Absolute URL of a messaging endpoint.
    pub fn endpoint(&self, path: &str) -> Result<Url, RestError> {
        Ok(Url::parse(&format!("{}{API_PREFIX}{path}", self.base_url))?)
    }

    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, RestError> {
        let token = self.tokens.get().await?.ok_or(RestError::MissingToken)?;
        Ok(self.http.request(method, url).bearer_auth(token.expose()))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RestError> {
        let bytes = Self::checked(request).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn checked(request: RequestBuilder) -> Result<Vec<u8>, RestError> {
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if status.is_success() {
            return Ok(bytes.to_vec());
        }

        let mut body = String::from_utf8_lossy(&bytes).into_owned();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY).rev().find(|&i| body.is_char_boundary(i)).unwrap_or(0);
            body.truncate(cut);
        }
        tracing::debug!(%status, "REST request rejected");
        Err(RestError::Status { status, body })
    }

    async fn fetch_messages(&self, conversation_id: ConversationId) -> Result<Vec<WireMessage>, RestError> {
        let mut url = self.endpoint("/messages/")?;
        url.query_pairs_mut().append_pair("conversation_id", &conversation_id.to_string());

        let request = self.request(Method::GET, url).await?;
        let page: MessagePage = self.send_json(request).await?;
        Ok(page.into_messages())
    }

    async fn post_message(&self, body: &SendMessageRequest) -> Result<WireMessage, RestError> {
        let url = self.endpoint("/messages/")?;
        let request = self.request(Method::POST, url).await?.json(body);
        self.send_json(request).await
    }

    async fn post_mark_read(&self, message_id: &MessageId) -> Result<(), RestError> {
        let url = self.endpoint(&format!("/messages/{message_id}/mark_as_read/"))?;
        let request = self.request(Method::POST, url).await?;
        Self::checked(request).await.map(drop)
    }

    async fn fetch_conversation_with(&self, user_id: u64) -> Result<ConversationSummary, RestError> {
        let url = self.endpoint(&format!("/conversation-with-user/{user_id}/"))?;
        let request = self.request(Method::GET, url).await?;
        self.send_json(request).await
    }
}

#[async_trait]
impl MessagingApi for RestClient {
    async fn get_messages(&self, conversation_id: ConversationId) -> Result<Vec<WireMessage>, ApiError> {
        Ok(self.fetch_messages(conversation_id).await?)
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<WireMessage, ApiError> {
        Ok(self.post_message(request).await?)
    }

    async fn mark_message_as_read(&self, message_id: &MessageId) -> Result<(), ApiError> {
        Ok(self.post_mark_read(message_id).await?)
    }

    async fn get_conversation_with_user(&self, user_id: u64) -> Result<ConversationSummary, ApiError> {
        Ok(self.fetch_conversation_with(user_id).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rendezvous_core::AuthToken;

    use super::*;

    struct FixedToken(Option<&'static str>);

    #[async_trait]
    impl TokenStore for FixedToken {
        async fn get(&self) -> Result<Option<AuthToken>, TokenStoreError> {
            Ok(self.0.map(AuthToken::new))
        }

        async fn set(&self, _token: &AuthToken) -> Result<(), TokenStoreError> {
            Ok(())
        }

        async fn delete(&self) -> Result<(), TokenStoreError> {
            Ok(())
        }
    }

    fn client(token: Option<&'static str>) -> RestClient {
        RestClient::new("http://127.0.0.1:8000/", Duration::from_secs(10), Arc::new(FixedToken(token)))
            .unwrap()
    }

    #[test]
    fn endpoints_sit_under_messaging_prefix() {
        let client = client(Some("T"));

        assert_eq!(
            client.endpoint("/messages/987/mark_as_read/").unwrap().as_str(),
            "http://127.0.0.1:8000/api/messaging/messages/987/mark_as_read/"
        );
        assert_eq!(
            client.endpoint("/conversation-with-user/7/").unwrap().as_str(),
            "http://127.0.0.1:8000/api/messaging/conversation-with-user/7/"
        );
    }

    #[test]
    fn rejects_unparseable_base() {
        let result = RestClient::new("not a url", Duration::from_secs(1), Arc::new(FixedToken(None)));
        assert!(matches!(result, Err(RestError::Url(_))));
    }

    #[test]
    fn history_accepts_paginated_and_bare_lists() {
        let message = r#"{"id": 1, "sender": 7, "content": "hi", "created_at": "2023-11-14T22:13:20Z"}"#;

        let paginated: MessagePage =
            serde_json::from_str(&format!(r#"{{"count": 1, "next": null, "results": [{message}]}}"#))
                .unwrap();
        let bare: MessagePage = serde_json::from_str(&format!("[{message}]")).unwrap();

        assert_eq!(paginated.into_messages(), bare.into_messages());
    }

    #[test]
    fn status_errors_map_to_api_errors() {
        let unauthorized = RestError::Status { status: StatusCode::UNAUTHORIZED, body: String::new() };
        assert_eq!(ApiError::from(unauthorized), ApiError::Unauthorized);

        let missing = ApiError::from(RestError::Status {
            status: StatusCode::NOT_FOUND,
            body: "gone".to_string(),
        });
        assert_eq!(missing, ApiError::Status { status: 404, body: "gone".to_string() });

        assert_eq!(ApiError::from(RestError::MissingToken), ApiError::Unauthorized);
    }

    #[tokio::test]
    async fn requests_without_token_are_unauthorized() {
        let result = client(None).get_messages(ConversationId(42)).await;
        assert_eq!(result, Err(ApiError::Unauthorized));
    }
}
