//! Credentials that must not leak into logs.

use std::fmt;

use url::Url;

use crate::error::ConnectionError;

/// Bearer token used to authenticate the socket.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token for placing on the wire.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

impl From<String> for AuthToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for AuthToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Fully-built socket URL carrying the token in its query string.
///
/// `Debug` and `Display` mask the token value; drivers call
/// [`SocketUrl::expose`] only when dialing.
#[derive(Clone, PartialEq, Eq)]
pub struct SocketUrl(Url);

impl SocketUrl {
    /// Build `<base><path>?token=<token>`.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidUrl` if the result does not parse, or is not
    ///   a `ws`/`wss` URL
    pub fn build(base: &str, path: &str, token: &AuthToken) -> Result<Self, ConnectionError> {
        let joined = format!("{}{}", base.trim_end_matches('/'), path);
        let mut url = Url::parse(&joined).map_err(|e| ConnectionError::InvalidUrl(e.to_string()))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConnectionError::InvalidUrl(format!(
                "unsupported scheme {:?}",
                url.scheme()
            )));
        }

        url.query_pairs_mut().append_pair("token", token.expose());
        Ok(Self(url))
    }

    /// Full URL including the token.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    /// URL path without query.
    #[must_use]
    pub fn path(&self) -> &str {
        self.0.path()
    }

    /// Replace every occurrence of the full URL in `text` with its masked
    /// form. For error messages that echo the dialed address.
    #[must_use]
    pub fn redact_in(&self, text: &str) -> String {
        text.replace(self.expose(), &self.redacted())
    }

    fn redacted(&self) -> String {
        let mut url = self.0.clone();
        let pairs: Vec<(String, String)> = self
            .0
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == "token" { "***".to_string() } else { v.into_owned() };
                (k.into_owned(), v)
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        url.to_string()
    }
}

impl fmt::Debug for SocketUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SocketUrl({})", self.redacted())
    }
}

impl fmt::Display for SocketUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn token_is_appended_and_encoded() {
        let token = AuthToken::new("a b&c");
        let url = SocketUrl::build("ws://chat.test", "/ws/chat/", &token).unwrap();
        assert_eq!(url.expose(), "ws://chat.test/ws/chat/?token=a+b%26c");
        assert_eq!(url.path(), "/ws/chat/");
    }

    #[test]
    fn trailing_slash_on_base_is_not_doubled() {
        let url = SocketUrl::build("wss://chat.test/", "/ws/chat/", &AuthToken::new("t")).unwrap();
        assert_eq!(url.expose(), "wss://chat.test/ws/chat/?token=t");
    }

    #[test]
    fn formatting_never_shows_the_token() {
        let token = AuthToken::new("s3cret");
        let url = SocketUrl::build("ws://chat.test", "/ws/chat/", &token).unwrap();

        for rendered in [format!("{token:?}"), format!("{url:?}"), url.to_string()] {
            assert!(!rendered.contains("s3cret"), "leaked in {rendered}");
        }
        assert!(url.to_string().ends_with("token=***"));
    }

    #[test]
    fn echoed_urls_are_masked_in_error_text() {
        let url = SocketUrl::build("ws://chat.test", "/ws/chat/", &AuthToken::new("s3cret")).unwrap();
        let text = format!("failed to reach {} after 3s", url.expose());

        assert_eq!(url.redact_in(&text), "failed to reach ws://chat.test/ws/chat/?token=*** after 3s");
        assert_eq!(url.redact_in("connection refused"), "connection refused");
    }

    #[test]
    fn rejects_http_scheme() {
        let result = SocketUrl::build("http://chat.test", "/ws/chat/", &AuthToken::new("t"));
        assert!(matches!(result, Err(ConnectionError::InvalidUrl(_))));
    }
}
