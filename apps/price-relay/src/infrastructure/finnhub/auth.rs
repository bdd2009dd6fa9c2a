//! Finnhub Access Token
//!
//! Finnhub authenticates both the streaming socket and the quote API with a
//! single token passed as a `token` query parameter. There is no handshake:
//! a bad token is only detectable before connecting, so the checks here are
//! the entire startup validation.

use thiserror::Error;

/// Placeholder value shipped in sample configuration.
pub const PLACEHOLDER_TOKEN: &str = "YOUR_FINNHUB_API_KEY_HERE";

/// Shortest token accepted as plausibly real.
pub const MIN_TOKEN_LEN: usize = 5;

/// Reasons a token is unusable. All of them are fatal to feed startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No token configured.
    #[error("access token is missing")]
    Missing,

    /// Token is empty or whitespace.
    #[error("access token is empty")]
    Empty,

    /// Token is the sample placeholder.
    #[error("access token is the placeholder value")]
    Placeholder,

    /// Token is too short to be real.
    #[error("access token is too short ({0} characters)")]
    TooShort(usize),
}

/// Validated upstream access token.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    /// Validate a configured token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if the token is missing, empty, the placeholder,
    /// or shorter than [`MIN_TOKEN_LEN`].
    pub fn parse(raw: Option<&str>) -> Result<Self, AuthError> {
        let token = raw.ok_or(AuthError::Missing)?.trim();

        if token.is_empty() {
            return Err(AuthError::Empty);
        }
        if token == PLACEHOLDER_TOKEN {
            return Err(AuthError::Placeholder);
        }
        let len = token.chars().count();
        if len < MIN_TOKEN_LEN {
            return Err(AuthError::TooShort(len));
        }

        Ok(Self(token.to_string()))
    }

    /// The raw token, for building request URLs.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First four characters, safe to log.
    #[must_use]
    pub fn prefix(&self) -> String {
        self.0.chars().take(4).collect()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AccessToken").field(&"[REDACTED]").finish()
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(None, AuthError::Missing ; "missing")]
    #[test_case(Some(""), AuthError::Empty ; "empty")]
    #[test_case(Some("   "), AuthError::Empty ; "whitespace")]
    #[test_case(Some("YOUR_FINNHUB_API_KEY_HERE"), AuthError::Placeholder ; "placeholder")]
    #[test_case(Some("abcd"), AuthError::TooShort(4) ; "too short")]
    fn rejects_unusable_tokens(raw: Option<&str>, expected: AuthError) {
        assert_eq!(AccessToken::parse(raw).unwrap_err(), expected);
    }

    #[test]
    fn accepts_plausible_token() {
        let token = AccessToken::parse(Some(" abcde12345 ")).unwrap();
        assert_eq!(token.expose(), "abcde12345");
        assert_eq!(token.prefix(), "abcd");
    }

    #[test]
    fn debug_is_redacted() {
        let token = AccessToken::parse(Some("supersecret")).unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
