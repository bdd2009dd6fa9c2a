//! Stream Codec
//!
//! Decodes text frames from the streaming socket into [`FeedMessage`]s.
//! A frame that fails to decode is discarded by the caller; the connection
//! stays up.

use super::messages::FeedMessage;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is not a JSON object.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    /// Trade carried a NaN or infinite price.
    #[error("non-finite price for {0}")]
    NonFinitePrice(String),
}

/// JSON codec for the streaming socket.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedCodec;

impl FeedCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object, does not match a
    /// known shape, or carries a non-finite price.
    pub fn decode(&self, text: &str) -> Result<FeedMessage, CodecError> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {preview}"
            )));
        }

        let message: FeedMessage = serde_json::from_str(trimmed)?;

        if let FeedMessage::Trade { data } = &message
            && let Some(bad) = data.iter().find(|tick| !tick.price.is_finite())
        {
            return Err(CodecError::NonFinitePrice(bad.symbol.clone()));
        }

        Ok(message)
    }
}
