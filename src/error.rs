use std::io;
use thiserror::Error;

/// Errors surfaced to the immediate caller. None of them are fatal to the
/// process and nothing in this crate retries on its own.
#[derive(Error, Debug)]
pub enum ToneError {
    /// The asset could not be retrieved (network or filesystem).
    #[error("Fetch failed for '{path}': {reason}")]
    Fetch { path: String, reason: String },

    /// The asset bytes could not be decoded into a sample buffer.
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Microphone or playback device denied, missing or failed to open.
    #[error("Device acquisition failed: {0}")]
    DeviceAcquisition(String),

    /// A sample buffer was constructed from inconsistent parts.
    #[error("Invalid sample buffer: {0}")]
    InvalidBuffer(String),

    /// Configuration could not be read, parsed or validated.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An offline render task did not run to completion.
    #[error("Render error: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ToneError>;

impl ToneError {
    pub(crate) fn fetch(path: impl Into<String>, reason: impl ToString) -> Self {
        ToneError::Fetch {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for ToneError {
    fn from(e: serde_json::Error) -> Self {
        ToneError::Config(e.to_string())
    }
}

#[cfg(feature = "decode")]
impl From<hound::Error> for ToneError {
    fn from(e: hound::Error) -> Self {
        ToneError::Decode(e.to_string())
    }
}

#[cfg(feature = "assets")]
impl From<tokio::task::JoinError> for ToneError {
    fn from(e: tokio::task::JoinError) -> Self {
        ToneError::Render(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_names_path() {
        let err = ToneError::fetch("/audio/anthem.mp3", "404 Not Found");
        assert_eq!(
            err.to_string(),
            "Fetch failed for '/audio/anthem.mp3': 404 Not Found"
        );
    }

    #[test]
    fn json_errors_become_config_errors() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("not json");
        let err: ToneError = parse.unwrap_err().into();
        assert!(matches!(err, ToneError::Config(_)));
    }
}
