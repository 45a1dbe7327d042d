//! Crate-wide error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("expected 10 lines in RECORDING_END payload but got {got}. Payload: {payload}")]
    PayloadFieldCount { got: usize, payload: String },

    #[error("error parsing line {line} of RECORDING_END payload as an int. Line contents: {contents}. Error: {source}")]
    PayloadNumber {
        line: usize,
        contents: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("cache mismatch for {0}")]
    CacheMiss(String),

    /// Anything that went wrong talking to the transcoding engine. Deliberately
    /// a single variant: callers only need the message for logs and callbacks.
    #[error("transcode protocol error: {0}")]
    Protocol(String),

    #[error("media server error: {0}")]
    MediaServer(String),

    #[error("status callback error: {0}")]
    Callback(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("unsupported location: {0}")]
    UnsupportedLocation(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Malformed input is the only class rejected back to the sender.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Error::PayloadFieldCount { .. } | Error::PayloadNumber { .. } | Error::Validation(_)
        )
    }
}
