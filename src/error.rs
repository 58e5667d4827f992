use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown mode '{0}' (expected 'serve' or 'record')")]
    UnknownMode(String),
}

/// Errors raised while ingesting or relaying one session's audio
///
/// None of these tear the session down; a failed chunk or adapter call
/// degrades to a gap in the transcript.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Malformed audio chunk: {0}")]
    BadChunk(#[from] base64::DecodeError),

    #[error("Failed to append audio to segment store: {0}")]
    Ingestion(#[from] std::io::Error),
}

/// Errors from the external speech-to-text service
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Invalid speech service URL: {0}")]
    BadUrl(#[from] url::ParseError),

    #[error("Speech service request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Speech service error ({status}): {message}")]
    ServerError { status: u16, message: String },
}
