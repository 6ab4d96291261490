//! Error types for the invex-core library.

use thiserror::Error;

/// Main error type for the invex library.
#[derive(Error, Debug)]
pub enum InvexError {
    /// Text materialization error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Model response could not be coerced into a record.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Language-model or vision provider error.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// File source error.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Record store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while turning document bytes into text.
///
/// These never abort a document; the dispatcher records them as a string
/// and the document continues with empty text.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Pdf(String),

    /// The PDF is encrypted with a non-empty password.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Spreadsheet could not be opened or read.
    #[error("failed to read spreadsheet: {0}")]
    Spreadsheet(String),

    /// CSV could not be parsed.
    #[error("failed to read CSV: {0}")]
    Csv(String),

    /// Office document container or XML was malformed.
    #[error("failed to read document: {0}")]
    Document(String),

    /// Image was handed over but no vision chain is configured.
    #[error("no vision backend configured for image {0}")]
    NoVision(String),

    /// Every vision tier failed or returned nothing.
    #[error("vision chain produced no text for {0}")]
    VisionExhausted(String),

    /// File type is not handled by any extractor.
    #[error("unsupported file type: {0}")]
    Unsupported(String),
}

/// A model response that cannot be turned into a JSON object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Response was blank.
    #[error("empty model response")]
    Empty,

    /// No JSON object could be recovered from the response.
    #[error("no JSON object in model response: {0}")]
    NoObject(String),
}

/// Errors from text or vision providers.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Provider is missing credentials or failed to initialize.
    #[error("provider {0} is not configured")]
    NotConfigured(String),

    /// Provider answered with a rate-limit response.
    #[error("provider {provider} is rate limited")]
    RateLimited { provider: String },

    /// Provider does not serve the requested model.
    #[error("provider {provider} does not support model {model}")]
    UnsupportedModel { provider: String, model: String },

    /// Non-success HTTP status.
    #[error("provider {provider} returned status {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    /// Network or decoding failure.
    #[error("provider {provider} request failed: {message}")]
    Transport { provider: String, message: String },

    /// Provider answered without any text.
    #[error("provider {0} returned an empty response")]
    EmptyResponse(String),

    /// Local OCR engine failure.
    #[error("local OCR failed: {0}")]
    Ocr(String),

    /// Every configured provider failed for one call.
    #[error("all providers failed: {}", .0.join("; "))]
    Exhausted(Vec<String>),
}

/// Errors from the file source collaborator.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Remote call answered with a non-success status.
    #[error("{operation} failed with status {status}: {message}")]
    Status {
        operation: String,
        status: u16,
        message: String,
    },

    /// File or folder does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the record store.
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Database directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be decoded.
    #[error("corrupt column {column}: {value}")]
    Corrupt { column: String, value: String },

    /// Internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Errors that carry an optional transport status code, used by the retry
/// utility to decide whether a failure is worth another attempt.
pub trait StatusCode {
    /// HTTP-like status code, if the failure came from a remote call.
    fn status_code(&self) -> Option<u16>;
}

impl StatusCode for SourceError {
    fn status_code(&self) -> Option<u16> {
        match self {
            SourceError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl StatusCode for ProviderError {
    fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::RateLimited { .. } => Some(429),
            ProviderError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for the invex library.
pub type Result<T> = std::result::Result<T, InvexError>;

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_codes() {
        let err = SourceError::Status {
            operation: "download".into(),
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(SourceError::NotFound("x".into()).status_code(), None);

        let limited = ProviderError::RateLimited { provider: "gemini".into() };
        assert_eq!(limited.status_code(), Some(429));
    }

    #[test]
    fn test_exhausted_message_lists_failures() {
        let err = ProviderError::Exhausted(vec!["a: down".into(), "b: down".into()]);
        assert_eq!(err.to_string(), "all providers failed: a: down; b: down");
    }
}
