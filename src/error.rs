//! Error types for the signing library.
//!
//! Granular variants describe what went wrong; [`Error::kind`] collapses them
//! onto the four failure classes the service boundary distinguishes.

/// Result type alias for signing library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure class exposed to the service boundary.
///
/// Callers route on this rather than matching individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input was not a processable PDF document
    InvalidDocument,
    /// Reserved signature capacity cannot hold what must go in it
    PlaceholderOverflow,
    /// Cryptographic signing failed or its output did not fit
    SigningFailure,
    /// The signing identity could not be loaded at startup
    IdentityLoadFailure,
    /// Internal error (I/O, encoding)
    Internal,
}

/// Error types that can occur while preparing or signing a document.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where the error occurred
        offset: usize,
        /// Reason for the parse failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Referenced object not found in the document
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Unexpected end of file
    #[error("End of file reached unexpectedly")]
    UnexpectedEof,

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Document feature this pipeline does not handle
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Reserved placeholder capacity is insufficient
    #[error("Placeholder overflow: {needed} bytes needed, {capacity} reserved")]
    PlaceholderOverflow {
        /// Bytes that would have to fit
        needed: usize,
        /// Bytes actually reserved
        capacity: usize,
    },

    /// Cryptographic signing failed
    #[error("Signing failed: {0}")]
    SigningFailure(String),

    /// Signing identity could not be loaded
    #[error("Failed to load signing identity: {0}")]
    IdentityLoadFailure(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 decoding error
    #[error("UTF-8 decoding error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),
}

impl Error {
    /// Map this error onto the failure class the boundary reports.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidHeader(_)
            | Error::ParseError { .. }
            | Error::InvalidXref
            | Error::ObjectNotFound(_, _)
            | Error::InvalidObjectType { .. }
            | Error::UnexpectedEof
            | Error::InvalidPdf(_)
            | Error::Unsupported(_) => ErrorKind::InvalidDocument,
            Error::PlaceholderOverflow { .. } => ErrorKind::PlaceholderOverflow,
            Error::SigningFailure(_) => ErrorKind::SigningFailure,
            Error::IdentityLoadFailure(_) => ErrorKind::IdentityLoadFailure,
            Error::Io(_) | Error::Utf8Error(_) => ErrorKind::Internal,
        }
    }
}
