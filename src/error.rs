//! Error types for LZMA coding operations.

use std::io;
use thiserror::Error;

/// The error type for LZMA compression and decompression.
#[derive(Debug, Error)]
pub enum LzmaError {
    /// I/O error from the underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed 13-byte stream header.
    #[error("invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// The range-coded payload decoded to an impossible value.
    #[error("corrupt stream at byte {offset}: {message}")]
    CorruptStream {
        /// Uncompressed byte offset where the corruption was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// The input ended before the decoder had enough bytes.
    #[error("unexpected end of input: expected {expected} more bytes")]
    UnexpectedEof {
        /// Number of bytes that were expected but not available.
        expected: usize,
    },

    /// Encoder option outside its valid range.
    #[error("invalid option: {message}")]
    InvalidOption {
        /// Description of the rejected option.
        message: String,
    },
}

/// Result type alias for LZMA operations.
pub type Result<T> = std::result::Result<T, LzmaError>;

impl LzmaError {
    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create a corrupt stream error.
    pub fn corrupt(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptStream {
            offset,
            message: message.into(),
        }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(expected: usize) -> Self {
        Self::UnexpectedEof { expected }
    }

    /// Create an invalid option error.
    pub fn invalid_option(message: impl Into<String>) -> Self {
        Self::InvalidOption {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LzmaError::invalid_header("property byte 230 out of range");
        assert!(err.to_string().contains("invalid header"));

        let err = LzmaError::corrupt(42, "distance exceeds dictionary");
        assert!(err.to_string().contains("byte 42"));

        let err = LzmaError::unexpected_eof(5);
        assert!(err.to_string().contains("5 more bytes"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let err: LzmaError = io_err.into();
        assert!(matches!(err, LzmaError::Io(_)));
    }
}
