//! Unified error types for mu-odf
//!
//! Provides a top-level `OdfError` that wraps module-specific errors,
//! plus `From` impls so `?` works across module boundaries.

use std::fmt;

/// Top-level error type for mu-odf operations
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OdfError {
    /// Input is not a readable ZIP archive (too short, no central directory, or no entries)
    NotAZipArchive,
    /// ZIP archive error
    Zip(ZipError),
    /// Path is empty, escapes the package, or is otherwise unusable as an internal key
    InvalidPath(String),
    /// XML parse or serialization error
    Xml(String),
    /// I/O error (description only, since `std::io::Error` is not `Clone`)
    Io(String),
    /// Path is maintained by the package itself and cannot be written directly
    ReservedPath(String),
    /// URI scheme is not supported for insertion
    UnsupportedUri(String),
    /// Package has been closed
    Closed,
    /// Directory carries no document media type and cannot be embedded
    NotADocument(String),
}

impl fmt::Display for OdfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OdfError::NotAZipArchive => write!(f, "Input is not a ZIP archive"),
            OdfError::Zip(kind) => write!(f, "ZIP error: {}", kind),
            OdfError::InvalidPath(path) => write!(f, "Invalid package path: '{}'", path),
            OdfError::Xml(msg) => write!(f, "XML error: {}", msg),
            OdfError::Io(msg) => write!(f, "I/O error: {}", msg),
            OdfError::ReservedPath(path) => {
                write!(f, "Path '{}' is maintained by the package", path)
            }
            OdfError::UnsupportedUri(uri) => write!(f, "Unsupported URI: {}", uri),
            OdfError::Closed => write!(f, "Package has been closed"),
            OdfError::NotADocument(path) => write!(f, "'{}' is not a document", path),
        }
    }
}

/// ZIP-specific error variants
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ZipErrorKind {
    /// File not found in archive
    FileNotFound,
    /// Invalid ZIP format
    InvalidFormat,
    /// Archive parsed but contains no entries
    EmptyArchive,
    /// Unsupported compression method
    UnsupportedCompression,
    /// Decompression failed
    DecompressError,
    /// CRC32 mismatch
    CrcMismatch,
    /// File exceeds maximum allowed size
    FileTooLarge,
    /// Entry or archive exceeds the 32-bit ZIP limits
    EntryTooLarge(String),
    /// ZIP64 structures are present but unsupported
    UnsupportedZip64,
}

/// Public ZIP error type alias used across the crate API.
pub type ZipError = ZipErrorKind;

impl fmt::Display for ZipErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZipErrorKind::FileNotFound => write!(f, "file not found in archive"),
            ZipErrorKind::InvalidFormat => write!(f, "invalid ZIP format"),
            ZipErrorKind::EmptyArchive => write!(f, "archive has no entries"),
            ZipErrorKind::UnsupportedCompression => write!(f, "unsupported compression method"),
            ZipErrorKind::DecompressError => write!(f, "decompression failed"),
            ZipErrorKind::CrcMismatch => write!(f, "CRC32 checksum mismatch"),
            ZipErrorKind::FileTooLarge => write!(f, "file too large"),
            ZipErrorKind::EntryTooLarge(name) => {
                write!(f, "entry '{}' exceeds 32-bit ZIP limits", name)
            }
            ZipErrorKind::UnsupportedZip64 => write!(f, "ZIP64 is not supported"),
        }
    }
}

impl std::error::Error for OdfError {}

impl std::error::Error for ZipErrorKind {}

impl From<ZipError> for OdfError {
    fn from(err: ZipError) -> Self {
        OdfError::Zip(err)
    }
}

impl From<std::io::Error> for OdfError {
    fn from(err: std::io::Error) -> Self {
        OdfError::Io(err.to_string())
    }
}

impl From<quick_xml::Error> for OdfError {
    fn from(err: quick_xml::Error) -> Self {
        OdfError::Xml(err.to_string())
    }
}
