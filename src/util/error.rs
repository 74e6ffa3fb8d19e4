//! Error types for the spikeio library.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::{Frame, UnitId};

/// Coarse classification of an [`Error`].
///
/// `Config` and `Schema` errors are fatal to the operation that raised them.
/// `Range` errors are local to one call and leave cached state untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Naming convention violated or required artifact missing.
    Config,
    /// Structure-array or store shape inconsistency.
    Schema,
    /// Unknown unit or unsatisfiable frame window.
    Range,
    /// Malformed bytes in an input file.
    Format,
    /// Underlying I/O failure.
    Io,
}

/// Main error type for spikeio operations.
#[derive(Error, Debug)]
pub enum Error {
    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Directory name does not follow the format's naming rule
    #[error("Invalid folder name {path:?}: {rule}")]
    InvalidFolderName { path: PathBuf, rule: String },

    /// A file the format cannot be read without is absent
    #[error("Missing required artifact {name} in {dir:?}")]
    MissingArtifact { name: String, dir: PathBuf },

    /// Required key absent from a format config file
    #[error("Missing config key: {0}")]
    MissingConfigKey(String),

    /// Columns of one structure array have different record counts
    #[error("Struct field {field} has {actual} records, expected {expected}")]
    ColumnLengthMismatch { field: String, expected: usize, actual: usize },

    /// Records of one structure array have different field names
    #[error("Struct record {index} has fields {actual:?}, expected {expected:?}")]
    HeterogeneousRecord { index: usize, expected: Vec<String>, actual: Vec<String> },

    /// A required field is missing from a record
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Feature length differs from the unit's event count
    #[error("Feature {name} of unit {unit} has {actual} values, expected {expected}")]
    FeatureLength { unit: UnitId, name: String, expected: usize, actual: usize },

    /// Per-unit value count differs from the number of units
    #[error("Property {name} has {actual} values for {expected} units")]
    PropertyCount { name: String, expected: usize, actual: usize },

    /// A property was set with a different kind than earlier units
    #[error("Property {name} is {expected} but got {actual}")]
    PropertyKind { name: String, expected: String, actual: String },

    /// Unit ids passed to a store were not unique
    #[error("Duplicate unit id: {0}")]
    DuplicateUnit(UnitId),

    /// Unit id not present in the store
    #[error("Unknown unit id {unit}; valid ids are {valid:?}")]
    UnknownUnit { unit: UnitId, valid: Vec<UnitId> },

    /// Requested window does not overlap the unit's frame range
    #[error("Window [{start:?}, {end:?}) lies outside frames {min}..={max}")]
    InvalidWindow { start: Option<Frame>, end: Option<Frame>, min: Frame, max: Frame },

    /// Property not found by name
    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    /// Feature not found by name
    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    /// Key not found in a container group
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// A reference-typed dataset was read as plain values
    #[error("Dataset at {0:#x} holds references, not values")]
    ReferenceTyped(u64),

    /// Type mismatch when reading data
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Invalid magic bytes at start of file
    #[error("Invalid {0} file: bad magic bytes")]
    InvalidMagic(&'static str),

    /// Unsupported file format version
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    /// File is truncated or corrupted
    #[error("Unexpected end of file at position {0}")]
    UnexpectedEof(u64),

    /// Invalid data structure in file
    #[error("Invalid file structure: {0}")]
    InvalidStructure(String),

    /// Child index out of bounds
    #[error("Child index {index} out of bounds (count: {count})")]
    ChildOutOfBounds { index: usize, count: usize },

    /// Write operation failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MmapFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileNotFound(_)
            | Self::InvalidFolderName { .. }
            | Self::MissingArtifact { .. }
            | Self::MissingConfigKey(_) => ErrorKind::Config,

            Self::ColumnLengthMismatch { .. }
            | Self::HeterogeneousRecord { .. }
            | Self::FieldNotFound(_)
            | Self::FeatureLength { .. }
            | Self::PropertyCount { .. }
            | Self::PropertyKind { .. }
            | Self::DuplicateUnit(_) => ErrorKind::Schema,

            Self::UnknownUnit { .. }
            | Self::InvalidWindow { .. }
            | Self::PropertyNotFound(_)
            | Self::FeatureNotFound(_) => ErrorKind::Range,

            Self::Io(_) | Self::MmapFailed(_) | Self::WriteFailed(_) => ErrorKind::Io,

            Self::KeyNotFound(_)
            | Self::ReferenceTyped(_)
            | Self::TypeMismatch { .. }
            | Self::InvalidMagic(_)
            | Self::UnsupportedVersion(_)
            | Self::UnexpectedEof(_)
            | Self::InvalidStructure(_)
            | Self::ChildOutOfBounds { .. }
            | Self::Utf8(_)
            | Self::Other(_) => ErrorKind::Format,
        }
    }
}

/// Result type alias for spikeio operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::UnknownUnit { unit: 7, valid: vec![1, 2, 3] };
        let msg = e.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains("[1, 2, 3]"));

        let e = Error::InvalidWindow { start: Some(100), end: None, min: 0, max: 50 };
        assert!(e.to_string().contains("50"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::UnknownUnit { unit: 0, valid: vec![] }.kind(), ErrorKind::Range);
        assert_eq!(
            Error::ColumnLengthMismatch { field: "ID".into(), expected: 2, actual: 3 }.kind(),
            ErrorKind::Schema
        );
        assert_eq!(
            Error::InvalidFolderName { path: PathBuf::from("x"), rule: "r".into() }.kind(),
            ErrorKind::Config
        );
        assert_eq!(Error::ReferenceTyped(16).kind(), ErrorKind::Format);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
