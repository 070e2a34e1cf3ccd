//! Error types for scene3d-rs.

use thiserror::Error;

/// The main error type for scene3d-rs data operations.
#[derive(Error, Debug)]
pub enum Scene3dError {
    /// A per-instance attribute array has the wrong length.
    #[error("{attribute}: expected {expected} values, got {actual}")]
    SizeMismatch {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The position/center array is not a whole number of 3-vectors.
    #[error("{attribute} length {len} is not a multiple of 3")]
    RaggedPositions { attribute: &'static str, len: usize },

    /// The collection descriptor named a primitive kind this crate does not know.
    #[error("unknown primitive kind")]
    UnknownPrimitiveKind,

    /// Rendering error.
    #[error("render error: {0}")]
    RenderError(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A specialized Result type for scene3d-rs operations.
pub type Result<T> = std::result::Result<T, Scene3dError>;
