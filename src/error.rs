//! Error taxonomy for the decode → inject → encode pipeline
//!
//! Every variant is recoverable: the transform coordinator downgrades all of
//! them to "leave the class unchanged" plus one diagnostic entry.

use thiserror::Error;

/// Errors raised while transforming a single class
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// Input does not conform to the class-file layout
    #[error("malformed class file: {0}")]
    MalformedInput(String),

    /// Recognized feature the engine does not know how to handle
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),

    /// Model is internally inconsistent and cannot be serialized
    #[error("unencodable class: {0}")]
    Unencodable(String),
}

impl TransformError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInput(reason.into())
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedConstruct(reason.into())
    }

    pub fn unencodable(reason: impl Into<String>) -> Self {
        Self::Unencodable(reason.into())
    }

    /// The reason text without the kind prefix
    pub fn reason(&self) -> &str {
        match self {
            Self::MalformedInput(r) | Self::UnsupportedConstruct(r) | Self::Unencodable(r) => r,
        }
    }

    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "malformed_input",
            Self::UnsupportedConstruct(_) => "unsupported_construct",
            Self::Unencodable(_) => "unencodable",
        }
    }
}

/// Result type for transformation operations
pub type Result<T> = std::result::Result<T, TransformError>;
