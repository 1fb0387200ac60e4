//! Crate-level error taxonomy.
//!
//! Each stage has its own error type; [`Error`] gathers them into the kinds a
//! caller needs to act on. [`Error::kind`] plus the display message is the
//! structured report handed to outer layers.

use serde::Serialize;
use thiserror::Error;

use crate::domain::notation::{EncodingError, NotationParseError};
use crate::models::engine::EngineError;
use crate::vision::assembler::ClassificationError;
use crate::vision::tiles::ImageShapeError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bad board image: {0}")]
    ImageShape(#[from] ImageShapeError),
    #[error("classification failed: {0}")]
    Classification(#[from] ClassificationError),
    #[error("cannot encode board: {0}")]
    Encoding(#[from] EncodingError),
    #[error("engine out of sync: {0}")]
    EngineDesync(String),
    #[error("engine unavailable: {0}")]
    EngineUnavailable(#[source] EngineError),
    #[error("invalid notation: {0}")]
    Notation(#[from] NotationParseError),
    #[error("configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Machine-readable category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ImageShape,
    Classification,
    Encoding,
    EngineDesync,
    EngineUnavailable,
    Notation,
    Config,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ImageShape(_) => ErrorKind::ImageShape,
            Error::Classification(_) => ErrorKind::Classification,
            Error::Encoding(_) => ErrorKind::Encoding,
            Error::EngineDesync(_) => ErrorKind::EngineDesync,
            Error::EngineUnavailable(_) => ErrorKind::EngineUnavailable,
            Error::Notation(_) => ErrorKind::Notation,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// `{"kind": ..., "message": ...}` form of this error
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
