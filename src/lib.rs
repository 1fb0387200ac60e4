//! Chessboard screenshot recognition and game state tracking.
//!
//! Pipeline: board image -> 64 tiles -> one batched classifier call ->
//! [`BoardMatrix`] -> notation string -> search engine -> best move.

pub mod config;
pub mod domain;
pub mod error;
pub mod models;
pub mod vision;

pub use config::Config;
pub use domain::{AuxiliaryState, BoardMatrix, LabelPolicy, NotationEncoder, PieceColor, PieceLabel};
pub use error::{Error, ErrorKind, Result};
pub use models::{EngineReply, GameStateTracker, StateOverrides, UciEngineFactory};
pub use vision::{BoardAssembler, PieceClassifier, TemplateClassifier, TileExtractor};
