//! Pure domain layer: pieces, boards, notation and the UCI vocabulary.

pub mod board;
pub mod chess;
pub mod notation;
pub mod uci;

pub use board::{BOARD_DIM, BoardMatrix, ConfidenceMatrix, SQUARE_COUNT};
pub use chess::{Piece, PieceColor, PieceKind, PieceLabel};
pub use notation::{
    AuxiliaryState, CastlingRights, EncodingError, LabelPolicy, Notation, NotationEncoder,
    NotationParseError,
};
pub use uci::{Score, SearchLimit, UciCommand, UciInfo, UciOutputKind};
