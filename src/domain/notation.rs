//! Board notation: encoding a recognized board plus auxiliary state into the
//! standard six-field notation string, and parsing such strings back.
//!
//! Format: `<placement> <turn> <castling> <enpassant> <halfmove> <fullmove>`.
//! Placement rows are emitted in board-row order (row 0 first); no rank
//! inversion happens here.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shakmaty::Square;
use thiserror::Error;
use tracing::warn;

use crate::domain::board::{BoardMatrix, PlacementParseError};
use crate::domain::chess::{PieceColor, PieceLabel};

/// What the encoder does with a label it cannot map to a notation code
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LabelPolicy {
    /// Fail with [`EncodingError::UnknownLabel`]
    #[default]
    Strict,
    /// Treat the cell as empty and log a warning
    Lenient,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("unrecognized piece label {label:?} at row {row}, col {col}")]
    UnknownLabel {
        row: usize,
        col: usize,
        label: String,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid castling rights {0:?}")]
pub struct CastlingParseError(pub String);

/// Which castling moves each side may still perform
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct CastlingRights {
    pub white_king: bool,
    pub white_queen: bool,
    pub black_king: bool,
    pub black_queen: bool,
}

impl CastlingRights {
    pub const ALL: CastlingRights = CastlingRights {
        white_king: true,
        white_queen: true,
        black_king: true,
        black_queen: true,
    };

    pub const NONE: CastlingRights = CastlingRights {
        white_king: false,
        white_queen: false,
        black_king: false,
        black_queen: false,
    };

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl fmt::Display for CastlingRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("-");
        }
        let flags = [
            (self.white_king, 'K'),
            (self.white_queen, 'Q'),
            (self.black_king, 'k'),
            (self.black_queen, 'q'),
        ];
        for (set, c) in flags {
            if set {
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

impl FromStr for CastlingRights {
    type Err = CastlingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "-" {
            return Ok(Self::NONE);
        }
        if s.is_empty() {
            return Err(CastlingParseError(s.to_string()));
        }

        let mut rights = Self::NONE;
        for c in s.chars() {
            let flag = match c {
                'K' => &mut rights.white_king,
                'Q' => &mut rights.white_queen,
                'k' => &mut rights.black_king,
                'q' => &mut rights.black_queen,
                _ => return Err(CastlingParseError(s.to_string())),
            };
            if *flag {
                // duplicate letter
                return Err(CastlingParseError(s.to_string()));
            }
            *flag = true;
        }
        Ok(rights)
    }
}

/// Everything in the notation string that cannot be read off an image
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuxiliaryState {
    pub turn: PieceColor,
    pub castling: CastlingRights,
    pub en_passant: Option<Square>,
    pub halfmove_clock: u32,
    pub fullmove_number: u32,
}

impl AuxiliaryState {
    /// State assumed for the first recognition: all castling rights, no
    /// en-passant target, clocks at `0` and `1`.
    pub fn initial(turn: PieceColor) -> Self {
        Self {
            turn,
            castling: CastlingRights::ALL,
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }
}

impl Default for AuxiliaryState {
    fn default() -> Self {
        Self::initial(PieceColor::White)
    }
}

impl fmt::Display for AuxiliaryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.turn, self.castling)?;
        match self.en_passant {
            Some(sq) => write!(f, " {}", sq)?,
            None => write!(f, " -")?,
        }
        write!(f, " {} {}", self.halfmove_clock, self.fullmove_number)
    }
}

/// Turns board matrices into notation strings
#[derive(Clone, Copy, Debug, Default)]
pub struct NotationEncoder {
    policy: LabelPolicy,
}

impl NotationEncoder {
    pub fn new(policy: LabelPolicy) -> Self {
        Self { policy }
    }

    /// Encode the placement field only: 8 `/`-joined run-length rows
    pub fn encode_placement(&self, board: &BoardMatrix) -> Result<String, EncodingError> {
        let mut out = String::with_capacity(71);
        for (row, cells) in board.rows().iter().enumerate() {
            if row != 0 {
                out.push('/');
            }
            let mut empty = 0;
            for (col, label) in cells.iter().enumerate() {
                let code = match label {
                    PieceLabel::Occupied(piece) => Some(piece.code()),
                    PieceLabel::Empty => None,
                    PieceLabel::Unrecognized(name) => match self.policy {
                        LabelPolicy::Strict => {
                            return Err(EncodingError::UnknownLabel {
                                row,
                                col,
                                label: name.clone(),
                            });
                        }
                        LabelPolicy::Lenient => {
                            warn!(row, col, label = %name, "unrecognized label encoded as empty");
                            None
                        }
                    },
                };
                match code {
                    None => empty += 1,
                    Some(c) => {
                        if empty != 0 {
                            out.push_str(&empty.to_string());
                            empty = 0;
                        }
                        out.push(c);
                    }
                }
            }
            if empty != 0 {
                out.push_str(&empty.to_string());
            }
        }
        Ok(out)
    }

    /// Encode the full six-field notation string
    pub fn encode(&self, board: &BoardMatrix, aux: &AuxiliaryState) -> Result<String, EncodingError> {
        let placement = self.encode_placement(board)?;
        Ok(format!("{} {}", placement, aux))
    }
}

/// Error parsing a notation string
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotationParseError {
    #[error("expected 4 to 6 fields, found {0}")]
    FieldCount(usize),
    #[error("cannot parse placement: {0}")]
    Placement(#[from] PlacementParseError),
    #[error("invalid side to move {0:?}")]
    Turn(String),
    #[error(transparent)]
    Castling(#[from] CastlingParseError),
    #[error("invalid en-passant target {0:?}")]
    EnPassant(String),
    #[error("invalid halfmove clock {0:?}")]
    Halfmove(String),
    #[error("invalid fullmove number {0:?}")]
    Fullmove(String),
}

/// A parsed notation string
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notation {
    pub board: BoardMatrix,
    pub aux: AuxiliaryState,
}

impl FromStr for Notation {
    type Err = NotationParseError;

    /// Missing clock fields default to `0` and `1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if !(4..=6).contains(&fields.len()) {
            return Err(NotationParseError::FieldCount(fields.len()));
        }

        let board = BoardMatrix::from_placement(fields[0])?;
        let turn = fields[1]
            .parse::<PieceColor>()
            .ok()
            .filter(|_| fields[1].len() == 1)
            .ok_or_else(|| NotationParseError::Turn(fields[1].to_string()))?;
        let castling = fields[2].parse::<CastlingRights>()?;
        let en_passant = match fields[3] {
            "-" => None,
            s => Some(
                s.parse::<Square>()
                    .map_err(|_| NotationParseError::EnPassant(s.to_string()))?,
            ),
        };
        let halfmove_clock = match fields.get(4) {
            Some(s) => s
                .parse::<u32>()
                .map_err(|_| NotationParseError::Halfmove(s.to_string()))?,
            None => 0,
        };
        let fullmove_number = match fields.get(5) {
            Some(s) => s
                .parse::<u32>()
                .ok()
                .filter(|&n| n >= 1)
                .ok_or_else(|| NotationParseError::Fullmove(s.to_string()))?,
            None => 1,
        };

        Ok(Notation {
            board,
            aux: AuxiliaryState {
                turn,
                castling,
                en_passant,
                halfmove_clock,
                fullmove_number,
            },
        })
    }
}
