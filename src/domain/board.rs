//! 8x8 grids produced by recognition: piece labels and their confidences.
//!
//! Cells are addressed by `(row, col)` exactly as the tiles were cut from the
//! source image; row 0 is the top of the image. Flattening is row-major.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::chess::{Piece, PieceLabel, shakmaty_to_piece, to_square};

pub const BOARD_DIM: usize = 8;
pub const SQUARE_COUNT: usize = BOARD_DIM * BOARD_DIM;

/// Row-major flattened index -> (row, col)
pub fn index_to_coord(index: usize) -> (usize, usize) {
    (index / BOARD_DIM, index % BOARD_DIM)
}

/// (row, col) -> row-major flattened index
pub fn coord_to_index(row: usize, col: usize) -> usize {
    row * BOARD_DIM + col
}

/// Error expanding a placement field into a board
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum PlacementParseError {
    #[error("too many squares in row {0}")]
    RowOverflow(usize),
    #[error("not enough squares in row {0}")]
    RowUnderflow(usize),
    #[error("expected 8 rows, found {0}")]
    RowCount(usize),
    #[error("unexpected char {0:?}")]
    UnexpectedChar(char),
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoardMatrix {
    cells: [[PieceLabel; BOARD_DIM]; BOARD_DIM],
}

impl BoardMatrix {
    /// A board with every cell `Empty`
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from 64 labels in row-major order. Returns `None` on any other count.
    pub fn from_row_major(labels: Vec<PieceLabel>) -> Option<Self> {
        if labels.len() != SQUARE_COUNT {
            return None;
        }
        let mut board = Self::empty();
        for (index, label) in labels.into_iter().enumerate() {
            let (row, col) = index_to_coord(index);
            board.cells[row][col] = label;
        }
        Some(board)
    }

    /// Expand a placement field (`rnbqkbnr/pppppppp/8/...`) into a board.
    /// Segment `i` becomes row `i`.
    pub fn from_placement(placement: &str) -> Result<Self, PlacementParseError> {
        let segments: Vec<&str> = placement.split('/').collect();
        if segments.len() != BOARD_DIM {
            return Err(PlacementParseError::RowCount(segments.len()));
        }

        let mut board = Self::empty();
        for (row, segment) in segments.iter().enumerate() {
            let mut col = 0;
            for c in segment.chars() {
                if let Some(run) = c.to_digit(10) {
                    if run == 0 {
                        return Err(PlacementParseError::UnexpectedChar(c));
                    }
                    col += run as usize;
                } else if let Some(piece) = Piece::from_code(c) {
                    if col >= BOARD_DIM {
                        return Err(PlacementParseError::RowOverflow(row));
                    }
                    board.cells[row][col] = PieceLabel::Occupied(piece);
                    col += 1;
                } else {
                    return Err(PlacementParseError::UnexpectedChar(c));
                }
                if col > BOARD_DIM {
                    return Err(PlacementParseError::RowOverflow(row));
                }
            }
            if col < BOARD_DIM {
                return Err(PlacementParseError::RowUnderflow(row));
            }
        }
        Ok(board)
    }

    /// Snapshot of a shakmaty board, row 0 = rank 8
    pub fn from_shakmaty(board: &shakmaty::Board) -> Self {
        let mut matrix = Self::empty();
        for row in 0..BOARD_DIM {
            for col in 0..BOARD_DIM {
                if let Some(piece) = board.piece_at(to_square(row, col)) {
                    matrix.cells[row][col] = PieceLabel::Occupied(shakmaty_to_piece(piece));
                }
            }
        }
        matrix
    }

    pub fn get(&self, row: usize, col: usize) -> &PieceLabel {
        &self.cells[row][col]
    }

    pub fn set(&mut self, row: usize, col: usize, label: PieceLabel) {
        self.cells[row][col] = label;
    }

    pub fn rows(&self) -> &[[PieceLabel; BOARD_DIM]; BOARD_DIM] {
        &self.cells
    }

    /// All cells with their coordinates, row-major
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &PieceLabel)> {
        self.cells
            .iter()
            .enumerate()
            .flat_map(|(row, cells)| cells.iter().enumerate().map(move |(col, l)| (row, col, l)))
    }

    /// Occupied squares keyed by square name (`e4`), reading row 0 as rank 8
    /// and column 0 as file a.
    pub fn pieces_by_square(&self) -> BTreeMap<String, char> {
        self.iter()
            .filter_map(|(row, col, label)| match label {
                PieceLabel::Occupied(piece) => Some((to_square(row, col).to_string(), piece.code())),
                _ => None,
            })
            .collect()
    }
}

/// Winning-class probability per cell, parallel to a [`BoardMatrix`]
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceMatrix {
    cells: [[f32; BOARD_DIM]; BOARD_DIM],
}

impl ConfidenceMatrix {
    pub fn from_row_major(values: &[f32]) -> Option<Self> {
        if values.len() != SQUARE_COUNT {
            return None;
        }
        let mut matrix = Self::default();
        for (index, value) in values.iter().enumerate() {
            let (row, col) = index_to_coord(index);
            matrix.cells[row][col] = value.clamp(0.0, 1.0);
        }
        Some(matrix)
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.cells[row][col]
    }

    pub fn rows(&self) -> &[[f32; BOARD_DIM]; BOARD_DIM] {
        &self.cells
    }

    /// Least confident cell as (row, col, confidence)
    pub fn weakest(&self) -> (usize, usize, f32) {
        let mut weakest = (0, 0, f32::INFINITY);
        for (row, values) in self.cells.iter().enumerate() {
            for (col, &value) in values.iter().enumerate() {
                if value < weakest.2 {
                    weakest = (row, col, value);
                }
            }
        }
        weakest
    }

    pub fn mean(&self) -> f32 {
        self.cells.iter().flatten().sum::<f32>() / SQUARE_COUNT as f32
    }
}
