//! Turning a board image into a label matrix with one batched classifier call.

use std::fmt::Write as _;

use image::RgbImage;
use thiserror::Error;
use tracing::debug;

use crate::domain::board::{BOARD_DIM, BoardMatrix, ConfidenceMatrix, SQUARE_COUNT, index_to_coord};
use crate::vision::classifier::{ClassifierError, PieceClassifier, Prediction};
use crate::vision::tiles::{Tile, TileExtractor};

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("classifier returned {actual} results for {expected} tiles")]
    CountMismatch { expected: usize, actual: usize },
    #[error("expected 64 tiles, got {0}")]
    TileCount(usize),
    #[error("tile {index} is at row {row}, col {col}; tiles must be row-major")]
    TileOrder { index: usize, row: usize, col: usize },
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Labels and confidences for one board image
#[derive(Debug, Clone, PartialEq)]
pub struct BoardRecognition {
    pub board: BoardMatrix,
    pub confidence: ConfidenceMatrix,
}

impl BoardRecognition {
    /// One line per row, each cell as `label(confidence%)`
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for row in 0..BOARD_DIM {
            let cells: Vec<String> = (0..BOARD_DIM)
                .map(|col| {
                    format!(
                        "{}({:.1}%)",
                        self.board.get(row, col),
                        self.confidence.get(row, col) * 100.0
                    )
                })
                .collect();
            let _ = writeln!(out, "{}", cells.join(" "));
        }
        out
    }
}

/// Runs tile extraction and classification over a whole board
pub struct BoardAssembler<C> {
    extractor: TileExtractor,
    classifier: C,
}

impl<C: PieceClassifier> BoardAssembler<C> {
    pub fn new(extractor: TileExtractor, classifier: C) -> Self {
        Self {
            extractor,
            classifier,
        }
    }

    pub fn extractor(&self) -> &TileExtractor {
        &self.extractor
    }

    /// Extract tiles from `image` and classify them
    pub fn recognize(&self, image: &RgbImage) -> crate::Result<BoardRecognition> {
        let tiles = self.extractor.extract(image)?;
        Ok(self.recognize_tiles(&tiles)?)
    }

    /// Classify a pre-extracted, row-major tile set in a single batch
    pub fn recognize_tiles(&self, tiles: &[Tile]) -> Result<BoardRecognition, ClassificationError> {
        if tiles.len() != SQUARE_COUNT {
            return Err(ClassificationError::TileCount(tiles.len()));
        }
        if let Some((index, tile)) = tiles
            .iter()
            .enumerate()
            .find(|(i, t)| index_to_coord(*i) != (t.row, t.col))
        {
            return Err(ClassificationError::TileOrder {
                index,
                row: tile.row,
                col: tile.col,
            });
        }

        let predictions = self.classifier.classify_batch(tiles)?;
        if predictions.len() != tiles.len() {
            return Err(ClassificationError::CountMismatch {
                expected: tiles.len(),
                actual: predictions.len(),
            });
        }

        let recognition = assemble(predictions)?;
        let (row, col, weakest) = recognition.confidence.weakest();
        debug!(
            mean_confidence = recognition.confidence.mean(),
            weakest,
            row,
            col,
            "board classified"
        );
        Ok(recognition)
    }
}

/// Place batch results back on the board; index `i` goes to `(i / 8, i % 8)`.
fn assemble(predictions: Vec<Prediction>) -> Result<BoardRecognition, ClassificationError> {
    let count = predictions.len();
    let mismatch = || ClassificationError::CountMismatch {
        expected: SQUARE_COUNT,
        actual: count,
    };
    let confidences: Vec<f32> = predictions.iter().map(|p| p.confidence).collect();
    let labels = predictions.into_iter().map(|p| p.label).collect();
    Ok(BoardRecognition {
        board: BoardMatrix::from_row_major(labels).ok_or_else(mismatch)?,
        confidence: ConfidenceMatrix::from_row_major(&confidences).ok_or_else(mismatch)?,
    })
}
