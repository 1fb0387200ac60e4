//! Image side of recognition: tiles, the classifier boundary, and board assembly.

pub mod assembler;
pub mod classifier;
pub mod tiles;

pub use assembler::{BoardAssembler, BoardRecognition, ClassificationError};
pub use classifier::{ClassifierError, PieceClassifier, Prediction, TemplateClassifier};
pub use tiles::{ImageShapeError, Tile, TileExtractor};
