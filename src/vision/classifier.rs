//! The piece classifier boundary, plus a template-matching implementation.
//!
//! A classifier maps a batch of tiles to one [`Prediction`] per tile, in
//! input order. Model internals are not this crate's concern; anything that
//! can score a tile against a fixed class list can sit behind the trait.

use std::fs;
use std::path::Path;

use image::imageops::{self, FilterType};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::chess::PieceLabel;
use crate::vision::tiles::Tile;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
    #[error("tile at row {row}, col {col} is {actual}px, classifier expects {expected}px")]
    TileSize {
        row: usize,
        col: usize,
        expected: u32,
        actual: u32,
    },
}

/// One class and its probability mass
#[derive(Debug, Clone, PartialEq)]
pub struct ClassScore {
    pub class: String,
    pub probability: f32,
}

/// Classifier output for a single tile
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: PieceLabel,
    /// Probability mass of the winning class
    pub confidence: f32,
    /// Full distribution over the classifier's classes
    pub distribution: Vec<ClassScore>,
}

impl Prediction {
    /// Pick the most probable class. `None` if the inputs are empty or differ in length.
    pub fn from_probabilities(classes: &[String], probabilities: &[f32]) -> Option<Self> {
        if classes.is_empty() || classes.len() != probabilities.len() {
            return None;
        }
        let (best, &confidence) = probabilities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))?;
        Some(Self {
            label: PieceLabel::from_class_name(&classes[best]),
            confidence,
            distribution: classes
                .iter()
                .zip(probabilities)
                .map(|(class, &probability)| ClassScore {
                    class: class.clone(),
                    probability,
                })
                .collect(),
        })
    }
}

pub trait PieceClassifier {
    /// Classify every tile in one call; the result has one entry per tile, in order.
    fn classify_batch(&self, tiles: &[Tile]) -> Result<Vec<Prediction>, ClassifierError>;
}

impl<C: PieceClassifier + ?Sized> PieceClassifier for &C {
    fn classify_batch(&self, tiles: &[Tile]) -> Result<Vec<Prediction>, ClassifierError> {
        (**self).classify_batch(tiles)
    }
}

impl<C: PieceClassifier + ?Sized> PieceClassifier for Box<C> {
    fn classify_batch(&self, tiles: &[Tile]) -> Result<Vec<Prediction>, ClassifierError> {
        (**self).classify_batch(tiles)
    }
}

/// Nearest-template classifier over labeled reference tiles.
///
/// Each class keeps its reference tiles; a tile's distance to a class is the
/// smallest mean squared pixel difference to any of them. Distances become a
/// distribution through a softmax over `-distance / temperature`.
#[derive(Debug, Clone)]
pub struct TemplateClassifier {
    classes: Vec<String>,
    templates: Vec<Vec<Vec<f32>>>,
    tile_size: u32,
    temperature: f32,
}

pub const DEFAULT_TEMPERATURE: f32 = 0.02;

impl TemplateClassifier {
    /// Build from `(class name, normalized tiles)` pairs
    pub fn new(classes: Vec<(String, Vec<Vec<f32>>)>, tile_size: u32) -> Result<Self, ClassifierError> {
        let expected = (tile_size * tile_size * 3) as usize;
        let classes: Vec<_> = classes
            .into_iter()
            .filter(|(_, tiles)| !tiles.is_empty())
            .collect();
        if classes.is_empty() {
            return Err(ClassifierError::Unavailable("no reference tiles".to_string()));
        }
        if let Some((name, _)) = classes
            .iter()
            .find(|(_, tiles)| tiles.iter().any(|t| t.len() != expected))
        {
            return Err(ClassifierError::Unavailable(format!(
                "reference tile for {name:?} is not {tile_size}x{tile_size} RGB"
            )));
        }

        let (names, templates): (Vec<String>, Vec<Vec<Vec<f32>>>) = classes.into_iter().unzip();
        Ok(Self {
            classes: names,
            templates,
            tile_size,
            temperature: DEFAULT_TEMPERATURE,
        })
    }

    /// Load `<dir>/<class>/*.{png,jpg,jpeg}`, resizing each image to `tile_size`
    pub fn load(dir: &Path, tile_size: u32, filter: FilterType) -> Result<Self, ClassifierError> {
        let unavailable = |e: std::io::Error| ClassifierError::Unavailable(format!("{}: {}", dir.display(), e));

        let mut class_dirs: Vec<_> = fs::read_dir(dir)
            .map_err(unavailable)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        class_dirs.sort();

        let mut classes = Vec::with_capacity(class_dirs.len());
        for class_dir in class_dirs {
            let Some(name) = class_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let mut files: Vec<_> = fs::read_dir(&class_dir)
                .map_err(unavailable)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                })
                .collect();
            files.sort();

            let mut tiles: Vec<Vec<f32>> = Vec::with_capacity(files.len());
            for file in files {
                let image = image::open(&file)
                    .map_err(|e| ClassifierError::Unavailable(format!("{}: {}", file.display(), e)))?
                    .to_rgb8();
                let image = imageops::resize(&image, tile_size, tile_size, filter);
                tiles.push(image.as_raw().iter().map(|&v| v as f32 / 255.0).collect());
            }
            debug!(class = name, count = tiles.len(), "loaded reference tiles");
            classes.push((name.to_string(), tiles));
        }

        let classifier = Self::new(classes, tile_size)?;
        info!(classes = classifier.classes.len(), dir = %dir.display(), "template classifier ready");
        Ok(classifier)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.max(f32::EPSILON);
        self
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    fn probabilities(&self, pixels: &[f32]) -> Vec<f32> {
        let logits: Vec<f32> = self
            .templates
            .iter()
            .map(|tiles| {
                let distance = tiles
                    .iter()
                    .map(|t| mean_squared_error(t, pixels))
                    .fold(f32::INFINITY, f32::min);
                -distance / self.temperature
            })
            .collect();
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f32 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    }
}

fn mean_squared_error(a: &[f32], b: &[f32]) -> f32 {
    let sum: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    sum / a.len().max(1) as f32
}

impl PieceClassifier for TemplateClassifier {
    fn classify_batch(&self, tiles: &[Tile]) -> Result<Vec<Prediction>, ClassifierError> {
        tiles
            .iter()
            .map(|tile| {
                if tile.size != self.tile_size {
                    return Err(ClassifierError::TileSize {
                        row: tile.row,
                        col: tile.col,
                        expected: self.tile_size,
                        actual: tile.size,
                    });
                }
                let probabilities = self.probabilities(&tile.pixels);
                Prediction::from_probabilities(&self.classes, &probabilities)
                    .ok_or_else(|| ClassifierError::Unavailable("empty class list".to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chess::{PieceColor, PieceKind};
    use crate::vision::tiles::TileBounds;

    fn flat(value: f32, size: u32) -> Vec<f32> {
        vec![value; (size * size * 3) as usize]
    }

    fn tile(value: f32, size: u32) -> Tile {
        Tile {
            row: 0,
            col: 0,
            bounds: TileBounds {
                left: 0,
                top: 0,
                right: size,
                bottom: size,
            },
            size,
            pixels: flat(value, size),
        }
    }

    fn classifier() -> TemplateClassifier {
        TemplateClassifier::new(
            vec![
                ("empty".to_string(), vec![flat(0.5, 4)]),
                ("wP".to_string(), vec![flat(0.9, 4), flat(1.0, 4)]),
                ("bP".to_string(), vec![flat(0.1, 4)]),
            ],
            4,
        )
        .unwrap()
    }

    #[test]
    fn test_from_probabilities_argmax() {
        let classes = vec!["bK".to_string(), "empty".to_string(), "wQ".to_string()];
        let prediction = Prediction::from_probabilities(&classes, &[0.1, 0.2, 0.7]).unwrap();
        assert_eq!(prediction.label, PieceLabel::piece(PieceColor::White, PieceKind::Queen));
        assert_eq!(prediction.confidence, 0.7);
        assert_eq!(prediction.distribution.len(), 3);
        assert!(Prediction::from_probabilities(&classes, &[0.5, 0.5]).is_none());
    }

    #[test]
    fn test_template_classifier_picks_nearest() {
        let classifier = classifier();
        let predictions = classifier
            .classify_batch(&[tile(0.95, 4), tile(0.12, 4), tile(0.5, 4)])
            .unwrap();
        assert_eq!(predictions.len(), 3);
        assert_eq!(predictions[0].label, PieceLabel::piece(PieceColor::White, PieceKind::Pawn));
        assert_eq!(predictions[1].label, PieceLabel::piece(PieceColor::Black, PieceKind::Pawn));
        assert_eq!(predictions[2].label, PieceLabel::Empty);
        for p in &predictions {
            let total: f32 = p.distribution.iter().map(|s| s.probability).sum();
            assert!((total - 1.0).abs() < 1e-4);
            assert!(p.confidence > 0.5);
        }
    }

    #[test]
    fn test_temperature_sharpens_distribution() {
        let soft = classifier().with_temperature(1.0);
        let sharp = classifier().with_temperature(0.001);
        let soft = soft.classify_batch(&[tile(0.8, 4)]).unwrap();
        let sharp = sharp.classify_batch(&[tile(0.8, 4)]).unwrap();
        assert_eq!(soft[0].label, sharp[0].label);
        assert!(sharp[0].confidence > soft[0].confidence);
        // non-positive temperatures are clamped rather than dividing by zero
        let clamped = classifier().with_temperature(0.0);
        assert!(clamped.classify_batch(&[tile(0.8, 4)]).unwrap()[0].confidence.is_finite());
    }

    #[test]
    fn test_template_classifier_rejects_wrong_tile_size() {
        let err = classifier().classify_batch(&[tile(0.5, 8)]).unwrap_err();
        assert!(matches!(err, ClassifierError::TileSize { expected: 4, actual: 8, .. }));
    }

    #[test]
    fn test_template_classifier_needs_templates() {
        assert!(TemplateClassifier::new(vec![("empty".to_string(), vec![])], 4).is_err());
        assert!(TemplateClassifier::new(vec![("empty".to_string(), vec![flat(0.5, 2)])], 4).is_err());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = std::env::temp_dir().join(format!("fenlens-templates-{}", std::process::id()));
        for (class, shade) in [("wK", 240u8), ("empty", 128u8)] {
            let class_dir = dir.join(class);
            fs::create_dir_all(&class_dir).unwrap();
            image::RgbImage::from_pixel(10, 10, image::Rgb([shade; 3]))
                .save(class_dir.join("a.png"))
                .unwrap();
        }
        let classifier = TemplateClassifier::load(&dir, 4, FilterType::Nearest).unwrap();
        assert_eq!(classifier.classes(), &["empty".to_string(), "wK".to_string()]);
        let predictions = classifier.classify_batch(&[tile(240.0 / 255.0, 4)]).unwrap();
        assert_eq!(predictions[0].label, PieceLabel::piece(PieceColor::White, PieceKind::King));
        let _ = fs::remove_dir_all(&dir);
    }
}
