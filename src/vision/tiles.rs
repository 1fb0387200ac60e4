//! Cutting a square board image into 64 classifier-ready tiles.

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use thiserror::Error;
use tracing::debug;

use crate::config::{BoardRegion, VisionConfig};
use crate::domain::board::{BOARD_DIM, SQUARE_COUNT};

#[derive(Debug, Error)]
pub enum ImageShapeError {
    #[error("board image must be square, got {width}x{height}")]
    NotSquare { width: u32, height: u32 },
    #[error("board side {0} is not a positive multiple of 8")]
    NotDivisible(u32),
    #[error("board side {actual} does not match configured size {expected}")]
    SizeMismatch { expected: u32, actual: u32 },
    #[error("region {region:?} does not fit in a {width}x{height} image")]
    RegionOutOfBounds {
        region: BoardRegion,
        width: u32,
        height: u32,
    },
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Pixel rectangle of a tile in the source image, half-open on both axes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBounds {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl TileBounds {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

/// One square of the board, resized and normalized for the classifier
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub row: usize,
    pub col: usize,
    pub bounds: TileBounds,
    /// Side length of `pixels` in pixels
    pub size: u32,
    /// RGB values in [0, 1], row-major, channels interleaved
    pub pixels: Vec<f32>,
}

impl Tile {
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        let i = ((y * self.size + x) * 3) as usize;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }
}

/// Splits a board image into an 8x8 grid of tiles
#[derive(Debug, Clone)]
pub struct TileExtractor {
    tile_size: u32,
    board_size: Option<u32>,
    filter: FilterType,
}

impl TileExtractor {
    pub fn new(config: &VisionConfig) -> Self {
        Self {
            tile_size: config.tile_size,
            board_size: config.board_size,
            filter: config.filter.into(),
        }
    }

    /// Side length of the board's squares, after validating the image shape
    pub fn square_side(&self, image: &RgbImage) -> Result<u32, ImageShapeError> {
        let (width, height) = image.dimensions();
        if width != height {
            return Err(ImageShapeError::NotSquare { width, height });
        }
        if width == 0 || width % BOARD_DIM as u32 != 0 {
            return Err(ImageShapeError::NotDivisible(width));
        }
        if let Some(expected) = self.board_size {
            if expected != width {
                return Err(ImageShapeError::SizeMismatch {
                    expected,
                    actual: width,
                });
            }
        }
        Ok(width / BOARD_DIM as u32)
    }

    /// Produce the 64 tiles in row-major order
    pub fn extract(&self, image: &RgbImage) -> Result<Vec<Tile>, ImageShapeError> {
        let side = self.square_side(image)?;
        let mut tiles = Vec::with_capacity(SQUARE_COUNT);

        for row in 0..BOARD_DIM {
            for col in 0..BOARD_DIM {
                let bounds = square_bounds(row, col, side);
                let crop = imageops::crop_imm(image, bounds.left, bounds.top, side, side).to_image();
                let crop = if side == self.tile_size {
                    crop
                } else {
                    imageops::resize(&crop, self.tile_size, self.tile_size, self.filter)
                };
                let pixels = crop.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
                tiles.push(Tile {
                    row,
                    col,
                    bounds,
                    size: self.tile_size,
                    pixels,
                });
            }
        }

        debug!(side, tile_size = self.tile_size, "extracted board tiles");
        Ok(tiles)
    }
}

fn square_bounds(row: usize, col: usize, side: u32) -> TileBounds {
    let left = col as u32 * side;
    let top = row as u32 * side;
    TileBounds {
        left,
        top,
        right: left + side,
        bottom: top + side,
    }
}

/// Cut the board out of a larger screenshot
pub fn crop_region(image: &RgbImage, region: BoardRegion) -> Result<RgbImage, ImageShapeError> {
    let (width, height) = image.dimensions();
    if region.right <= region.left
        || region.bottom <= region.top
        || region.right > width
        || region.bottom > height
    {
        return Err(ImageShapeError::RegionOutOfBounds {
            region,
            width,
            height,
        });
    }
    Ok(imageops::crop_imm(
        image,
        region.left,
        region.top,
        region.right - region.left,
        region.bottom - region.top,
    )
    .to_image())
}

/// Apply the configured region crop and rescale a square board to the
/// configured board size. Non-square input is passed through for the
/// extractor to reject.
pub fn prepare_board(image: &DynamicImage, config: &VisionConfig) -> Result<RgbImage, ImageShapeError> {
    let mut board = image.to_rgb8();
    if let Some(region) = config.region {
        board = crop_region(&board, region)?;
    }
    if let Some(size) = config.board_size {
        let (width, height) = board.dimensions();
        if width == height && width != size {
            debug!(from = width, to = size, "rescaling board image");
            board = imageops::resize(&board, size, size, config.filter.into());
        }
    }
    Ok(board)
}

pub fn load_board(path: &Path, config: &VisionConfig) -> Result<RgbImage, ImageShapeError> {
    let image = image::open(path)?;
    prepare_board(&image, config)
}

/// Write every square as `<stem>_<row><col>.png` under `dir` (unresized crops)
pub fn save_tiles(image: &RgbImage, dir: &Path, stem: &str) -> crate::Result<Vec<PathBuf>> {
    let side = TileExtractor {
        tile_size: 0,
        board_size: None,
        filter: FilterType::Nearest,
    }
    .square_side(image)?;
    fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(SQUARE_COUNT);
    for row in 0..BOARD_DIM {
        for col in 0..BOARD_DIM {
            let bounds = square_bounds(row, col, side);
            let crop = imageops::crop_imm(image, bounds.left, bounds.top, side, side).to_image();
            let path = dir.join(format!("{}_{}{}.png", stem, row, col));
            crop.save(&path).map_err(ImageShapeError::from)?;
            written.push(path);
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResizeFilter;
    use image::Rgb;

    fn config(tile_size: u32, board_size: Option<u32>) -> VisionConfig {
        VisionConfig {
            tile_size,
            board_size,
            filter: ResizeFilter::Nearest,
            ..VisionConfig::default()
        }
    }

    /// Each square filled with a colour encoding its (row, col)
    fn checker(side: u32) -> RgbImage {
        RgbImage::from_fn(side * 8, side * 8, |x, y| {
            let (row, col) = (y / side, x / side);
            Rgb([(row * 30) as u8, (col * 30) as u8, 255])
        })
    }

    #[test]
    fn test_extract_64_tiles_row_major() {
        let extractor = TileExtractor::new(&config(16, None));
        let tiles = extractor.extract(&checker(20)).unwrap();
        assert_eq!(tiles.len(), 64);
        for (i, tile) in tiles.iter().enumerate() {
            assert_eq!((tile.row, tile.col), (i / 8, i % 8));
            assert_eq!(tile.size, 16);
            assert_eq!(tile.pixels.len(), 16 * 16 * 3);
        }
    }

    #[test]
    fn test_tiles_cover_image_exactly_once() {
        for side in [1u32, 3, 12] {
            let image = checker(side);
            let tiles = TileExtractor::new(&config(side, None)).extract(&image).unwrap();
            let (width, height) = image.dimensions();
            for y in 0..height {
                for x in 0..width {
                    let covering = tiles.iter().filter(|t| t.bounds.contains(x, y)).count();
                    assert_eq!(covering, 1, "pixel ({x}, {y}) with side {side}");
                }
            }
        }
    }

    #[test]
    fn test_tile_pixels_are_normalized_and_addressed() {
        let tiles = TileExtractor::new(&config(10, None)).extract(&checker(10)).unwrap();
        let tile = &tiles[3 * 8 + 5];
        let [r, g, b] = tile.pixel(4, 4);
        assert!((r - 90.0 / 255.0).abs() < 1e-6);
        assert!((g - 150.0 / 255.0).abs() < 1e-6);
        assert!((b - 1.0).abs() < 1e-6);
        assert!(tile.pixels.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let extractor = TileExtractor::new(&config(8, None));
        assert!(matches!(
            extractor.extract(&RgbImage::new(64, 72)),
            Err(ImageShapeError::NotSquare { width: 64, height: 72 })
        ));
        assert!(matches!(
            extractor.extract(&RgbImage::new(60, 60)),
            Err(ImageShapeError::NotDivisible(60))
        ));
        assert!(matches!(
            extractor.extract(&RgbImage::new(0, 0)),
            Err(ImageShapeError::NotDivisible(0))
        ));
        let strict = TileExtractor::new(&config(8, Some(720)));
        assert!(matches!(
            strict.extract(&RgbImage::new(64, 64)),
            Err(ImageShapeError::SizeMismatch { expected: 720, actual: 64 })
        ));
    }

    #[test]
    fn test_crop_region() {
        let screenshot = RgbImage::from_fn(100, 80, |x, y| Rgb([x as u8, y as u8, 0]));
        let region = BoardRegion {
            left: 10,
            top: 5,
            right: 74,
            bottom: 69,
        };
        let board = crop_region(&screenshot, region).unwrap();
        assert_eq!(board.dimensions(), (64, 64));
        assert_eq!(board.get_pixel(0, 0), &Rgb([10, 5, 0]));

        let outside = BoardRegion { right: 120, ..region };
        assert!(matches!(
            crop_region(&screenshot, outside),
            Err(ImageShapeError::RegionOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_prepare_board_rescales_square_input() {
        let image = DynamicImage::ImageRgb8(checker(4));
        let board = prepare_board(&image, &config(8, Some(64))).unwrap();
        assert_eq!(board.dimensions(), (64, 64));
    }

    #[test]
    fn test_save_tiles_naming() {
        let dir = std::env::temp_dir().join(format!("fenlens-tiles-{}", std::process::id()));
        let written = save_tiles(&checker(2), &dir, "board").unwrap();
        assert_eq!(written.len(), 64);
        assert!(written[0].ends_with("board_00.png"));
        assert!(written[63].ends_with("board_77.png"));
        assert!(written.iter().all(|p| p.exists()));
        let _ = fs::remove_dir_all(&dir);
    }
}
