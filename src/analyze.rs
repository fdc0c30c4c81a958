//! Reference image analysis.
//!
//! Decodes a reference image and reduces every pixel to the nearest palette
//! color, producing a row-major [`QuantizedImage`]. The result is computed once
//! per cycle and shared by every account painting the same template.

use crate::color::PaletteColor;
use crate::palette::{Palette, PaletteError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error during image analysis
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AnalyzeError {
    /// The image bytes could not be decoded
    #[error("failed to decode reference image: {0}")]
    ImageDecode(#[from] image::ImageError),
    /// The image file could not be read
    #[error("failed to read reference image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// No valid palette could be loaded
    #[error("palette unavailable: {0}")]
    PaletteUnavailable(#[from] PaletteError),
}

/// A known pixel whose raw color is expected to match.
///
/// Used as an alignment sanity check; a mismatch is reported but never fails
/// the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Row-major pixel index
    pub index: usize,
    /// Expected raw color at that index
    #[serde(rename = "color")]
    pub expected: PaletteColor,
}

/// A checkpoint that did not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointMismatch {
    pub index: usize,
    pub expected: PaletteColor,
    /// Raw color found, or `None` when the index is outside the image
    pub actual: Option<PaletteColor>,
}

/// Row-major palette colors of a reference image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedImage {
    width: u32,
    height: u32,
    colors: Vec<PaletteColor>,
}

impl QuantizedImage {
    /// Build from raw parts. `colors.len()` should equal `width * height`.
    pub fn new(width: u32, height: u32, colors: Vec<PaletteColor>) -> Self {
        Self { width, height, colors }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[PaletteColor] {
        &self.colors
    }

    pub fn get(&self, index: usize) -> Option<PaletteColor> {
        self.colors.get(index).copied()
    }
}

/// Result of analyzing one reference image.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub image: QuantizedImage,
    /// Pixel count per palette color
    pub usage: BTreeMap<PaletteColor, usize>,
    pub mismatches: Vec<CheckpointMismatch>,
}

impl Analysis {
    pub fn distinct_colors(&self) -> usize {
        self.usage.len()
    }

    /// Log totals and per-color usage.
    pub fn log_summary(&self) {
        let total = self.image.len();
        tracing::info!(
            width = self.image.width(),
            height = self.image.height(),
            pixels = total,
            distinct_colors = self.distinct_colors(),
            "reference image analyzed"
        );
        for (color, count) in &self.usage {
            let percentage = if total == 0 { 0.0 } else { *count as f64 * 100.0 / total as f64 };
            tracing::debug!("color {}: {} pixels ({:.2}%)", color, count, percentage);
        }
    }
}

/// Quantizes reference images against a fixed palette.
#[derive(Debug, Clone)]
pub struct ImageAnalyzer {
    palette: Palette,
    checkpoints: Vec<Checkpoint>,
}

impl ImageAnalyzer {
    pub fn new(palette: Palette) -> Self {
        Self { palette, checkpoints: Vec::new() }
    }

    /// Load the palette source and build an analyzer from it.
    pub fn from_palette_file(path: &Path) -> Result<Self, AnalyzeError> {
        Ok(Self::new(Palette::load(path)?))
    }

    pub fn with_checkpoints(mut self, checkpoints: Vec<Checkpoint>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Read and analyze an image file.
    pub fn analyze_file(&self, path: &Path) -> Result<Analysis, AnalyzeError> {
        let bytes = std::fs::read(path)
            .map_err(|source| AnalyzeError::Io { path: path.to_path_buf(), source })?;
        self.analyze(&bytes)
    }

    /// Decode `bytes` and map every pixel to its nearest palette color.
    ///
    /// Alpha is ignored. The output is deterministic for a given palette and
    /// input.
    pub fn analyze(&self, bytes: &[u8]) -> Result<Analysis, AnalyzeError> {
        let decoded = image::load_from_memory(bytes)?.to_rgb8();
        let (width, height) = decoded.dimensions();

        let mut cache: HashMap<PaletteColor, PaletteColor> = HashMap::new();
        let mut usage: BTreeMap<PaletteColor, usize> = BTreeMap::new();
        let mut colors = Vec::with_capacity(width as usize * height as usize);

        // `pixels()` walks rows top to bottom, left to right
        for pixel in decoded.pixels() {
            let raw = PaletteColor::from_channels(&pixel.0);
            let matched = *cache.entry(raw).or_insert_with(|| self.palette.closest(raw));
            *usage.entry(matched).or_insert(0) += 1;
            colors.push(matched);
        }

        let mismatches = self.check_points(&decoded);
        Ok(Analysis { image: QuantizedImage::new(width, height, colors), usage, mismatches })
    }

    fn check_points(&self, decoded: &image::RgbImage) -> Vec<CheckpointMismatch> {
        let width = decoded.width() as usize;
        let mut mismatches = Vec::new();

        for checkpoint in &self.checkpoints {
            let actual = if width == 0 {
                None
            } else {
                let (x, y) = (checkpoint.index % width, checkpoint.index / width);
                decoded
                    .get_pixel_checked(x as u32, y as u32)
                    .map(|p| PaletteColor::from_channels(&p.0))
            };

            if actual == Some(checkpoint.expected) {
                tracing::debug!(index = checkpoint.index, color = %checkpoint.expected, "checkpoint matches");
                continue;
            }
            match actual {
                Some(found) => tracing::warn!(
                    index = checkpoint.index,
                    expected = %checkpoint.expected,
                    found = %found,
                    "checkpoint color mismatch, template may be misaligned"
                ),
                None => tracing::warn!(
                    index = checkpoint.index,
                    "checkpoint index lies outside the reference image"
                ),
            }
            mismatches.push(CheckpointMismatch {
                index: checkpoint.index,
                expected: checkpoint.expected,
                actual,
            });
        }
        mismatches
    }
}
