//! Paint planning.
//!
//! Maps a quantized reference image onto the account's template region of the
//! shared canvas. Every canvas cell is addressed by a single integer:
//!
//! ```text
//! cell = (origin_y + row) * row_stride + (origin_x + col + 1)
//! ```
//!
//! Planning is pure. It does not consult the repaint ledger; the executor
//! filters painted cells right before each draw because the ledger keeps
//! changing while a cycle runs.

use crate::analyze::QuantizedImage;
use crate::color::PaletteColor;
use crate::palette::Palette;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canvas cell identifier.
pub type CellId = u64;

/// Row stride of the current canvas.
pub const DEFAULT_ROW_STRIDE: u64 = 1000;

/// Error during planning
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PlanError {
    /// The reference image does not cover the template region exactly
    #[error(
        "reference image is {image_width}x{image_height} ({actual} pixels) but the template \
         region is {width}x{height} ({expected} cells); wrong image or template"
    )]
    SizeMismatch {
        expected: usize,
        actual: usize,
        image_width: u32,
        image_height: u32,
        width: u32,
        height: u32,
    },
    /// Row stride must be positive
    #[error("row stride must be positive")]
    InvalidStride,
}

/// Where the account's template sits on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateGeometry {
    pub origin_x: u32,
    pub origin_y: u32,
    pub width: u32,
    pub height: u32,
}

impl TemplateGeometry {
    /// Square template of `size` x `size` cells.
    pub fn square(origin_x: u32, origin_y: u32, size: u32) -> Self {
        Self { origin_x, origin_y, width: size, height: size }
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Canvas cell of image position (`row`, `col`).
    pub fn cell_id(&self, row: u32, col: u32, row_stride: u64) -> CellId {
        (self.origin_y as u64 + row as u64) * row_stride + (self.origin_x as u64 + col as u64 + 1)
    }
}

/// One paint action: set `cell` to `color`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaintInstruction {
    #[serde(rename = "pixelId")]
    pub cell: CellId,
    #[serde(rename = "newColor")]
    pub color: PaletteColor,
}

/// Turn a quantized image into paint instructions for `geometry`.
///
/// Rows and columns are walked bottom-right first. Instructions whose color
/// is not in `allowed` are dropped.
///
/// # Errors
///
/// `PlanError::SizeMismatch` when the image dimensions differ from the
/// template's, or the image does not carry exactly `width * height` pixels.
pub fn plan(
    quantized: &QuantizedImage,
    geometry: &TemplateGeometry,
    allowed: &Palette,
    row_stride: u64,
) -> Result<Vec<PaintInstruction>, PlanError> {
    if row_stride == 0 {
        return Err(PlanError::InvalidStride);
    }
    let expected = geometry.cell_count();
    if quantized.width() != geometry.width
        || quantized.height() != geometry.height
        || quantized.len() != expected
    {
        return Err(PlanError::SizeMismatch {
            expected,
            actual: quantized.len(),
            image_width: quantized.width(),
            image_height: quantized.height(),
            width: geometry.width,
            height: geometry.height,
        });
    }

    let colors = quantized.colors();
    let mut instructions = Vec::with_capacity(expected);
    for row in (0..geometry.height).rev() {
        for col in (0..geometry.width).rev() {
            let color = colors[row as usize * geometry.width as usize + col as usize];
            if !allowed.contains(color) {
                continue;
            }
            instructions.push(PaintInstruction { cell: geometry.cell_id(row, col, row_stride), color });
        }
    }
    Ok(instructions)
}
