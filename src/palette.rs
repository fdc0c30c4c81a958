//! Allowed canvas palette and nearest-color matching.
//!
//! The palette source is a plain text file with one `#RRGGBB` color per line.
//! Blank lines and lines that are not a six digit hex color are ignored.
//!
//! ```
//! use notpixel::palette::Palette;
//! use notpixel::color::PaletteColor;
//!
//! let palette = Palette::parse("#000000\n#ffffff\n").unwrap();
//! assert_eq!(palette.closest(PaletteColor::new(10, 10, 10)), PaletteColor::new(0, 0, 0));
//! ```

use crate::color::{parse_color, PaletteColor};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

static PALETTE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("palette line pattern is valid"));

/// Error while loading or using a palette
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PaletteError {
    /// The palette has no usable colors
    #[error("invalid palette: {0}")]
    InvalidPalette(String),
    /// The palette source could not be read
    #[error("failed to read palette {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An ordered, non-empty list of allowed colors.
///
/// Order matters: when two entries are equally close to a color, the earlier
/// one wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<PaletteColor>,
}

impl Palette {
    /// Create a palette from a list of colors. Fails if the list is empty.
    pub fn new(colors: Vec<PaletteColor>) -> Result<Self, PaletteError> {
        if colors.is_empty() {
            return Err(PaletteError::InvalidPalette("palette contains no colors".to_string()));
        }
        Ok(Self { colors })
    }

    /// Parse palette source text, one color per line.
    pub fn parse(text: &str) -> Result<Self, PaletteError> {
        let colors = text
            .lines()
            .map(str::trim)
            .filter(|line| PALETTE_LINE.is_match(line))
            .filter_map(|line| parse_color(line).ok())
            .collect();
        Self::new(colors)
    }

    /// Load a palette source file.
    pub fn load(path: &Path) -> Result<Self, PaletteError> {
        let text = fs::read_to_string(path)
            .map_err(|source| PaletteError::Io { path: path.to_path_buf(), source })?;
        Self::parse(&text).map_err(|e| match e {
            PaletteError::InvalidPalette(_) => PaletteError::InvalidPalette(format!(
                "no valid #RRGGBB colors in {}",
                path.display()
            )),
            other => other,
        })
    }

    pub fn colors(&self) -> &[PaletteColor] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Always false for a constructed palette.
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn contains(&self, color: PaletteColor) -> bool {
        self.colors.contains(&color)
    }

    /// Nearest palette entry to `color`. Infallible because a `Palette` is never empty.
    pub fn closest(&self, color: PaletteColor) -> PaletteColor {
        nearest(color, &self.colors).unwrap_or(self.colors[0])
    }
}

/// Nearest color in `palette` by Manhattan distance over R, G and B.
///
/// Ties resolve to the first entry reaching the minimum distance.
///
/// # Errors
///
/// Returns `PaletteError::InvalidPalette` when `palette` is empty.
pub fn closest(color: PaletteColor, palette: &[PaletteColor]) -> Result<PaletteColor, PaletteError> {
    nearest(color, palette).ok_or_else(|| {
        PaletteError::InvalidPalette("cannot match against an empty palette".to_string())
    })
}

fn nearest(color: PaletteColor, palette: &[PaletteColor]) -> Option<PaletteColor> {
    let mut best: Option<(PaletteColor, u32)> = None;
    for &candidate in palette {
        let distance = color.manhattan_distance(candidate);
        match best {
            // strict comparison keeps the earliest entry on ties
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((candidate, distance)),
        }
        if distance == 0 {
            break;
        }
    }
    best.map(|(c, _)| c)
}
