//! Offline inspection commands (analyze, plan)

use std::path::Path;
use std::process::ExitCode;

use crate::analyze::{Analysis, ImageAnalyzer};
use crate::config::BotConfig;
use crate::ledger::RepaintLedger;
use crate::palette::Palette;
use crate::plan::{plan, TemplateGeometry};

use super::{runtime, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};

fn analyze_image(
    config: &BotConfig,
    image: &Path,
    palette: &Path,
) -> Result<(Palette, Analysis), ExitCode> {
    let analyzer = ImageAnalyzer::from_palette_file(palette)
        .map(|a| a.with_checkpoints(config.checkpoints()))
        .map_err(|e| {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        })?;
    match analyzer.analyze_file(image) {
        Ok(analysis) => Ok((analyzer.palette().clone(), analysis)),
        Err(e) => {
            eprintln!("Error: {}", e);
            Err(ExitCode::from(EXIT_ERROR))
        }
    }
}

/// Execute the analyze command
pub fn run_analyze(config: &BotConfig, image: Option<&Path>, palette: Option<&Path>) -> ExitCode {
    let image = image.unwrap_or(&config.files.image);
    let palette = palette.unwrap_or(&config.files.palette);
    let analysis = match analyze_image(config, image, palette) {
        Ok((_, analysis)) => analysis,
        Err(code) => return code,
    };

    let total = analysis.image.len();
    println!(
        "{}: {}x{}, {} pixels, {} colors",
        image.display(),
        analysis.image.width(),
        analysis.image.height(),
        total,
        analysis.distinct_colors()
    );
    let mut usage: Vec<_> = analysis.usage.iter().collect();
    usage.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (color, count) in usage {
        let percentage = if total == 0 { 0.0 } else { *count as f64 * 100.0 / total as f64 };
        println!("  {}  {:>8}  {:>6.2}%", color, count, percentage);
    }

    for mismatch in &analysis.mismatches {
        match mismatch.actual {
            Some(actual) => println!(
                "Warning: pixel {} is {}, expected {}",
                mismatch.index, actual, mismatch.expected
            ),
            None => println!("Warning: pixel {} is outside the image", mismatch.index),
        }
    }
    ExitCode::from(EXIT_SUCCESS)
}

/// Execute the plan command
pub fn run_plan(
    config: &BotConfig,
    x: u32,
    y: u32,
    size: u32,
    stride: Option<u64>,
    limit: usize,
) -> ExitCode {
    let stride = stride.unwrap_or(config.repaint.row_stride);
    if stride == 0 {
        eprintln!("Error: --stride must be positive");
        return ExitCode::from(EXIT_INVALID_ARGS);
    }

    let (palette, analysis) = match analyze_image(config, &config.files.image, &config.files.palette) {
        Ok(result) => result,
        Err(code) => return code,
    };
    let allowed = match config.allowed_colors() {
        Some(colors) => match Palette::new(colors) {
            Ok(palette) => palette,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::from(EXIT_ERROR);
            }
        },
        None => palette,
    };

    let geometry = TemplateGeometry::square(x, y, size);
    let instructions = match plan(&analysis.image, &geometry, &allowed, stride) {
        Ok(instructions) => instructions,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let ledger = RepaintLedger::new(&config.files.ledger);
    let pending = match runtime() {
        Ok(rt) => rt.block_on(async {
            ledger.load().await?;
            Ok::<_, crate::ledger::LedgerError>(ledger.unpainted(&instructions).await)
        }),
        Err(code) => return code,
    };
    let pending = match pending {
        Ok(pending) => pending,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    println!(
        "{} instructions ({} already painted, {} pending)",
        instructions.len(),
        instructions.len() - pending.len(),
        pending.len()
    );
    for instruction in pending.iter().take(limit) {
        println!("  {:>10}  {}", instruction.cell, instruction.color);
    }
    if pending.len() > limit {
        println!("  ... {} more", pending.len() - limit);
    }
    ExitCode::from(EXIT_SUCCESS)
}
