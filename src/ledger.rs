//! Repaint ledger: cells already painted during the current cycle.
//!
//! The ledger is shared by every account worker in the process. It is kept in
//! memory behind an async mutex and mirrored to a JSON file so that a restart
//! within the same cycle does not paint a cell twice.
//!
//! # File Format
//!
//! ```json
//! {
//!   "2006": true,
//!   "3007": true
//! }
//! ```
//!
//! The file is rewritten in full on every mark (temp file, then rename).

use crate::plan::{CellId, PaintInstruction};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

/// Default ledger filename.
pub const LEDGER_FILENAME: &str = "repainted_pixels.json";

/// Painted markers keyed by cell.
pub type PaintedCells = BTreeMap<CellId, bool>;

/// Error during ledger persistence.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// IO error
    #[error("ledger IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// JSON error
    #[error("ledger JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Persisted set of painted cells, safe to share between concurrent workers.
#[derive(Debug)]
pub struct RepaintLedger {
    path: PathBuf,
    cells: Mutex<PaintedCells>,
}

impl RepaintLedger {
    /// Create an empty ledger backed by `path`. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), cells: Mutex::new(PaintedCells::new()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge the persisted state into memory and return a snapshot.
    ///
    /// A missing file counts as empty. Marks already in memory are kept, so a
    /// load never un-paints a cell.
    pub async fn load(&self) -> Result<PaintedCells, LedgerError> {
        let mut cells = self.cells.lock().await;
        let persisted = read_file(&self.path).await?;
        cells.extend(persisted.into_iter().filter(|(_, painted)| *painted));
        Ok(cells.clone())
    }

    /// Forget everything: clear memory and delete the persisted file.
    pub async fn reset(&self) -> Result<(), LedgerError> {
        let mut cells = self.cells.lock().await;
        cells.clear();
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "removed repaint ledger file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LedgerError::Io { path: self.path.clone(), source }),
        }
    }

    pub async fn is_painted(&self, cell: CellId) -> bool {
        self.cells.lock().await.get(&cell).copied().unwrap_or(false)
    }

    /// Mark `cell` painted and persist the whole ledger before returning.
    ///
    /// Returns `Ok(true)` when the cell was newly marked and `Ok(false)` when it
    /// was already painted (nothing is written then). On a write failure the
    /// in-memory mark stays in place.
    pub async fn mark_painted(&self, cell: CellId) -> Result<bool, LedgerError> {
        let mut cells = self.cells.lock().await;
        if cells.get(&cell).copied().unwrap_or(false) {
            return Ok(false);
        }
        cells.insert(cell, true);
        write_file(&self.path, &cells).await?;
        Ok(true)
    }

    /// Instructions from `plan` whose cell is not painted yet, in plan order.
    pub async fn unpainted(&self, plan: &[PaintInstruction]) -> Vec<PaintInstruction> {
        let cells = self.cells.lock().await;
        plan.iter().filter(|i| !cells.get(&i.cell).copied().unwrap_or(false)).copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.cells.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cells.lock().await.is_empty()
    }

    pub async fn snapshot(&self) -> PaintedCells {
        self.cells.lock().await.clone()
    }
}

async fn read_file(path: &Path) -> Result<PaintedCells, LedgerError> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PaintedCells::new()),
        Err(source) => return Err(LedgerError::Io { path: path.to_path_buf(), source }),
    };
    serde_json::from_slice(&data).map_err(|source| LedgerError::Json { path: path.to_path_buf(), source })
}

async fn write_file(path: &Path, cells: &PaintedCells) -> Result<(), LedgerError> {
    let io_err = |source| LedgerError::Io { path: path.to_path_buf(), source };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let json = serde_json::to_vec_pretty(cells)
        .map_err(|source| LedgerError::Json { path: path.to_path_buf(), source })?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, json).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)
}
