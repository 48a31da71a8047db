// ============================================================
// Layer 2 — GenerateUseCase
// ============================================================
// Writes one of the two synthetic datasets to CSV:
//
//   Notes → data/text_notes/design_text_data.csv
//   Chips → data/tabular/chip_design_data.csv
//
// Same (seed, samples) → byte-identical file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::synth::{ChipGenerator, NoteGenerator};

pub const DEFAULT_NOTES_PATH: &str = "data/text_notes/design_text_data.csv";
pub const DEFAULT_CHIPS_PATH: &str = "data/tabular/chip_design_data.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Notes,
    Chips,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateConfig {
    pub kind:    DatasetKind,
    pub output:  String,
    pub samples: usize,
    pub seed:    u64,
}

impl GenerateConfig {
    pub fn notes() -> Self {
        Self { kind: DatasetKind::Notes, output: DEFAULT_NOTES_PATH.into(), samples: 10_000, seed: 42 }
    }

    pub fn chips() -> Self {
        Self { kind: DatasetKind::Chips, output: DEFAULT_CHIPS_PATH.into(), samples: 10_000, seed: 42 }
    }
}

pub struct GenerateUseCase {
    config: GenerateConfig,
}

impl GenerateUseCase {
    pub fn new(config: GenerateConfig) -> Self {
        Self { config }
    }

    /// Generate and write the dataset; returns the number of rows.
    pub fn execute(&self) -> Result<usize> {
        let cfg = &self.config;
        tracing::info!("Generating {} {:?} rows (seed {})", cfg.samples, cfg.kind, cfg.seed);
        match cfg.kind {
            DatasetKind::Notes => write_rows(&cfg.output, NoteGenerator::new(cfg.seed).generate(cfg.samples)),
            DatasetKind::Chips => write_rows(&cfg.output, ChipGenerator::new(cfg.seed).generate(cfg.samples)),
        }
    }
}

pub(crate) fn write_rows<T: Serialize>(path: &str, rows: Vec<T>) -> Result<usize> {
    let path = Path::new(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create directory '{}'", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    tracing::info!("Wrote {} rows to '{}'", rows.len(), path.display());
    Ok(rows.len())
}
