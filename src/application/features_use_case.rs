// ============================================================
// Layer 2 — FeaturesUseCase
// ============================================================
// notes CSV → notes CSV + tfidf_0 .. tfidf_{k-1}
//
// Input columns are carried through untouched and in order; the
// feature block is appended on the right. The output is still a
// valid training corpus.

use std::path::Path;

use anyhow::{Context, Result};
use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::data::{loader::TEXT_COLUMN, tfidf::TfidfVectorizer};
use crate::domain::error::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    pub input:        String,
    pub output:       String,
    pub max_features: usize,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            input:        "data/text_notes/design_text_data.csv".to_string(),
            output:       "data/text_notes/processed_design_text_data.csv".to_string(),
            max_features: 50,
        }
    }
}

/// Header row plus every data row of a CSV file.
pub(crate) struct Table {
    path:        String,
    pub headers: StringRecord,
    pub rows:    Vec<StringRecord>,
}

impl Table {
    pub fn read(path: &str) -> Result<Self, PipelineError> {
        let unavailable = |reason: String| PipelineError::data(path, reason);
        let mut reader = csv::Reader::from_path(path).map_err(|e| unavailable(format!("cannot open: {e}")))?;
        let headers = reader
            .headers()
            .map_err(|e| unavailable(format!("cannot read header row: {e}")))?
            .clone();
        let rows = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| unavailable(format!("malformed row: {e}")))?;
        Ok(Self { path: path.to_string(), headers, rows })
    }

    pub fn column(&self, name: &str) -> Result<usize, PipelineError> {
        self.headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| PipelineError::data(&self.path, format!("missing required column '{name}'")))
    }

    /// Write the table with `extra` columns appended to every row.
    pub fn write_extended(&self, path: &str, extra_headers: &[String], extra: &[Vec<String>]) -> Result<()> {
        let path = Path::new(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create directory '{}'", parent.display()))?;
        }
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Cannot create '{}'", path.display()))?;

        let mut header = self.headers.clone();
        header.extend(extra_headers.iter());
        writer.write_record(&header)?;

        for (row, more) in self.rows.iter().zip(extra) {
            let mut record = row.clone();
            record.extend(more.iter());
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

pub struct FeaturesUseCase {
    config: FeaturesConfig,
}

impl FeaturesUseCase {
    pub fn new(config: FeaturesConfig) -> Self {
        Self { config }
    }

    /// Returns the feature vocabulary, column `tfidf_{i}` ↔ `vocabulary[i]`.
    pub fn execute(&self) -> Result<Vec<String>> {
        let cfg   = &self.config;
        let table = Table::read(&cfg.input)?;
        let text  = table.column(TEXT_COLUMN)?;

        let docs: Vec<&str> = table.rows.iter().map(|r| r.get(text).unwrap_or_default()).collect();
        let block = TfidfVectorizer::new(cfg.max_features).fit_transform(&docs);

        let values: Vec<Vec<String>> = block
            .rows
            .iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect();
        table.write_extended(&cfg.output, &block.column_names(), &values)?;

        tracing::info!(
            "Wrote {} rows with {} TF-IDF features to '{}'",
            table.rows.len(), block.vocabulary.len(), cfg.output
        );
        Ok(block.vocabulary)
    }
}
