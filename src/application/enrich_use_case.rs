// ============================================================
// Layer 2 — EnrichUseCase
// ============================================================
// notes CSV → notes CSV + eda_power, eda_area, eda_timing
//
//   for every row
//     validator.validate(note_text, recommendation)
//       Ok(m)                   → m
//       Err(RemoteUnavailable)  → warn, EdaMetrics::fallback()
//   append the metrics to their own row, keeping input order
//
// A remote failure never aborts the stage: the merged file is
// always written, with zeros where validation was unavailable.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::application::features_use_case::Table;
use crate::data::loader::TEXT_COLUMN;
use crate::domain::{records::EdaMetrics, traits::DesignValidator};
use crate::infra::eda_client::{EdaClient, RetryConfig, DEFAULT_ENDPOINT};

const ID_COLUMN: &str = "note_id";
const RECOMMENDATION_COLUMN: &str = "recommendation";
pub const EDA_COLUMNS: [&str; 3] = ["eda_power", "eda_area", "eda_timing"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    pub input:        String,
    pub output:       String,
    pub endpoint:     String,
    pub timeout_secs: u64,
    pub retry:        RetryConfig,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            input:        "data/text_notes/design_text_data.csv".to_string(),
            output:       "data/text_notes/eda_validated_data.csv".to_string(),
            endpoint:     DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 30,
            retry:        RetryConfig::default(),
        }
    }
}

/// How many rows got real metrics and how many fell back to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub rows:      usize,
    pub fallbacks: usize,
}

/// Validates every note row and writes the merged table.
pub struct EnrichmentStage<'a, V: DesignValidator> {
    validator: &'a V,
}

impl<'a, V: DesignValidator> EnrichmentStage<'a, V> {
    pub fn new(validator: &'a V) -> Self {
        Self { validator }
    }

    pub fn run(&self, input: &str, output: &str) -> Result<EnrichReport> {
        let table = Table::read(input)?;
        let id    = table.column(ID_COLUMN)?;
        let text  = table.column(TEXT_COLUMN)?;
        let rec   = table.column(RECOMMENDATION_COLUMN)?;

        let mut report = EnrichReport::default();
        let mut extra: Vec<Vec<String>> = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let field = |i: usize| row.get(i).unwrap_or_default();
            let m = self.validator.validate(field(text), field(rec)).unwrap_or_else(|e| {
                tracing::warn!("Validation failed for {}: {e}; using zero metrics", field(id));
                report.fallbacks += 1;
                EdaMetrics::fallback()
            });
            extra.push(vec![m.power.to_string(), m.area.to_string(), m.timing.to_string()]);
            report.rows += 1;
        }

        let headers: Vec<String> = EDA_COLUMNS.iter().map(|c| c.to_string()).collect();
        table.write_extended(output, &headers, &extra)?;

        tracing::info!(
            "Enriched {} rows ({} with fallback metrics) → '{}'",
            report.rows, report.fallbacks, output
        );
        Ok(report)
    }
}

pub struct EnrichUseCase {
    config: EnrichConfig,
}

impl EnrichUseCase {
    pub fn new(config: EnrichConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<EnrichReport> {
        let cfg    = &self.config;
        let client = EdaClient::new(&cfg.endpoint, Duration::from_secs(cfg.timeout_secs), cfg.retry);
        EnrichmentStage::new(&client).run(&cfg.input, &cfg.output)
    }
}
