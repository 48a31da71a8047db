// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one row of scalar training metrics per epoch to
// <log_directory>/metrics.csv.
//
//   epoch,train_loss,val_loss,val_acc,learning_rate,examples
//   1,0.693100,0.681200,0.550000,0.000025,8000
//   2,0.402300,,,0.000000,8000
//
// val_loss / val_acc are left empty when no hold-out is used.
// The header is written only when the file is new, so several
// runs into the same directory accumulate.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

pub const METRICS_FILE: &str = "metrics.csv";
const HEADER: &str = "epoch,train_loss,val_loss,val_acc,learning_rate,examples";

/// Scalars for one finished epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:         usize,
    /// Mean cross-entropy over the epoch's training batches
    pub train_loss:    f64,
    pub val_loss:      Option<f64>,
    /// Fraction of hold-out examples classified correctly
    pub val_acc:       Option<f64>,
    /// Learning rate applied to the last step of the epoch
    pub learning_rate: f64,
    /// Training examples seen this epoch
    pub examples:      usize,
}

impl EpochMetrics {
    fn csv_row(&self) -> String {
        let opt = |v: Option<f64>| v.map(|v| format!("{v:.6}")).unwrap_or_default();
        format!(
            "{},{:.6},{},{},{:.8},{}",
            self.epoch,
            self.train_loss,
            opt(self.val_loss),
            opt(self.val_acc),
            self.learning_rate,
            self.examples,
        )
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create log directory '{}'", dir.display()))?;

        let csv_path = dir.join(METRICS_FILE);
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }
        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;
        writeln!(f, "{}", m.csv_row())?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:?}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(epoch: usize, val_loss: Option<f64>) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train_loss: 0.5,
            val_loss,
            val_acc: val_loss.map(|_| 0.75),
            learning_rate: 2.5e-5,
            examples: 4,
        }
    }

    #[test]
    fn test_header_once_rows_appended() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&metrics(1, Some(0.4))).unwrap();
        let again = MetricsLogger::new(dir.path()).unwrap();
        again.log(&metrics(2, None)).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "1,0.500000,0.400000,0.750000,0.00002500,4");
        assert_eq!(lines[2], "2,0.500000,,,0.00002500,4");
    }
}
