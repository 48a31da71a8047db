// ============================================================
// Layer 4 — Corpus Loader
// ============================================================
// Reads the labelled design-notes CSV into memory.
//
// Only two columns matter for training:
//   note_text         — the free text the classifier sees
//   has_optimization  — the binary label (0 / 1)
//
// Every other column (note_id, recommendation, tf-idf features,
// eda_* metrics, ...) is ignored, so the raw generator output,
// the TF-IDF output and the enriched output are all valid inputs.
//
// Any problem with the source is reported as DataUnavailable:
// a missing file, a missing column, a non-binary label, or an
// empty corpus. There is no partial load.

use std::path::PathBuf;

use crate::domain::error::PipelineError;
use crate::domain::example::{Corpus, Example};
use crate::domain::traits::CorpusSource;

pub const TEXT_COLUMN: &str = "note_text";
pub const LABEL_COLUMN: &str = "has_optimization";

pub struct CsvCorpusLoader {
    path: PathBuf,
}

impl CsvCorpusLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn unavailable(&self, reason: impl Into<String>) -> PipelineError {
        PipelineError::data(&self.path, reason)
    }
}

impl CorpusSource for CsvCorpusLoader {
    fn load_corpus(&self) -> Result<Corpus, PipelineError> {
        if !self.path.is_file() {
            return Err(self.unavailable("file does not exist"));
        }

        let mut reader = csv::Reader::from_path(&self.path)
            .map_err(|e| self.unavailable(format!("cannot open: {e}")))?;

        let headers = reader
            .headers()
            .map_err(|e| self.unavailable(format!("cannot read header row: {e}")))?
            .clone();

        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| self.unavailable(format!("missing required column '{name}'")))
        };
        let text_idx  = column(TEXT_COLUMN)?;
        let label_idx = column(LABEL_COLUMN)?;

        let mut examples = Vec::new();
        for (row, record) in reader.records().enumerate() {
            // +2: one for the header row, one for 1-based line numbers
            let line = row + 2;
            let record = record
                .map_err(|e| self.unavailable(format!("line {line}: {e}")))?;

            let text = record
                .get(text_idx)
                .ok_or_else(|| self.unavailable(format!("line {line}: missing {TEXT_COLUMN}")))?;
            let raw_label = record
                .get(label_idx)
                .ok_or_else(|| self.unavailable(format!("line {line}: missing {LABEL_COLUMN}")))?;

            let label = parse_label(raw_label).ok_or_else(|| {
                self.unavailable(format!("line {line}: label '{raw_label}' is not 0 or 1"))
            })?;

            examples.push(Example::new(text, label));
        }

        if examples.is_empty() {
            return Err(self.unavailable("no rows"));
        }

        tracing::info!("Loaded {} labelled notes from '{}'", examples.len(), self.path.display());
        Ok(Corpus::from_examples(examples))
    }
}

/// Accepts `0`/`1` (and the `0.0`/`1.0` spelling pandas sometimes writes).
fn parse_label(raw: &str) -> Option<u8> {
    match raw.trim() {
        "0" | "0.0" => Some(0),
        "1" | "1.0" => Some(1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_loads_texts_and_labels() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "notes.csv",
            "note_id,note_text,has_optimization\n\
             NOTE_1,Optimize transistor density for 5nm process.,1\n\
             NOTE_2,Maintain current design for 7nm process.,0\n");
        let corpus = CsvCorpusLoader::new(path).load_corpus().unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.texts()[1], "Maintain current design for 7nm process.");
        assert_eq!(corpus.labels(), &[1, 0]);
    }

    #[test]
    fn test_missing_file_is_data_unavailable() {
        let err = CsvCorpusLoader::new("/definitely/not/here.csv").load_corpus().unwrap_err();
        assert_eq!(err.kind(), "DataUnavailable");
    }

    #[test]
    fn test_missing_label_column_is_data_unavailable() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "bad.csv", "note_text,other\nhello,1\n");
        let err  = CsvCorpusLoader::new(path).load_corpus().unwrap_err();
        assert!(err.to_string().contains("has_optimization"));
    }

    #[test]
    fn test_non_binary_label_rejected() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "bad.csv", "note_text,has_optimization\nhello,2\n");
        assert!(CsvCorpusLoader::new(path).load_corpus().is_err());
    }

    #[test]
    fn test_header_only_is_empty_corpus_error() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "empty.csv", "note_text,has_optimization\n");
        assert!(CsvCorpusLoader::new(path).load_corpus().is_err());
    }
}
