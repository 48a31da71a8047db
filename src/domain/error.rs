// ============================================================
// Layer 3 — Pipeline Error Taxonomy
// ============================================================
// Every fatal condition in the pipeline has its own named
// variant so the CLI can report exactly which stage failed.
//
//   DataUnavailable        — input corpus missing or malformed
//   VocabularyUnavailable  — pretrained tokenizer not resolvable
//   PretrainedUnavailable  — pretrained body weights/config missing
//   IncompleteCheckpoint   — weights present without tokenizer (or vice versa)
//   DivergedTraining       — NaN / Inf loss
//   OutOfMemory            — batch failed twice, even at half size
//   ExportShapeMismatch    — declared input shape != traced shape
//   UnsupportedOp          — traced op has no portable lowering
//   ArtifactFormat         — exported file unreadable or wrong version
//   RemoteUnavailable      — EDA validation call failed (never fatal)
//
// The application layer wraps these in anyhow::Error with context;
// callers that need to branch on the kind use `downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("data unavailable at '{path}': {reason}")]
    DataUnavailable { path: PathBuf, reason: String },

    #[error("vocabulary unavailable for '{source_id}': {reason}")]
    VocabularyUnavailable { source_id: String, reason: String },

    #[error("pretrained model unavailable for '{source_id}': {reason}")]
    PretrainedUnavailable { source_id: String, reason: String },

    /// Treated as a DataUnavailable-class failure: resuming from half a
    /// checkpoint pair is never attempted.
    #[error("incomplete checkpoint in '{dir}': missing {missing}")]
    IncompleteCheckpoint { dir: PathBuf, missing: String },

    #[error("training diverged at epoch {epoch}, step {step}: loss = {loss}")]
    DivergedTraining { epoch: usize, step: usize, loss: f64 },

    #[error("out of memory at epoch {epoch} even after halving batch of {batch_size}")]
    OutOfMemory { epoch: usize, batch_size: usize },

    #[error("export shape mismatch for input '{input}': declared {declared:?}, traced {traced:?}")]
    ExportShapeMismatch {
        input:    String,
        declared: Vec<usize>,
        traced:   Vec<usize>,
    },

    #[error("unsupported op in traced graph: {op}")]
    UnsupportedOp { op: String },

    #[error("invalid artifact '{path}': {reason}")]
    ArtifactFormat { path: PathBuf, reason: String },

    #[error("remote validation unavailable: {reason}")]
    RemoteUnavailable { reason: String },
}

impl PipelineError {
    pub fn data(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DataUnavailable { path: path.into(), reason: reason.into() }
    }

    pub fn vocabulary(source_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::VocabularyUnavailable {
            source_id: source_id.into(),
            reason:    reason.to_string(),
        }
    }

    pub fn pretrained(source_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::PretrainedUnavailable {
            source_id: source_id.into(),
            reason:    reason.to_string(),
        }
    }

    pub fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ArtifactFormat { path: path.into(), reason: reason.to_string() }
    }

    /// Short, stable name of the error kind, used in CLI output and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataUnavailable { .. }       => "DataUnavailable",
            Self::VocabularyUnavailable { .. } => "VocabularyUnavailable",
            Self::PretrainedUnavailable { .. } => "PretrainedUnavailable",
            Self::IncompleteCheckpoint { .. }  => "IncompleteCheckpoint",
            Self::DivergedTraining { .. }      => "DivergedTraining",
            Self::OutOfMemory { .. }           => "OutOfMemory",
            Self::ExportShapeMismatch { .. }   => "ExportShapeMismatch",
            Self::UnsupportedOp { .. }         => "UnsupportedOp",
            Self::ArtifactFormat { .. }        => "ArtifactFormat",
            Self::RemoteUnavailable { .. }     => "RemoteUnavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_distinct() {
        let errs = [
            PipelineError::data("x.csv", "missing"),
            PipelineError::vocabulary("base", "offline"),
            PipelineError::DivergedTraining { epoch: 1, step: 3, loss: f64::NAN },
            PipelineError::ExportShapeMismatch {
                input: "input_ids".into(), declared: vec![1, 32], traced: vec![1, 16],
            },
            PipelineError::UnsupportedOp { op: "dropout".into() },
        ];
        let mut kinds: Vec<&str> = errs.iter().map(|e| e.kind()).collect();
        kinds.dedup();
        assert_eq!(kinds.len(), errs.len());
    }

    #[test]
    fn test_display_mentions_shapes() {
        let e = PipelineError::ExportShapeMismatch {
            input: "attention_mask".into(), declared: vec![1, 32], traced: vec![1, 16],
        };
        let msg = e.to_string();
        assert!(msg.contains("attention_mask"));
        assert!(msg.contains("[1, 32]"));
    }
}
