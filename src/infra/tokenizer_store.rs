// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Resolves the pretrained tokenizer and persists it next to the
// trained weights, so export and prediction always use the exact
// vocabulary the model was fine-tuned with.
//
//   resolve_pretrained  — hub / local dir → Tokenizer
//   save                — <checkpoint_dir>/tokenizer.json
//   load                — back from the checkpoint dir
//
// Failure to resolve is VocabularyUnavailable; nothing falls
// back to a different vocabulary.

use std::path::{Path, PathBuf};

use tokenizers::Tokenizer;

use crate::domain::error::PipelineError;
use crate::infra::hub::{PretrainedSource, TOKENIZER_FILE};

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Resolve the pretrained tokenizer for `source`.
    pub fn resolve_pretrained(source: &PretrainedSource) -> Result<Tokenizer, PipelineError> {
        let path = source
            .resolve(TOKENIZER_FILE)
            .map_err(|e| PipelineError::vocabulary(source.id(), e))?;
        let tokenizer = Tokenizer::from_file(&path)
            .map_err(|e| PipelineError::vocabulary(source.id(), e))?;
        tracing::info!(
            "Resolved tokenizer for '{}' (vocab size {})",
            source.id(),
            tokenizer.get_vocab_size(true)
        );
        Ok(tokenizer)
    }

    /// Write the tokenizer JSON into the store directory.
    pub fn save(&self, tokenizer: &Tokenizer) -> Result<(), PipelineError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| PipelineError::data(&self.dir, e.to_string()))?;
        let path = self.path();
        tokenizer
            .save(&path, true)
            .map_err(|e| PipelineError::data(&path, format!("cannot save tokenizer: {e}")))?;
        tracing::debug!("Saved tokenizer to '{}'", path.display());
        Ok(())
    }

    /// Load a previously saved tokenizer from the store directory.
    pub fn load(&self) -> Result<Tokenizer, PipelineError> {
        let path = self.path();
        Tokenizer::from_file(&path).map_err(|e| PipelineError::vocabulary(path_id(&path), e))
    }
}

fn path_id(path: &Path) -> String {
    path.display().to_string()
}
