// ============================================================
// Layer 6 — Pretrained Resource Resolution
// ============================================================
// The base model is named by a fixed identifier. It resolves
// either through the Hugging Face hub cache (downloading on
// first use) or from a local directory laid out the same way:
//
//   <dir>/config.json        — architecture hyperparameters
//   <dir>/tokenizer.json     — WordPiece vocabulary + pipeline
//   <dir>/model.safetensors  — pretrained body weights
//
// A path that exists on disk is always treated as local, so
// offline runs just point --base-model at a directory.

use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_MODEL: &str = "distilbert-base-uncased";

pub const CONFIG_FILE: &str = "config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PretrainedSource {
    Hub(String),
    Local(PathBuf),
}

impl PretrainedSource {
    pub fn parse(id: &str) -> Self {
        let path = Path::new(id);
        if path.is_dir() {
            Self::Local(path.to_path_buf())
        } else {
            Self::Hub(id.to_string())
        }
    }

    /// Human-readable identifier, used in errors and logs.
    pub fn id(&self) -> String {
        match self {
            Self::Hub(id)    => id.clone(),
            Self::Local(dir) => dir.display().to_string(),
        }
    }

    /// Resolve one file of the pretrained bundle to a local path.
    pub fn resolve(&self, file: &str) -> Result<PathBuf, String> {
        match self {
            Self::Local(dir) => {
                let path = dir.join(file);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(format!("'{}' not found", path.display()))
                }
            }
            Self::Hub(id) => {
                let api = hf_hub::api::sync::Api::new()
                    .map_err(|e| format!("cannot initialise hub client: {e}"))?;
                tracing::debug!("Resolving '{file}' from hub repo '{id}'");
                api.model(id.clone())
                    .get(file)
                    .map_err(|e| format!("cannot fetch '{file}': {e}"))
            }
        }
    }
}

impl Default for PretrainedSource {
    fn default() -> Self {
        Self::Hub(DEFAULT_BASE_MODEL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_dir_is_local() {
        let dir = tempfile::tempdir().unwrap();
        let src = PretrainedSource::parse(dir.path().to_str().unwrap());
        assert_eq!(src, PretrainedSource::Local(dir.path().to_path_buf()));
    }

    #[test]
    fn test_plain_id_is_hub() {
        assert_eq!(PretrainedSource::parse("distilbert-base-uncased"), PretrainedSource::default());
    }

    #[test]
    fn test_local_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let src = PretrainedSource::Local(dir.path().to_path_buf());
        assert!(src.resolve(TOKENIZER_FILE).is_err());
    }
}
