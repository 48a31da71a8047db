// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Classifies raw text with an exported artifact only: the
// tokenizer and the input signature both come from the file,
// so no checkpoint and no burn backend are involved.
//
// Each text is tokenized with Fixed padding to the signature's
// sequence length and run as its own batch of one.

use anyhow::{anyhow, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::data::tokenize::TokenizerAdapter;
use crate::domain::signature::{PaddingPolicy, INPUT_IDS};
use crate::ml::runtime::{Artifact, Classification};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictConfig {
    pub artifact_path: String,
    pub texts:         Vec<String>,
}

/// One input text with its predicted class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub text:           String,
    pub classification: Classification,
}

pub struct PredictUseCase {
    artifact: Artifact,
    adapter:  TokenizerAdapter,
    rows:     usize,
    seq_len:  usize,
}

impl PredictUseCase {
    pub fn new(artifact_path: &str) -> Result<Self> {
        let artifact  = Artifact::load(artifact_path)?;
        let tokenizer = artifact
            .tokenizer()?
            .ok_or_else(|| anyhow!("Artifact '{artifact_path}' carries no tokenizer"))?;

        let (rows, seq_len) = match artifact.signature().input(INPUT_IDS).map(|i| i.shape.as_slice()) {
            Some(&[rows, seq_len]) => (rows, seq_len),
            other => return Err(anyhow!("Artifact '{artifact_path}' has unexpected input_ids shape {other:?}")),
        };
        anyhow::ensure!(rows == 1, "Artifact expects batches of {rows}; only single-row artifacts are supported");

        Ok(Self { artifact, adapter: TokenizerAdapter::new(tokenizer), rows, seq_len })
    }

    pub fn predict(&self, text: &str) -> Result<Prediction> {
        let block = self.adapter.tokenize(&[text], PaddingPolicy::Fixed { length: self.seq_len })?;
        let to_array = |v: &[u32]| {
            Array2::from_shape_vec((self.rows, self.seq_len), v.iter().map(|&x| i64::from(x)).collect())
        };
        let ids  = to_array(&block.input_ids)?;
        let mask = to_array(&block.attention_mask)?;

        let classification = self
            .artifact
            .classify(&ids, &mask)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Artifact returned no rows"))?;
        Ok(Prediction { text: text.to_string(), classification })
    }

    pub fn predict_all(&self, texts: &[String]) -> Result<Vec<Prediction>> {
        texts.iter().map(|t| self.predict(t)).collect()
    }
}
