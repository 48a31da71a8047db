// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Persists the trained classifier together with everything
// needed to rebuild and export it without the training run:
//
//   checkpoints/
//     model.mpk               ← θ (NamedMpkFileRecorder, full precision)
//     tokenizer.json          ← the exact vocabulary used in training
//     classifier_config.json  ← architecture, to rebuild before loading θ
//     signature.json          ← input names/shapes, labels, padding policy
//     latest_epoch.json       ← last epoch saved (+ subdir when versioned)
//     train_config.json       ← run configuration
//
// With versioning enabled each epoch gets its own `epoch_{n}/`
// holding the first four files; latest_epoch.json at the root
// points at the newest one.
//
// model.mpk and tokenizer.json form a pair. They are not written
// atomically, so loading checks both and refuses half a pair.

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::domain::{error::PipelineError, signature::ModelSignature};
use crate::infra::hub::TOKENIZER_FILE;
use crate::infra::tokenizer_store::TokenizerStore;
use crate::ml::classifier::{ClassifierConfig, DistilBertClassifier};

/// File stem handed to the recorder; it appends `.mpk`.
const MODEL_STEM: &str = "model";
pub const MODEL_FILE: &str = "model.mpk";
pub const CLASSIFIER_CONFIG_FILE: &str = "classifier_config.json";
pub const SIGNATURE_FILE: &str = "signature.json";
pub const LATEST_EPOCH_FILE: &str = "latest_epoch.json";
pub const TRAIN_CONFIG_FILE: &str = "train_config.json";

type ModelRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Everything saved next to θ on each checkpoint.
pub struct CheckpointContents<'a> {
    pub tokenizer: &'a Tokenizer,
    pub config:    &'a ClassifierConfig,
    pub signature: &'a ModelSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LatestEpoch {
    epoch:  usize,
    #[serde(default)]
    subdir: Option<String>,
}

pub struct CheckpointManager {
    dir:       PathBuf,
    versioned: bool,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>, versioned: bool) -> Self {
        Self { dir: dir.into(), versioned }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn target_dir(&self, epoch: usize) -> (PathBuf, Option<String>) {
        if self.versioned {
            let sub = format!("epoch_{epoch}");
            (self.dir.join(&sub), Some(sub))
        } else {
            (self.dir.clone(), None)
        }
    }

    /// Save θ and its companions for `epoch`. Returns the directory written.
    pub fn save<B: Backend>(
        &self,
        model:    &DistilBertClassifier<B>,
        epoch:    usize,
        contents: &CheckpointContents<'_>,
    ) -> Result<PathBuf> {
        let (dir, subdir) = self.target_dir(epoch);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;

        let stem = dir.join(MODEL_STEM);
        ModelRecorder::new()
            .record(model.clone().into_record(), stem.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", stem.display()))?;

        TokenizerStore::new(&dir).save(contents.tokenizer)?;
        write_json(&dir.join(CLASSIFIER_CONFIG_FILE), contents.config)?;
        write_json(&dir.join(SIGNATURE_FILE), contents.signature)?;

        // The pointer moves only after the pair is on disk.
        write_json(&self.dir.join(LATEST_EPOCH_FILE), &LatestEpoch { epoch, subdir })?;

        tracing::debug!("Saved checkpoint: epoch {} → '{}'", epoch, dir.display());
        Ok(dir)
    }

    /// Epoch of the newest checkpoint.
    pub fn latest_epoch(&self) -> Result<usize> {
        Ok(self.latest()?.epoch)
    }

    fn latest(&self) -> Result<LatestEpoch> {
        read_json(&self.dir.join(LATEST_EPOCH_FILE))
            .with_context(|| format!("No checkpoint in '{}'. Have you run 'train' first?", self.dir.display()))
    }

    /// Directory holding the newest checkpoint pair.
    pub fn latest_dir(&self) -> PathBuf {
        match self.latest() {
            Ok(LatestEpoch { subdir: Some(sub), .. }) => self.dir.join(sub),
            _ => self.dir.clone(),
        }
    }

    /// Both halves of the newest pair must exist.
    pub fn verify_pair(&self) -> Result<PathBuf, PipelineError> {
        let dir       = self.latest_dir();
        let model     = dir.join(MODEL_FILE).is_file();
        let tokenizer = dir.join(TOKENIZER_FILE).is_file();
        match (model, tokenizer) {
            (true, true)   => Ok(dir),
            (false, false) => Err(PipelineError::data(&dir, "no checkpoint found")),
            (true, false)  => Err(PipelineError::IncompleteCheckpoint { dir, missing: TOKENIZER_FILE.into() }),
            (false, true)  => Err(PipelineError::IncompleteCheckpoint { dir, missing: MODEL_FILE.into() }),
        }
    }

    /// Rebuild the classifier from the newest checkpoint.
    pub fn load_model<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<(DistilBertClassifier<B>, ClassifierConfig)> {
        let dir    = self.verify_pair()?;
        let config = read_json::<ClassifierConfig>(&dir.join(CLASSIFIER_CONFIG_FILE))?;
        let stem   = dir.join(MODEL_STEM);

        tracing::info!("Loading checkpoint from '{}'", dir.display());
        let record = ModelRecorder::new()
            .load(stem.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", stem.display()))?;

        Ok((config.init::<B>(device).load_record(record), config))
    }

    pub fn load_tokenizer(&self) -> Result<Tokenizer> {
        let dir = self.verify_pair()?;
        Ok(TokenizerStore::new(dir).load()?)
    }

    pub fn load_signature(&self) -> Result<ModelSignature> {
        read_json(&self.latest_dir().join(SIGNATURE_FILE))
    }

    /// Save the run configuration at the checkpoint root.
    pub fn save_config<T: Serialize>(&self, cfg: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        write_json(&self.dir.join(TRAIN_CONFIG_FILE), cfg)
    }

    pub fn load_config<T: DeserializeOwned>(&self) -> Result<T> {
        read_json(&self.dir.join(TRAIN_CONFIG_FILE))
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid JSON in '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArrayDevice, NdArray};

    use crate::domain::signature::{binary_labels, PaddingPolicy};
    use crate::infra::tokenizer_store::testing::word_level_tokenizer;
    use crate::ml::classifier::testing::tiny_config;

    type B = NdArray;

    fn fixture() -> (Tokenizer, ClassifierConfig, ModelSignature) {
        let tokenizer = word_level_tokenizer(&["optimize etching"]);
        let config    = tiny_config(120);
        let signature = ModelSignature::token_inputs(1, 8, binary_labels(), PaddingPolicy::default());
        (tokenizer, config, signature)
    }

    #[test]
    fn test_save_then_load_restores_weights() {
        let dir = tempfile::tempdir().unwrap();
        let (tokenizer, config, signature) = fixture();
        let device = NdArrayDevice::default();
        let model  = config.init::<B>(&device);

        let mgr = CheckpointManager::new(dir.path(), false);
        let contents = CheckpointContents { tokenizer: &tokenizer, config: &config, signature: &signature };
        mgr.save(&model, 1, &contents).unwrap();

        assert!(dir.path().join(MODEL_FILE).is_file());
        assert!(dir.path().join(TOKENIZER_FILE).is_file());
        assert_eq!(mgr.latest_epoch().unwrap(), 1);
        assert_eq!(mgr.load_signature().unwrap(), signature);

        let (loaded, _) = mgr.load_model::<B>(&device).unwrap();
        let a: Vec<f32> = model.classifier.weight.val().into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.classifier.weight.val().into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_versioned_checkpoints_keep_each_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let (tokenizer, config, signature) = fixture();
        let model = config.init::<B>(&NdArrayDevice::default());

        let mgr = CheckpointManager::new(dir.path(), true);
        let contents = CheckpointContents { tokenizer: &tokenizer, config: &config, signature: &signature };
        mgr.save(&model, 1, &contents).unwrap();
        mgr.save(&model, 2, &contents).unwrap();

        assert!(dir.path().join("epoch_1").join(MODEL_FILE).is_file());
        assert!(dir.path().join("epoch_2").join(MODEL_FILE).is_file());
        assert_eq!(mgr.latest_dir(), dir.path().join("epoch_2"));
    }

    #[test]
    fn test_missing_tokenizer_is_incomplete_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (tokenizer, config, signature) = fixture();
        let model = config.init::<B>(&NdArrayDevice::default());

        let mgr = CheckpointManager::new(dir.path(), false);
        let contents = CheckpointContents { tokenizer: &tokenizer, config: &config, signature: &signature };
        mgr.save(&model, 1, &contents).unwrap();
        fs::remove_file(dir.path().join(TOKENIZER_FILE)).unwrap();

        let err = mgr.verify_pair().unwrap_err();
        assert_eq!(err.kind(), "IncompleteCheckpoint");
        assert!(mgr.load_model::<B>(&NdArrayDevice::default()).is_err());
    }

    #[test]
    fn test_empty_dir_is_data_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = CheckpointManager::new(dir.path(), false).verify_pair().unwrap_err();
        assert_eq!(err.kind(), "DataUnavailable");
    }
}
