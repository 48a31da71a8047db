// ============================================================
// Layer 2 — ExportUseCase
// ============================================================
// Rebuilds the classifier from the checkpoint directory alone
// and writes the portable artifact:
//
//   Step 1: Verify the model.mpk + tokenizer.json pair
//   Step 2: Load weights, tokenizer and signature
//   Step 3: Tokenize the sample with the recorded padding policy
//   Step 4: Trace, lower and persist
//
// The checkpoint is only read, so a failed export can simply be
// re-run. A sample that tokenizes to a different length than
// the recorded signature is an ExportShapeMismatch.

use std::path::Path;

use anyhow::{Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice},
    prelude::Backend,
};
use serde::{Deserialize, Serialize};

use crate::data::tokenize::TokenizerAdapter;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    export::{ArtifactExporter, ExportReport},
    BackendKind, CpuBackend, GpuBackend,
};

/// The sample traced when none is given.
pub const DEFAULT_SAMPLE_TEXT: &str = "Optimize transistor density for 3nm process.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub checkpoint_dir: String,
    pub artifact_path:  String,
    pub sample_text:    String,
    pub backend:        BackendKind,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: "models/distilbert_finetuned".to_string(),
            artifact_path:  "models/chip_design_llm.safetensors".to_string(),
            sample_text:    DEFAULT_SAMPLE_TEXT.to_string(),
            backend:        BackendKind::default(),
        }
    }
}

pub struct ExportUseCase {
    config: ExportConfig,
}

impl ExportUseCase {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<ExportReport> {
        match self.config.backend {
            BackendKind::Wgpu => self.run::<GpuBackend>(&WgpuDevice::default()),
            BackendKind::Cpu  => self.run::<CpuBackend>(&NdArrayDevice::default()),
        }
    }

    fn run<B: Backend>(&self, device: &B::Device) -> Result<ExportReport> {
        let cfg     = &self.config;
        let manager = CheckpointManager::new(&cfg.checkpoint_dir, false);

        // Fails fast with IncompleteCheckpoint before anything is loaded
        manager.verify_pair()?;
        let (model, _) = manager.load_model::<B>(device)?;
        let tokenizer  = manager.load_tokenizer()?;
        let signature  = manager
            .load_signature()
            .context("Checkpoint has no signature.json; re-run 'train'")?;

        let sample = TokenizerAdapter::new(tokenizer.clone()).tokenize(&[cfg.sample_text.as_str()], signature.padding)?;

        let report = ArtifactExporter::new(&signature)
            .with_tokenizer(&tokenizer)
            .export_inference(&model, &sample, Path::new(&cfg.artifact_path), device)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::{testing::*, TrainConfig, TrainUseCase};
    use crate::domain::error::PipelineError;
    use crate::infra::checkpoint::MODEL_FILE;
    use crate::ml::runtime::Artifact;

    fn kind(err: &anyhow::Error) -> Option<&'static str> {
        err.downcast_ref::<PipelineError>().map(|e| e.kind())
    }

    fn trained(root: &std::path::Path) -> TrainConfig {
        let notes = notes_csv(&root.join("notes.csv"), 4);
        let mut texts: Vec<&str> = notes.iter().map(|n| n.note_text.as_str()).collect();
        texts.push(SAMPLE);
        pretrained_dir(&root.join("base"), &texts);
        let cfg = TrainConfig {
            data_path:      root.join("notes.csv").display().to_string(),
            checkpoint_dir: root.join("ckpt").display().to_string(),
            log_dir:        root.join("logs").display().to_string(),
            artifact_path:  root.join("trained.safetensors").display().to_string(),
            base_model:     root.join("base").display().to_string(),
            epochs:         1,
            batch_size:     2,
            backend:        BackendKind::Cpu,
            ..TrainConfig::default()
        };
        TrainUseCase::new(cfg.clone()).execute().unwrap();
        cfg
    }

    fn export_config(train: &TrainConfig, out: &Path) -> ExportConfig {
        ExportConfig {
            checkpoint_dir: train.checkpoint_dir.clone(),
            artifact_path:  out.display().to_string(),
            backend:        BackendKind::Cpu,
            ..ExportConfig::default()
        }
    }

    #[test]
    fn test_reexport_from_checkpoint_matches_training_export() {
        let dir   = tempfile::tempdir().unwrap();
        let train = trained(dir.path());
        let out   = dir.path().join("again.safetensors");

        let report = ExportUseCase::new(export_config(&train, &out)).execute().unwrap();

        let first  = Artifact::load(&train.artifact_path).unwrap();
        let second = Artifact::load(&report.path).unwrap();
        assert_eq!(first.signature(), second.signature());
    }

    #[test]
    fn test_longer_sample_is_shape_mismatch() {
        let dir   = tempfile::tempdir().unwrap();
        let train = trained(dir.path());
        let out   = dir.path().join("bad.safetensors");
        let cfg = ExportConfig {
            sample_text: format!("{SAMPLE} {SAMPLE}"),
            ..export_config(&train, &out)
        };

        let err = ExportUseCase::new(cfg).execute().unwrap_err();
        assert_eq!(kind(&err), Some("ExportShapeMismatch"));
        assert!(!out.exists());
        assert!(Path::new(&train.checkpoint_dir).join(MODEL_FILE).is_file());
    }

    #[test]
    fn test_half_checkpoint_is_refused() {
        let dir   = tempfile::tempdir().unwrap();
        let train = trained(dir.path());
        std::fs::remove_file(Path::new(&train.checkpoint_dir).join(MODEL_FILE)).unwrap();

        let out = dir.path().join("x.safetensors");
        let err = ExportUseCase::new(export_config(&train, &out)).execute().unwrap_err();
        assert_eq!(kind(&err), Some("IncompleteCheckpoint"));
    }
}
