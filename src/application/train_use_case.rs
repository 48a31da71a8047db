// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates fine-tuning end to end:
//
//   Step 1: Load labelled notes        (Layer 4 - data)
//   Step 2: Resolve tokenizer          (Layer 6 - infra)
//   Step 3: Tokenize the corpus        (Layer 4 - data)
//   Step 4: Optional hold-out split    (Layer 4 - data)
//   Step 5: Pretrained body + new head (Layer 5 - ml)
//   Step 6: Signature + export sample  (Layer 3 - domain)
//   Step 7: Save run config            (Layer 6 - infra)
//   Step 8: Training loop              (Layer 5 - ml)
//   Step 9: Export artifact            (Layer 5 - ml)
//
// A run that was stopped early is not exported. With the
// checkpoint policy `none` the final weights are still saved
// once, so `export` can be re-run later from the checkpoint.
//
// Reference: Burn Book §5 (Training)

use std::path::Path;

use anyhow::{Context, Result};
use burn::{
    backend::{wgpu::WgpuDevice, ndarray::NdArrayDevice, Autodiff},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::application::export_use_case::DEFAULT_SAMPLE_TEXT;
use crate::data::{
    dataset::NoteDataset,
    loader::CsvCorpusLoader,
    splitter::split_train_val,
    tokenize::TokenizerAdapter,
};
use crate::domain::{
    signature::{binary_labels, ModelSignature, PaddingPolicy},
    traits::CorpusSource,
};
use crate::infra::{
    checkpoint::{CheckpointContents, CheckpointManager},
    hub::{PretrainedSource, DEFAULT_BASE_MODEL},
    metrics::MetricsLogger,
    tokenizer_store::TokenizerStore,
};
use crate::ml::{
    export::{ArtifactExporter, ExportReport},
    pretrained::from_pretrained,
    trainer::{Checkpointing, RunState, StopSignal, TrainingController},
    BackendKind, CpuBackend, GpuBackend,
};

/// When θ is persisted during training.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointPolicy {
    #[default]
    PerEpoch,
    None,
}

// ─── Training Configuration ──────────────────────────────────────────────────
// Saved as train_config.json in the checkpoint directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub data_path:             String,
    pub checkpoint_dir:        String,
    pub log_dir:               String,
    pub artifact_path:         String,
    /// Hub id or local directory of the pretrained bundle
    pub base_model:            String,
    pub epochs:                usize,
    pub batch_size:            usize,
    pub learning_rate:         f64,
    pub weight_decay:          f64,
    pub seed:                  u64,
    pub val_fraction:          f64,
    pub checkpoint_policy:     CheckpointPolicy,
    pub versioned_checkpoints: bool,
    pub padding:               PaddingPolicy,
    /// Text traced at export time
    pub sample_text:           String,
    pub backend:               BackendKind,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_path:             "data/text_notes/design_text_data.csv".to_string(),
            checkpoint_dir:        "models/distilbert_finetuned".to_string(),
            log_dir:               "models/distilbert_finetuned/logs".to_string(),
            artifact_path:         "models/chip_design_llm.safetensors".to_string(),
            base_model:            DEFAULT_BASE_MODEL.to_string(),
            epochs:                3,
            batch_size:            8,
            learning_rate:         5e-5,
            weight_decay:          0.0,
            seed:                  42,
            val_fraction:          0.0,
            checkpoint_policy:     CheckpointPolicy::PerEpoch,
            versioned_checkpoints: false,
            padding:               PaddingPolicy::default(),
            sample_text:           DEFAULT_SAMPLE_TEXT.to_string(),
            backend:               BackendKind::default(),
        }
    }
}

impl TrainConfig {
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.epochs >= 1, "epochs must be at least 1");
        anyhow::ensure!(self.batch_size >= 1, "batch_size must be at least 1");
        anyhow::ensure!(self.padding.max_length() >= 2, "max_length must leave room for [CLS] and [SEP]");
        Ok(())
    }
}

/// What a training run produced.
#[derive(Debug)]
pub struct TrainOutcome {
    pub state:    RunState,
    /// None when the run was stopped before the last epoch
    pub artifact: Option<ExportReport>,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
    stop:   StopSignal,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config, stop: StopSignal::new() }
    }

    /// Share a stop flag with whoever may want to interrupt the run.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn execute(&self) -> Result<TrainOutcome> {
        self.config.validate()?;
        match self.config.backend {
            BackendKind::Wgpu => self.run::<Autodiff<GpuBackend>>(&WgpuDevice::default()),
            BackendKind::Cpu  => self.run::<Autodiff<CpuBackend>>(&NdArrayDevice::default()),
        }
    }

    fn run<B: AutodiffBackend>(&self, device: &B::Device) -> Result<TrainOutcome> {
        let cfg = &self.config;

        // ── Step 1: Load the labelled corpus ─────────────────────────────────
        tracing::info!("Loading labelled notes from '{}'", cfg.data_path);
        let corpus = CsvCorpusLoader::new(&cfg.data_path).load_corpus()?;
        let counts = corpus.label_counts(2);
        tracing::info!("Loaded {} notes (label 0: {}, label 1: {})", corpus.len(), counts[0], counts[1]);

        // ── Step 2: Resolve the pretrained tokenizer ─────────────────────────
        let source    = PretrainedSource::parse(&cfg.base_model);
        let tokenizer = TokenizerStore::resolve_pretrained(&source)?;
        let adapter   = TokenizerAdapter::new(tokenizer.clone());

        // ── Step 3: Tokenize every note in one call ──────────────────────────
        // One call means one seq_len for the whole run under Longest.
        let block = adapter.tokenize(corpus.texts(), cfg.padding)?;
        tracing::info!("Tokenized corpus: {} rows × {} tokens", block.rows, block.seq_len);

        // ── Step 4: Optional hold-out ────────────────────────────────────────
        let all = NoteDataset::from_block(&block, corpus.labels());
        let (train, val) = split_train_val(all.samples().to_vec(), cfg.val_fraction, cfg.seed);
        let train = NoteDataset::new(train);
        let val   = NoteDataset::new(val);

        // ── Step 5: Pretrained body + fresh head ─────────────────────────────
        let labels = binary_labels();
        let (model, model_cfg) = from_pretrained::<B>(&source, labels.len(), device)?;

        // ── Step 6: Signature, from the export sample ────────────────────────
        let sample = adapter.tokenize(&[cfg.sample_text.as_str()], cfg.padding)?;
        let [rows, seq_len] = sample.shape();
        let signature = ModelSignature::token_inputs(rows, seq_len, labels, cfg.padding);

        // ── Step 7: Save config for export / predict ─────────────────────────
        let manager = CheckpointManager::new(&cfg.checkpoint_dir, cfg.versioned_checkpoints);
        manager.save_config(cfg).context("Cannot save training config")?;

        // ── Step 8: Training loop (Layer 5) ──────────────────────────────────
        let contents = CheckpointContents { tokenizer: &tokenizer, config: &model_cfg, signature: &signature };
        let mut controller = TrainingController::new(cfg).with_stop_signal(self.stop.clone());
        if cfg.checkpoint_policy == CheckpointPolicy::PerEpoch {
            controller = controller.with_checkpointing(Checkpointing { manager: &manager, contents });
        }
        match MetricsLogger::new(&cfg.log_dir) {
            Ok(logger) => controller = controller.with_metrics(logger),
            Err(e)     => tracing::warn!("Metrics logging disabled: {e:#}"),
        }

        let val_ref = (!val.samples().is_empty()).then_some(&val);
        let (model, state) = controller.run(model, &train, val_ref, device)?;

        if state.stopped_early {
            tracing::warn!("Run stopped after epoch {}; skipping export", state.epoch);
            return Ok(TrainOutcome { state, artifact: None });
        }

        if cfg.checkpoint_policy == CheckpointPolicy::None {
            let contents = CheckpointContents { tokenizer: &tokenizer, config: &model_cfg, signature: &signature };
            if let Err(e) = manager.save(&model, state.epoch, &contents) {
                tracing::warn!("Final checkpoint failed: {e:#}");
            }
        }

        // ── Step 9: Export ───────────────────────────────────────────────────
        let report = ArtifactExporter::new(&signature)
            .with_tokenizer(&tokenizer)
            .export(&model, &sample, Path::new(&cfg.artifact_path), device)?;

        Ok(TrainOutcome { state, artifact: Some(report) })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::path::Path;

    use burn::config::Config;
    use safetensors::tensor::{Dtype, TensorView};

    use crate::data::synth::NoteGenerator;
    use crate::domain::records::DesignNote;
    use crate::infra::hub::{CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE};
    use crate::infra::tokenizer_store::testing::{vocab_bound, word_level_tokenizer_json};
    use crate::ml::classifier::testing::tiny_config;

    pub(crate) const SAMPLE: &str = "Optimize transistor density for 3nm process.";

    /// Write `count` generated notes as a CSV and return them.
    pub(crate) fn notes_csv(path: &Path, count: usize) -> Vec<DesignNote> {
        let notes = NoteGenerator::new(7).generate(count);
        let mut w = csv::Writer::from_path(path).unwrap();
        for n in &notes {
            w.serialize(n).unwrap();
        }
        w.flush().unwrap();
        notes
    }

    /// A local pretrained bundle: tiny config, word-level tokenizer over
    /// `texts`, and a safetensors file holding the word embeddings.
    pub(crate) fn pretrained_dir(dir: &Path, texts: &[&str]) {
        std::fs::create_dir_all(dir).unwrap();
        let vocab = vocab_bound(texts);
        let body  = tiny_config(vocab).body;
        body.save(dir.join(CONFIG_FILE)).unwrap();
        std::fs::write(dir.join(TOKENIZER_FILE), word_level_tokenizer_json(texts).to_string()).unwrap();

        let values: Vec<f32> = (0..vocab * body.dim).map(|i| ((i % 13) as f32 - 6.0) * 0.01).collect();
        let bytes: &[u8] = bytemuck::cast_slice(&values);
        let view = TensorView::new(Dtype::F32, vec![vocab, body.dim], bytes).unwrap();
        let file = safetensors::serialize(
            vec![("distilbert.embeddings.word_embeddings.weight", view)],
            None::<HashMap<String, String>>,
        )
        .unwrap();
        std::fs::write(dir.join(WEIGHTS_FILE), file).unwrap();
    }
}
