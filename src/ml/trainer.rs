// ============================================================
// Layer 5 — Training Loop Controller
// ============================================================
// Fine-tunes the classifier with cross-entropy and AdamW.
//
//   for epoch in 1..=epochs
//     plan = EpochPlan(seed, epoch)       every example exactly once
//     for batch in plan
//       stop raised?      → return (completed = false)
//       forward + backward (guarded for OOM)
//       loss non-finite?  → DivergedTraining, nothing saved
//       AdamW step with lr linearly decayed to 0
//     validation (optional hold-out, inner backend, no dropout)
//     metrics.csv row, checkpoint (I/O failure only warns)
//
// Out-of-memory: a batch whose forward/backward panics with an
// allocation failure is retried once as two half batches, each
// with its own optimiser step. A second failure is fatal.
//
// Key Burn insight:
//   - Training runs on the Autodiff backend for gradients
//   - model.valid() returns the model on the inner backend
//   - the validation batcher must use the inner backend too
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::NoteBatcher,
    dataset::{NoteDataset, NoteSample},
    sampler::{halve, EpochPlan},
};
use crate::domain::error::PipelineError;
use crate::infra::checkpoint::{CheckpointContents, CheckpointManager};
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::ml::classifier::{count_correct, DistilBertClassifier};

// ─── Run state ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    /// Last fully finished epoch (0 before the first one ends)
    pub epoch:         usize,
    pub completed:     bool,
    pub stopped_early: bool,
    /// Optimiser steps taken
    pub steps:         usize,
}

/// Cooperative stop flag, checked before every batch.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where per-epoch checkpoints go, and what is saved beside θ.
pub struct Checkpointing<'a> {
    pub manager:  &'a CheckpointManager,
    pub contents: CheckpointContents<'a>,
}

/// `lr_t = lr · (1 − t / total)`, no warmup.
#[derive(Debug, Clone, Copy)]
pub struct LinearDecay {
    initial: f64,
    total:   usize,
}

impl LinearDecay {
    pub fn new(initial: f64, total: usize) -> Self {
        Self { initial, total: total.max(1) }
    }

    pub fn at(&self, step: usize) -> f64 {
        let remaining = self.total.saturating_sub(step) as f64 / self.total as f64;
        self.initial * remaining
    }
}

// ─── Controller ───────────────────────────────────────────────────────────────
pub struct TrainingController<'a> {
    cfg:        &'a TrainConfig,
    checkpoint: Option<Checkpointing<'a>>,
    metrics:    Option<MetricsLogger>,
    stop:       StopSignal,
    /// Runs inside the guarded step with the batch size; may panic.
    #[cfg(test)]
    fault:      Option<Box<dyn Fn(usize) + 'a>>,
}

impl<'a> TrainingController<'a> {
    pub fn new(cfg: &'a TrainConfig) -> Self {
        Self {
            cfg,
            checkpoint: None,
            metrics:    None,
            stop:       StopSignal::new(),
            #[cfg(test)]
            fault:      None,
        }
    }

    pub fn with_checkpointing(mut self, checkpoint: Checkpointing<'a>) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsLogger) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn run<B: AutodiffBackend>(
        &self,
        mut model: DistilBertClassifier<B>,
        train:     &NoteDataset,
        val:       Option<&NoteDataset>,
        device:    &B::Device,
    ) -> Result<(DistilBertClassifier<B>, RunState)> {
        let cfg = self.cfg;
        let n   = train.samples().len();
        if n == 0 {
            return Err(PipelineError::data(&cfg.data_path, "no training examples").into());
        }

        let batches_per_epoch = n.div_ceil(cfg.batch_size);
        let schedule = LinearDecay::new(cfg.learning_rate, cfg.epochs * batches_per_epoch);
        let mut optim = AdamWConfig::new()
            .with_weight_decay(cfg.weight_decay as f32)
            .init();

        tracing::info!(
            "Training on {} examples: {} epochs × {} batches (batch_size={})",
            n, cfg.epochs, batches_per_epoch, cfg.batch_size,
        );

        let mut state = RunState::default();

        for epoch in 1..=cfg.epochs {
            let plan = EpochPlan::new(n, cfg.batch_size, cfg.seed, epoch);
            let mut loss_sum = 0.0f64;
            let mut seen     = 0usize;
            let mut lr       = schedule.at(state.steps);

            for indices in plan.batches() {
                if self.stop.is_raised() {
                    tracing::info!("Stop requested at epoch {epoch}, step {}", state.steps);
                    state.stopped_early = true;
                    return Ok((model, state));
                }

                lr = schedule.at(state.steps);
                let items = train.select(indices);

                let (loss, grads) = match self.step(&model, items.clone(), device) {
                    Ok(out) => out,
                    Err(payload) if is_out_of_memory(payload.as_ref()) => {
                        tracing::warn!(
                            "Out of memory on batch of {} at epoch {epoch}; retrying as two halves",
                            items.len(),
                        );
                        let (a, b) = halve(indices);
                        for half in [a, b] {
                            if half.is_empty() {
                                continue;
                            }
                            let items = train.select(&half);
                            let (loss, grads) = self.step(&model, items, device).map_err(|p| {
                                if is_out_of_memory(p.as_ref()) {
                                    anyhow::Error::from(PipelineError::OutOfMemory {
                                        epoch,
                                        batch_size: cfg.batch_size,
                                    })
                                } else {
                                    panic::resume_unwind(p)
                                }
                            })?;
                            check_finite(loss, epoch, state.steps + 1)?;
                            model = optim.step(lr, model, grads);
                            state.steps += 1;
                            loss_sum += loss * half.len() as f64;
                            seen     += half.len();
                        }
                        continue;
                    }
                    Err(payload) => panic::resume_unwind(payload),
                };

                check_finite(loss, epoch, state.steps + 1)?;
                model = optim.step(lr, model, grads);
                state.steps += 1;
                loss_sum += loss * items.len() as f64;
                seen     += items.len();

                tracing::debug!("epoch {epoch} step {} loss={loss:.4} lr={lr:.3e}", state.steps);
            }

            let train_loss = loss_sum / seen.max(1) as f64;
            let (val_loss, val_acc) = match val.filter(|v| !v.samples().is_empty()) {
                Some(v) => {
                    let (l, a) = evaluate(&model.valid(), v, cfg.batch_size, device);
                    (Some(l), Some(a))
                }
                None => (None, None),
            };

            state.epoch = epoch;
            let metrics = EpochMetrics { epoch, train_loss, val_loss, val_acc, learning_rate: lr, examples: seen };
            self.report(&metrics);
            self.save_checkpoint(&model, epoch);
        }

        state.completed = true;
        tracing::info!("Training complete after {} steps", state.steps);
        Ok((model, state))
    }

    fn step<B: AutodiffBackend>(
        &self,
        model:  &DistilBertClassifier<B>,
        items:  Vec<NoteSample>,
        device: &B::Device,
    ) -> Result<(f64, GradientsParams), Panic> {
        #[cfg(test)]
        if let Some(fault) = &self.fault {
            let n = items.len();
            panic::catch_unwind(AssertUnwindSafe(|| fault(n)))?;
        }
        guarded_step(model, items, device)
    }

    fn report(&self, m: &EpochMetrics) {
        let fmt = |v: Option<f64>, scale: f64| v.map(|v| format!("{:.4}", v * scale)).unwrap_or_else(|| "-".into());
        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={} | val_acc={}% | lr={:.2e}",
            m.epoch, self.cfg.epochs, m.train_loss,
            fmt(m.val_loss, 1.0), fmt(m.val_acc, 100.0), m.learning_rate,
        );
        if let Some(logger) = &self.metrics {
            if let Err(e) = logger.log(m) {
                tracing::warn!("Could not write metrics for epoch {}: {e:#}", m.epoch);
            }
        }
    }

    fn save_checkpoint<B: AutodiffBackend>(&self, model: &DistilBertClassifier<B>, epoch: usize) {
        let Some(ckpt) = &self.checkpoint else { return };
        match ckpt.manager.save(model, epoch, &ckpt.contents) {
            Ok(dir) => tracing::info!("Checkpoint saved for epoch {} in '{}'", epoch, dir.display()),
            Err(e)  => tracing::warn!("Checkpoint for epoch {epoch} failed, continuing: {e:#}"),
        }
    }
}

type Panic = Box<dyn Any + Send + 'static>;

/// Forward + backward for one batch. Panics inside burn are caught so
/// an allocation failure can be retried.
fn guarded_step<B: AutodiffBackend>(
    model:  &DistilBertClassifier<B>,
    items:  Vec<NoteSample>,
    device: &B::Device,
) -> Result<(f64, GradientsParams), Panic> {
    panic::catch_unwind(AssertUnwindSafe(|| {
        let batch = Batcher::<B, _, _>::batch(&NoteBatcher, items, device);
        let (loss, _) = model.forward_loss(batch);
        let value: f64 = loss.clone().into_scalar().elem::<f64>();
        let grads = GradientsParams::from_grads(loss.backward(), model);
        (value, grads)
    }))
}

fn check_finite(loss: f64, epoch: usize, step: usize) -> Result<(), PipelineError> {
    if loss.is_finite() {
        Ok(())
    } else {
        tracing::error!("Non-finite loss {loss} at epoch {epoch}, step {step}");
        Err(PipelineError::DivergedTraining { epoch, step, loss })
    }
}

/// True when a caught panic came from a failed device allocation.
pub fn is_out_of_memory(payload: &(dyn Any + Send)) -> bool {
    let msg = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or_default()
        .to_lowercase();
    ["out of memory", "outofmemory", "memory allocation", "allocation failed"]
        .iter()
        .any(|needle| msg.contains(needle))
}

/// Mean loss and accuracy over `data`, without autodiff or dropout.
pub fn evaluate<B: Backend>(
    model:      &DistilBertClassifier<B>,
    data:       &NoteDataset,
    batch_size: usize,
    device:     &B::Device,
) -> (f64, f64) {
    let mut loss_sum = 0.0f64;
    let mut correct  = 0usize;
    let mut total    = 0usize;

    for chunk in data.samples().chunks(batch_size.max(1)) {
        let batch  = Batcher::<B, _, _>::batch(&NoteBatcher, chunk.to_vec(), device);
        let labels = batch.labels.clone();
        let (loss, logits) = model.forward_loss(batch);
        loss_sum += loss.into_scalar().elem::<f64>() * chunk.len() as f64;
        correct  += count_correct(logits, labels);
        total    += chunk.len();
    }

    let total = total.max(1) as f64;
    (loss_sum / total, correct as f64 / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
    use burn::module::Param;
    use std::cell::Cell;

    use crate::data::tokenize::TokenizerAdapter;
    use crate::domain::signature::{binary_labels, ModelSignature, PaddingPolicy};
    use crate::infra::checkpoint::MODEL_FILE;
    use crate::infra::hub::TOKENIZER_FILE;
    use crate::infra::tokenizer_store::testing::{vocab_bound, word_level_tokenizer};
    use crate::ml::classifier::testing::tiny_config;

    type B = Autodiff<NdArray>;

    const TEXTS: [&str; 4] = [
        "Optimize transistor density for 5nm process.",
        "Maintain current design for 7nm process.",
        "Reduce power efficiency for 3nm process.",
        "Review current design for 10nm process.",
    ];

    fn dataset() -> (tokenizers::Tokenizer, NoteDataset) {
        let tokenizer = word_level_tokenizer(&TEXTS);
        let block = TokenizerAdapter::new(tokenizer.clone())
            .tokenize(&TEXTS, PaddingPolicy::default())
            .unwrap();
        (tokenizer, NoteDataset::from_block(&block, &[1, 0, 1, 0]))
    }

    fn config(dir: &std::path::Path) -> TrainConfig {
        TrainConfig {
            epochs:         1,
            batch_size:     2,
            checkpoint_dir: dir.join("ckpt").display().to_string(),
            log_dir:        dir.join("logs").display().to_string(),
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_four_examples_one_epoch_completes_with_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let (tokenizer, data) = dataset();
        let device = NdArrayDevice::default();
        let model_cfg = tiny_config(vocab_bound(&TEXTS));
        let model = model_cfg.init::<B>(&device);

        let signature = ModelSignature::token_inputs(1, data.seq_len(), binary_labels(), PaddingPolicy::default());
        let manager = CheckpointManager::new(&cfg.checkpoint_dir, false);
        let controller = TrainingController::new(&cfg)
            .with_checkpointing(Checkpointing {
                manager:  &manager,
                contents: CheckpointContents { tokenizer: &tokenizer, config: &model_cfg, signature: &signature },
            })
            .with_metrics(MetricsLogger::new(&cfg.log_dir).unwrap());

        let (_, state) = controller.run(model, &data, None, &device).unwrap();

        assert_eq!(state.epoch, 1);
        assert!(state.completed);
        assert!(!state.stopped_early);
        assert_eq!(state.steps, 2);
        assert!(manager.dir().join(MODEL_FILE).is_file());
        assert!(manager.dir().join(TOKENIZER_FILE).is_file());

        let csv = std::fs::read_to_string(dir.path().join("logs").join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 2);
    }

    #[test]
    fn test_stop_signal_ends_run_early() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let (_, data) = dataset();
        let device = NdArrayDevice::default();
        let model = tiny_config(vocab_bound(&TEXTS)).init::<B>(&device);

        let stop = StopSignal::new();
        stop.raise();
        let (_, state) = TrainingController::new(&cfg)
            .with_stop_signal(stop)
            .run(model, &data, None, &device)
            .unwrap();

        assert_eq!(state, RunState { epoch: 0, completed: false, stopped_early: true, steps: 0 });
    }

    #[test]
    fn test_nan_loss_is_diverged_training_and_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let (tokenizer, data) = dataset();
        let device = NdArrayDevice::default();
        let model_cfg = tiny_config(vocab_bound(&TEXTS));
        let mut model = model_cfg.init::<B>(&device);
        model.classifier.bias = Some(Param::from_tensor(Tensor::full([2], f32::NAN, &device)));

        let signature = ModelSignature::token_inputs(1, data.seq_len(), binary_labels(), PaddingPolicy::default());
        let manager = CheckpointManager::new(&cfg.checkpoint_dir, false);
        let err = TrainingController::new(&cfg)
            .with_checkpointing(Checkpointing {
                manager:  &manager,
                contents: CheckpointContents { tokenizer: &tokenizer, config: &model_cfg, signature: &signature },
            })
            .run(model, &data, None, &device)
            .unwrap_err();

        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::DivergedTraining { epoch, step, .. }) => {
                assert_eq!((*epoch, *step), (1, 1));
            }
            other => panic!("expected DivergedTraining, got {other:?}"),
        }
        assert!(!manager.dir().join(MODEL_FILE).exists());
    }

    #[test]
    fn test_out_of_memory_batch_retried_as_two_halves() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let (_, data) = dataset();
        let device = NdArrayDevice::default();
        let model = tiny_config(vocab_bound(&TEXTS)).init::<B>(&device);

        let calls = Cell::new(0usize);
        let mut controller = TrainingController::new(&cfg);
        controller.fault = Some(Box::new(|_| {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                panic!("out of memory");
            }
        }));
        let (_, state) = controller.run(model, &data, None, &device).unwrap();

        assert!(state.completed);
        assert_eq!(state.steps, 3);
    }

    #[test]
    fn test_second_out_of_memory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let (_, data) = dataset();
        let device = NdArrayDevice::default();
        let model = tiny_config(vocab_bound(&TEXTS)).init::<B>(&device);

        let mut controller = TrainingController::new(&cfg);
        controller.fault = Some(Box::new(|_| panic!("out of memory")));
        let err = controller.run(model, &data, None, &device).unwrap_err();

        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::OutOfMemory { epoch, batch_size }) => {
                assert_eq!((*epoch, *batch_size), (1, 2));
            }
            other => panic!("expected OutOfMemory, got {other:?}"),
        }
    }

    #[test]
    fn test_checkpoint_write_failure_does_not_stop_training() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let cfg = TrainConfig { epochs: 2, ..config(dir.path()) };
        let (tokenizer, data) = dataset();
        let device = NdArrayDevice::default();
        let model_cfg = tiny_config(vocab_bound(&TEXTS));
        let model = model_cfg.init::<B>(&device);

        let signature = ModelSignature::token_inputs(1, data.seq_len(), binary_labels(), PaddingPolicy::default());
        let manager = CheckpointManager::new(blocker.join("ckpt").display().to_string(), false);
        let (_, state) = TrainingController::new(&cfg)
            .with_checkpointing(Checkpointing {
                manager:  &manager,
                contents: CheckpointContents { tokenizer: &tokenizer, config: &model_cfg, signature: &signature },
            })
            .run(model, &data, None, &device)
            .unwrap();

        assert_eq!(state, RunState { epoch: 2, completed: true, stopped_early: false, steps: 4 });
        assert!(!manager.dir().join(MODEL_FILE).exists());
    }

    #[test]
    fn test_validation_reports_accuracy_in_range() {
        let (_, data) = dataset();
        let device = NdArrayDevice::default();
        let model = tiny_config(vocab_bound(&TEXTS)).init::<NdArray>(&device);
        let (loss, acc) = evaluate(&model, &data, 3, &device);
        assert!(loss.is_finite());
        assert!((0.0..=1.0).contains(&acc));
    }

    #[test]
    fn test_linear_decay_reaches_zero() {
        let s = LinearDecay::new(5e-5, 4);
        assert_eq!(s.at(0), 5e-5);
        assert!((s.at(2) - 2.5e-5).abs() < 1e-12);
        assert_eq!(s.at(4), 0.0);
        assert_eq!(s.at(10), 0.0);
    }

    #[test]
    fn test_out_of_memory_detection() {
        let oom: Box<dyn Any + Send> = Box::new(String::from("wgpu: Out of memory while allocating buffer"));
        let other: Box<dyn Any + Send> = Box::new("index out of bounds");
        assert!(is_out_of_memory(oom.as_ref()));
        assert!(!is_out_of_memory(other.as_ref()));
    }
}
