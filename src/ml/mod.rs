// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that touches burn tensors lives here, plus the
// portable runtime that deliberately does not.
//
//   graph.rs       — portable op list shared by exporter and runtime
//   trace.rs       — GraphObserver: records ops during a forward pass
//   distilbert.rs  — DistilBERT body (embeddings + post-LN blocks)
//   classifier.rs  — body + pre_classifier / classifier head
//   pretrained.rs  — pretrained safetensors → body parameters
//   trainer.rs     — epoch/batch loop, AdamW, checkpoints, metrics
//   export.rs      — inference mode → trace → lower → safetensors file
//   runtime.rs     — ndarray interpreter for exported artifacts
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Sanh et al. (2019) DistilBERT

use serde::{Deserialize, Serialize};

/// Portable graph types (no burn dependency)
pub mod graph;

/// Forward-pass recording
pub mod trace;

/// DistilBERT encoder body
pub mod distilbert;

/// Sequence classifier built on the body
pub mod classifier;

/// Loading the pretrained body
pub mod pretrained;

/// Training loop controller
pub mod trainer;

/// Exporter to the portable artifact
pub mod export;

/// Interpreter for the portable artifact
pub mod runtime;

pub type GpuBackend = burn::backend::Wgpu;
pub type CpuBackend = burn::backend::NdArray;

/// Which burn backend a training or export run uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Wgpu,
    Cpu,
}
