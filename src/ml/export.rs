// ============================================================
// Layer 5 — Artifact Exporter
// ============================================================
// Turns a trained classifier into a single portable file:
//
//   1. inference mode   model.valid() → inner backend, dropout off
//   2. trace            one forward pass on the sample through a
//                       GraphTracer; real tensors flow as usual
//   3. lower            declared input shapes == traced shapes,
//                       inactive dropout removed, active dropout
//                       rejected, logits width == label count
//   4. persist          safetensors container:
//                         tensors     = every referenced parameter
//                         __metadata__ = format, version, graph,
//                                        signature, tokenizer
//
// The file is replaced wholesale; a failed export leaves any
// checkpoint untouched because only the artifact path is written.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use safetensors::tensor::{Dtype, TensorView};
use tokenizers::Tokenizer;

use crate::data::{batcher::NoteBatcher, dataset::NoteSample, tokenize::TokenBlock};
use crate::domain::{error::PipelineError, signature::ModelSignature};
use crate::ml::classifier::DistilBertClassifier;
use crate::ml::graph::{PortableGraph, Slot, TracedOp};
use crate::ml::trace::{GraphTracer, TracedGraph};

pub const FORMAT_TAG: &str = "chip-design-llm/portable-graph";
pub const FORMAT_VERSION: u32 = 1;

pub const META_FORMAT: &str = "format";
pub const META_VERSION: &str = "version";
pub const META_GRAPH: &str = "graph";
pub const META_SIGNATURE: &str = "signature";
pub const META_TOKENIZER: &str = "tokenizer";

/// What an export produced, for logging and for the consistency check.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub path:       PathBuf,
    pub nodes:      usize,
    pub params:     usize,
    /// Logits computed in memory while tracing, row-major.
    pub logits:     Vec<f32>,
}

pub struct ArtifactExporter<'a> {
    signature: &'a ModelSignature,
    tokenizer: Option<&'a Tokenizer>,
}

impl<'a> ArtifactExporter<'a> {
    pub fn new(signature: &'a ModelSignature) -> Self {
        Self { signature, tokenizer: None }
    }

    /// Embed the tokenizer so the artifact can classify raw text.
    pub fn with_tokenizer(mut self, tokenizer: &'a Tokenizer) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Export a model coming straight out of training.
    pub fn export<B: AutodiffBackend>(
        &self,
        model:  &DistilBertClassifier<B>,
        sample: &TokenBlock,
        path:   &Path,
        device: &B::Device,
    ) -> Result<ExportReport, PipelineError> {
        self.export_inference(&model.valid(), sample, path, device)
    }

    /// Export a model already on an inference backend.
    pub fn export_inference<B: Backend>(
        &self,
        model:  &DistilBertClassifier<B>,
        sample: &TokenBlock,
        path:   &Path,
        device: &B::Device,
    ) -> Result<ExportReport, PipelineError> {
        let (traced, logits) = trace(model, sample, device)?;
        let graph = lower(&traced, self.signature)?;
        self.persist(&graph, &traced, path)?;

        let report = ExportReport {
            path:   path.to_path_buf(),
            nodes:  graph.nodes.len(),
            params: graph.param_names().len(),
            logits,
        };
        tracing::info!(
            "Exported {} ops / {} tensors to '{}'",
            report.nodes, report.params, report.path.display()
        );
        Ok(report)
    }

    fn persist(&self, graph: &PortableGraph, traced: &TracedGraph, path: &Path) -> Result<(), PipelineError> {
        let mut blobs: Vec<(String, Vec<usize>, &[u8])> = Vec::new();
        for name in graph.param_names() {
            let data = traced
                .params
                .get(name)
                .ok_or_else(|| PipelineError::artifact(path, format!("parameter '{name}' was not captured")))?;
            blobs.push((name.to_string(), data.shape.clone(), bytemuck::cast_slice(data.values.as_slice())));
        }

        let views = blobs
            .iter()
            .map(|(name, shape, bytes)| {
                TensorView::new(Dtype::F32, shape.clone(), bytes)
                    .map(|v| (name.as_str(), v))
                    .map_err(|e| PipelineError::artifact(path, format!("tensor '{name}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut metadata = HashMap::new();
        metadata.insert(META_FORMAT.to_string(), FORMAT_TAG.to_string());
        metadata.insert(META_VERSION.to_string(), FORMAT_VERSION.to_string());
        metadata.insert(META_GRAPH.to_string(), to_json(path, graph)?);
        metadata.insert(META_SIGNATURE.to_string(), to_json(path, self.signature)?);
        if let Some(tok) = self.tokenizer {
            let tok_json = tok
                .to_string(false)
                .map_err(|e| PipelineError::artifact(path, format!("cannot serialise tokenizer: {e}")))?;
            metadata.insert(META_TOKENIZER.to_string(), tok_json);
        }

        let bytes = safetensors::serialize(views, Some(metadata))
            .map_err(|e| PipelineError::artifact(path, format!("serialisation failed: {e}")))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::artifact(path, e))?;
        }
        std::fs::write(path, bytes).map_err(|e| PipelineError::artifact(path, e))
    }
}

fn to_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<String, PipelineError> {
    serde_json::to_string(value).map_err(|e| PipelineError::artifact(path, e))
}

/// Run the forward pass once under a tracer.
pub fn trace<B: Backend>(
    model:  &DistilBertClassifier<B>,
    sample: &TokenBlock,
    device: &B::Device,
) -> Result<(TracedGraph, Vec<f32>), PipelineError> {
    let items: Vec<NoteSample> = (0..sample.rows)
        .map(|row| NoteSample {
            input_ids:      sample.ids_row(row).to_vec(),
            attention_mask: sample.mask_row(row).to_vec(),
            label:          0,
        })
        .collect();
    let batch = Batcher::<B, _, _>::batch(&NoteBatcher, items, device);

    let mut tracer = GraphTracer::new();
    let logits = model.forward(batch.input_ids, batch.attention_mask, &mut tracer);
    let graph  = tracer.finish().map_err(|reason| PipelineError::UnsupportedOp { op: reason })?;

    let logits: Vec<f32> = logits
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| PipelineError::UnsupportedOp { op: format!("cannot read logits: {e:?}") })?;
    Ok((graph, logits))
}

/// Check the traced graph against the declared signature and drop
/// ops that are identities at inference time.
pub fn lower(traced: &TracedGraph, signature: &ModelSignature) -> Result<PortableGraph, PipelineError> {
    for declared in &signature.inputs {
        let traced_shape = traced.input(&declared.name).map(|i| i.shape.clone()).unwrap_or_default();
        if traced_shape != declared.shape {
            return Err(PipelineError::ExportShapeMismatch {
                input:    declared.name.clone(),
                declared: declared.shape.clone(),
                traced:   traced_shape,
            });
        }
    }
    for input in &traced.inputs {
        if signature.input(&input.name).is_none() {
            return Err(PipelineError::ExportShapeMismatch {
                input:    input.name.clone(),
                declared: Vec::new(),
                traced:   input.shape.clone(),
            });
        }
    }

    // Inactive dropout is an identity: forward its input slot.
    let mut alias: HashMap<Slot, Slot> = HashMap::new();
    let resolve = |alias: &HashMap<Slot, Slot>, s: Slot| *alias.get(&s).unwrap_or(&s);

    let mut nodes = Vec::with_capacity(traced.nodes.len());
    for node in &traced.nodes {
        let inputs: Vec<Slot> = node.inputs.iter().map(|&s| resolve(&alias, s)).collect();
        match node.op {
            TracedOp::Dropout { active: true, prob } => {
                return Err(PipelineError::UnsupportedOp {
                    op: format!("dropout(p={prob}) active at trace time"),
                });
            }
            TracedOp::Dropout { active: false, .. } => {
                if let Some(&src) = inputs.first() {
                    alias.insert(node.output, src);
                }
            }
            _ => {
                let mut node = node.clone();
                node.inputs = inputs;
                nodes.push(node);
            }
        }
    }

    let outputs: Vec<_> = traced
        .outputs
        .iter()
        .map(|o| {
            let mut o = o.clone();
            o.slot = resolve(&alias, o.slot);
            o
        })
        .collect();

    // The logits width must match the label mapping.
    if let Some(out) = outputs.first() {
        let width = nodes
            .iter()
            .find(|n| n.output == out.slot)
            .and_then(|n| n.shape.last().copied())
            .unwrap_or(0);
        if width != signature.num_labels() {
            return Err(PipelineError::ExportShapeMismatch {
                input:    out.name.clone(),
                declared: vec![signature.num_labels()],
                traced:   vec![width],
            });
        }
    }

    Ok(PortableGraph { inputs: traced.inputs.clone(), nodes, outputs })
}
