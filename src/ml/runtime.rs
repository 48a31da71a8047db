// ============================================================
// Layer 5 — Portable Runtime
// ============================================================
// Loads an exported artifact and evaluates its graph with plain
// ndarray arithmetic. No burn types are involved, so this is what
// an on-device consumer of the file has to implement.
//
//   Artifact::load(path)      format tag + version check
//   artifact.run(ids, mask)   shape check against the signature,
//                             then one pass over the op list
//   artifact.classify(..)     softmax over logits, keyed by label
//
// Values live in slots indexed by the graph's Slot numbers; every
// op reads its operand slots and writes its output slot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::{s, Array2, Array4, ArrayD, ArrayView1, Axis, Ix1, Ix2, Ix3, Ix4, IxDyn, Zip};
use safetensors::{tensor::Dtype, SafeTensors};
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::domain::{
    error::PipelineError,
    signature::{ModelSignature, ATTENTION_MASK, INPUT_IDS},
};
use crate::ml::export::{FORMAT_TAG, FORMAT_VERSION, META_FORMAT, META_GRAPH, META_SIGNATURE, META_TOKENIZER, META_VERSION};
use crate::ml::graph::{PortableGraph, Slot, TracedOp};

/// One classified row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label:         String,
    /// (label, probability) in class order
    pub probabilities: Vec<(String, f32)>,
}

#[derive(Debug, Clone)]
enum Value {
    Ids(Array2<i64>),
    Float(ArrayD<f32>),
}

pub struct Artifact {
    path:      PathBuf,
    graph:     PortableGraph,
    signature: ModelSignature,
    tokenizer: Option<String>,
    params:    HashMap<String, ArrayD<f32>>,
}

impl Artifact {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path  = path.as_ref();
        let err   = |reason: String| PipelineError::artifact(path, reason);
        let bytes = std::fs::read(path).map_err(|e| err(format!("cannot read: {e}")))?;

        let (_, header) = SafeTensors::read_metadata(&bytes).map_err(|e| err(format!("not a safetensors file: {e}")))?;
        let meta = header.metadata().clone().unwrap_or_default();
        let field = |key: &str| meta.get(key).cloned().ok_or_else(|| err(format!("missing '{key}' metadata")));

        if field(META_FORMAT)? != FORMAT_TAG {
            return Err(err(format!("unknown format tag, expected '{FORMAT_TAG}'")));
        }
        let version: u32 = field(META_VERSION)?.parse().map_err(|e| err(format!("bad version: {e}")))?;
        if version != FORMAT_VERSION {
            return Err(err(format!("format version {version} is not supported (expected {FORMAT_VERSION})")));
        }
        let graph: PortableGraph = serde_json::from_str(&field(META_GRAPH)?).map_err(|e| err(format!("bad graph: {e}")))?;
        let signature: ModelSignature =
            serde_json::from_str(&field(META_SIGNATURE)?).map_err(|e| err(format!("bad signature: {e}")))?;
        let tokenizer = meta.get(META_TOKENIZER).cloned();

        let st = SafeTensors::deserialize(&bytes).map_err(|e| err(format!("bad tensors: {e}")))?;
        let mut params = HashMap::new();
        for name in graph.param_names() {
            let view = st.tensor(name).map_err(|e| err(format!("tensor '{name}': {e}")))?;
            if view.dtype() != Dtype::F32 {
                return Err(err(format!("tensor '{name}' is {:?}, expected F32", view.dtype())));
            }
            let values: Vec<f32> = view
                .data()
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            let array = ArrayD::from_shape_vec(IxDyn(view.shape()), values)
                .map_err(|e| err(format!("tensor '{name}': {e}")))?;
            params.insert(name.to_string(), array);
        }

        tracing::debug!("Loaded artifact '{}': {} ops, {} tensors", path.display(), graph.nodes.len(), params.len());
        Ok(Self { path: path.to_path_buf(), graph, signature, tokenizer, params })
    }

    pub fn signature(&self) -> &ModelSignature {
        &self.signature
    }

    /// The tokenizer embedded at export time, if any.
    pub fn tokenizer(&self) -> Result<Option<Tokenizer>, PipelineError> {
        self.tokenizer
            .as_ref()
            .map(|json| {
                Tokenizer::from_bytes(json.as_bytes())
                    .map_err(|e| PipelineError::artifact(&self.path, format!("embedded tokenizer: {e}")))
            })
            .transpose()
    }

    /// Logits `[batch, num_labels]`.
    pub fn run(&self, input_ids: &Array2<i64>, attention_mask: &Array2<i64>) -> Result<Array2<f32>, PipelineError> {
        self.check_input(INPUT_IDS, input_ids.shape())?;
        self.check_input(ATTENTION_MASK, attention_mask.shape())?;

        let mut slots: HashMap<Slot, Value> = HashMap::new();
        for input in &self.graph.inputs {
            let value = match input.name.as_str() {
                INPUT_IDS      => input_ids.clone(),
                ATTENTION_MASK => attention_mask.clone(),
                other => return Err(self.format_err(format!("unknown graph input '{other}'"))),
            };
            slots.insert(input.slot, Value::Ids(value));
        }

        for node in &self.graph.nodes {
            let out = self.eval(&node.op, &node.inputs, &slots)?;
            slots.insert(node.output, Value::Float(out));
        }

        let out = self
            .graph
            .outputs
            .first()
            .ok_or_else(|| self.format_err("graph has no outputs".into()))?;
        match slots.remove(&out.slot) {
            Some(Value::Float(v)) => v
                .into_dimensionality::<Ix2>()
                .map_err(|e| self.format_err(format!("logits are not 2-D: {e}"))),
            _ => Err(self.format_err(format!("output '{}' was never produced", out.name))),
        }
    }

    /// Softmax over each row of logits, labelled with the class names.
    pub fn classify(&self, input_ids: &Array2<i64>, attention_mask: &Array2<i64>) -> Result<Vec<Classification>, PipelineError> {
        let logits = self.run(input_ids, attention_mask)?;
        let probs  = softmax_last(logits.into_dyn());
        let labels = &self.signature.class_labels;

        Ok(probs
            .outer_iter()
            .map(|row| {
                let probabilities: Vec<(String, f32)> =
                    labels.iter().cloned().zip(row.iter().copied()).collect();
                let label = probabilities
                    .iter()
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(l, _)| l.clone())
                    .unwrap_or_default();
                Classification { label, probabilities }
            })
            .collect())
    }

    fn check_input(&self, name: &str, shape: &[usize]) -> Result<(), PipelineError> {
        match self.signature.input(name) {
            Some(spec) if spec.shape == shape => Ok(()),
            Some(spec) => Err(self.format_err(format!(
                "input '{name}' has shape {shape:?}, artifact expects {:?}", spec.shape
            ))),
            None => Err(self.format_err(format!("artifact does not declare input '{name}'"))),
        }
    }

    fn format_err(&self, reason: String) -> PipelineError {
        PipelineError::artifact(&self.path, reason)
    }

    fn param(&self, name: &str) -> Result<&ArrayD<f32>, PipelineError> {
        self.params.get(name).ok_or_else(|| self.format_err(format!("missing tensor '{name}'")))
    }

    fn float<'v>(&self, slots: &'v HashMap<Slot, Value>, slot: Slot) -> Result<&'v ArrayD<f32>, PipelineError> {
        match slots.get(&slot) {
            Some(Value::Float(v)) => Ok(v),
            _ => Err(self.format_err(format!("slot {} is not a float value", slot.0))),
        }
    }

    fn ids<'v>(&self, slots: &'v HashMap<Slot, Value>, slot: Slot) -> Result<&'v Array2<i64>, PipelineError> {
        match slots.get(&slot) {
            Some(Value::Ids(v)) => Ok(v),
            _ => Err(self.format_err(format!("slot {} is not an id tensor", slot.0))),
        }
    }

    fn eval(&self, op: &TracedOp, inputs: &[Slot], slots: &HashMap<Slot, Value>) -> Result<ArrayD<f32>, PipelineError> {
        let arg = |i: usize| inputs.get(i).copied().ok_or_else(|| self.format_err(format!("{} is missing operand {i}", op.name())));
        let shape_err = |e: ndarray::ShapeError| self.format_err(format!("{}: {e}", op.name()));

        let out = match op {
            TracedOp::Embedding { weight } => {
                let ids = self.ids(slots, arg(0)?)?;
                let w   = self.param(weight)?.view().into_dimensionality::<Ix2>().map_err(shape_err)?;
                let (b, s) = ids.dim();
                let d = w.ncols();
                let mut out = ndarray::Array3::<f32>::zeros((b, s, d));
                for ((bi, si), &id) in ids.indexed_iter() {
                    let row = usize::try_from(id)
                        .ok()
                        .filter(|&r| r < w.nrows())
                        .ok_or_else(|| self.format_err(format!("token id {id} outside vocabulary")))?;
                    out.slice_mut(s![bi, si, ..]).assign(&w.row(row));
                }
                out.into_dyn()
            }
            TracedOp::PositionEmbedding { weight } => {
                let ids = self.ids(slots, arg(0)?)?;
                let w   = self.param(weight)?.view().into_dimensionality::<Ix2>().map_err(shape_err)?;
                let (b, s) = ids.dim();
                if s > w.nrows() {
                    return Err(self.format_err(format!("sequence length {s} exceeds {} positions", w.nrows())));
                }
                let pos = w.slice(s![..s, ..]);
                let mut out = ndarray::Array3::<f32>::zeros((b, s, w.ncols()));
                for mut row in out.outer_iter_mut() {
                    row.assign(&pos);
                }
                out.into_dyn()
            }
            TracedOp::Add => self.float(slots, arg(0)?)? + self.float(slots, arg(1)?)?,
            TracedOp::LayerNorm { gamma, beta, epsilon } => {
                let x = self.float(slots, arg(0)?)?;
                let g = self.param(gamma)?.view().into_dimensionality::<Ix1>().map_err(shape_err)?;
                let b = self.param(beta)?.view().into_dimensionality::<Ix1>().map_err(shape_err)?;
                layer_norm(x, g, b, *epsilon as f32)
            }
            TracedOp::Linear { weight, bias } => {
                let x = self.float(slots, arg(0)?)?;
                let w = self.param(weight)?.view().into_dimensionality::<Ix2>().map_err(shape_err)?;
                let b = bias.as_deref().map(|b| self.param(b)).transpose()?;
                linear(x, w, b).map_err(shape_err)?
            }
            TracedOp::Gelu => self.float(slots, arg(0)?)?.mapv(gelu),
            TracedOp::Relu => self.float(slots, arg(0)?)?.mapv(|v| v.max(0.0)),
            TracedOp::SplitHeads { heads } => {
                let x = self.float(slots, arg(0)?)?.view().into_dimensionality::<Ix3>().map_err(shape_err)?;
                let (b, s, d) = x.dim();
                x.as_standard_layout()
                    .into_owned()
                    .into_shape_with_order((b, s, *heads, d / heads))
                    .map_err(shape_err)?
                    .permuted_axes([0, 2, 1, 3])
                    .as_standard_layout()
                    .into_owned()
                    .into_dyn()
            }
            TracedOp::MergeHeads => {
                let x = self.float(slots, arg(0)?)?.view().into_dimensionality::<Ix4>().map_err(shape_err)?;
                let (b, h, s, dh) = x.dim();
                x.permuted_axes([0, 2, 1, 3])
                    .as_standard_layout()
                    .into_owned()
                    .into_shape_with_order((b, s, h * dh))
                    .map_err(shape_err)?
                    .into_dyn()
            }
            TracedOp::AttentionScores { scale } => {
                let q = self.float(slots, arg(0)?)?.view().into_dimensionality::<Ix4>().map_err(shape_err)?;
                let k = self.float(slots, arg(1)?)?.view().into_dimensionality::<Ix4>().map_err(shape_err)?;
                let k_t = k.permuted_axes([0, 1, 3, 2]);
                (batched_matmul(q, k_t) * (*scale as f32)).into_dyn()
            }
            TracedOp::MaskPadding { fill } => {
                let scores = self.float(slots, arg(0)?)?.view().into_dimensionality::<Ix4>().map_err(shape_err)?;
                let mask   = self.ids(slots, arg(1)?)?;
                let mut out = scores.to_owned();
                for ((b, _, _, j), v) in out.indexed_iter_mut() {
                    if mask[[b, j]] == 0 {
                        *v = *fill;
                    }
                }
                out.into_dyn()
            }
            TracedOp::Softmax => softmax_last(self.float(slots, arg(0)?)?.clone()),
            TracedOp::MatMul => {
                let a = self.float(slots, arg(0)?)?.view().into_dimensionality::<Ix4>().map_err(shape_err)?;
                let b = self.float(slots, arg(1)?)?.view().into_dimensionality::<Ix4>().map_err(shape_err)?;
                batched_matmul(a, b).into_dyn()
            }
            TracedOp::SelectFirstToken => {
                let x = self.float(slots, arg(0)?)?.view().into_dimensionality::<Ix3>().map_err(shape_err)?;
                x.index_axis(Axis(1), 0).to_owned().into_dyn()
            }
            TracedOp::Dropout { active: false, .. } => self.float(slots, arg(0)?)?.clone(),
            TracedOp::Dropout { active: true, prob } => {
                return Err(PipelineError::UnsupportedOp { op: format!("dropout(p={prob})") });
            }
        };
        Ok(out)
    }
}

fn linear(
    x: &ArrayD<f32>,
    w: ndarray::ArrayView2<'_, f32>,
    b: Option<&ArrayD<f32>>,
) -> Result<ArrayD<f32>, ndarray::ShapeError> {
    let shape  = x.shape().to_vec();
    let d_in   = shape.last().copied().unwrap_or(0);
    let rows   = x.len() / d_in.max(1);
    let x2     = x.as_standard_layout().into_owned().into_shape_with_order((rows, d_in))?;
    let mut y  = x2.dot(&w);
    if let Some(b) = b {
        let b = b.view().into_dimensionality::<Ix1>()?;
        y += &b;
    }
    let mut out_shape = shape;
    if let Some(last) = out_shape.last_mut() {
        *last = w.ncols();
    }
    y.into_shape_with_order(IxDyn(&out_shape))
}

fn layer_norm(x: &ArrayD<f32>, gamma: ArrayView1<'_, f32>, beta: ArrayView1<'_, f32>, eps: f32) -> ArrayD<f32> {
    let last = Axis(x.ndim() - 1);
    let mut out = x.to_owned();
    for mut lane in out.lanes_mut(last) {
        let n    = lane.len() as f32;
        let mean = lane.sum() / n;
        let var  = lane.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
        let inv  = 1.0 / (var + eps).sqrt();
        Zip::from(&mut lane)
            .and(&gamma)
            .and(&beta)
            .for_each(|v, &g, &b| *v = (*v - mean) * inv * g + b);
    }
    out
}

fn softmax_last(x: ArrayD<f32>) -> ArrayD<f32> {
    let last = Axis(x.ndim() - 1);
    let mut out = x;
    for mut lane in out.lanes_mut(last) {
        let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        lane.mapv_inplace(|v| (v - max).exp());
        let sum = lane.sum();
        lane.mapv_inplace(|v| v / sum);
    }
    out
}

fn batched_matmul(a: ndarray::ArrayView4<'_, f32>, b: ndarray::ArrayView4<'_, f32>) -> Array4<f32> {
    let (bs, h, m, _) = a.dim();
    let n = b.dim().3;
    let mut out = Array4::<f32>::zeros((bs, h, m, n));
    for bi in 0..bs {
        for hi in 0..h {
            let prod = a.slice(s![bi, hi, .., ..]).dot(&b.slice(s![bi, hi, .., ..]));
            out.slice_mut(s![bi, hi, .., ..]).assign(&prod);
        }
    }
    out
}

/// Exact GELU, `0.5·x·(1 + erf(x/√2))`.
fn gelu(x: f32) -> f32 {
    let x = x as f64;
    (0.5 * x * (1.0 + erf(x / std::f64::consts::SQRT_2))) as f32
}

/// Abramowitz & Stegun 7.1.26, |error| < 1.5e-7.
fn erf(x: f64) -> f64 {
    const A: [f64; 5] = [0.254829592, -0.284496736, 1.421413741, -1.453152027, 1.061405429];
    const P: f64 = 0.3275911;
    let sign = x.signum();
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A[4] * t + A[3]) * t + A[2]) * t + A[1]) * t + A[0]) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};

    use crate::data::tokenize::TokenizerAdapter;
    use crate::domain::signature::{binary_labels, PaddingPolicy};
    use crate::infra::tokenizer_store::testing::{vocab_bound, word_level_tokenizer};
    use crate::ml::classifier::testing::tiny_config;
    use crate::ml::export::ArtifactExporter;

    const TEXTS: [&str; 2] = [
        "Optimize transistor density for 5nm process.",
        "Review current design for 10nm process.",
    ];

    fn to_array(rows: usize, cols: usize, v: &[u32]) -> Array2<i64> {
        Array2::from_shape_vec((rows, cols), v.iter().map(|&x| x as i64).collect()).unwrap()
    }

    #[test]
    fn test_exported_artifact_reproduces_logits() {
        let dir    = tempfile::tempdir().unwrap();
        let path   = dir.path().join("notes.safetensors");
        let device = NdArrayDevice::default();
        let model  = tiny_config(vocab_bound(&TEXTS)).init::<Autodiff<NdArray>>(&device);

        // Longest padding: the second row carries padding positions.
        let tokenizer = word_level_tokenizer(&TEXTS);
        let policy = PaddingPolicy::Longest { max_length: 64 };
        let block  = TokenizerAdapter::new(tokenizer.clone()).tokenize(&TEXTS, policy).unwrap();
        let [rows, seq_len] = block.shape();
        let sig = ModelSignature::token_inputs(rows, seq_len, binary_labels(), policy);

        let report = ArtifactExporter::new(&sig)
            .with_tokenizer(&tokenizer)
            .export(&model, &block, &path, &device)
            .unwrap();

        let artifact = Artifact::load(&path).unwrap();
        let ids  = to_array(rows, seq_len, &block.input_ids);
        let mask = to_array(rows, seq_len, &block.attention_mask);
        let logits = artifact.run(&ids, &mask).unwrap();

        assert_eq!(logits.dim(), (rows, 2));
        for (portable, in_memory) in logits.iter().zip(&report.logits) {
            assert!((portable - in_memory).abs() < 1e-4, "{portable} vs {in_memory}");
        }

        let classes = artifact.classify(&ids, &mask).unwrap();
        assert_eq!(classes.len(), rows);
        let total: f32 = classes[0].probabilities.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(artifact.tokenizer().unwrap().is_some());
    }

    #[test]
    fn test_wrong_input_shape_is_rejected() {
        let dir    = tempfile::tempdir().unwrap();
        let path   = dir.path().join("m.safetensors");
        let device = NdArrayDevice::default();
        let model  = tiny_config(vocab_bound(&TEXTS)).init::<NdArray>(&device);
        let tokenizer = word_level_tokenizer(&TEXTS);
        let policy = PaddingPolicy::Fixed { length: 12 };
        let block  = TokenizerAdapter::new(tokenizer).tokenize(&TEXTS[..1], policy).unwrap();
        let sig    = ModelSignature::token_inputs(1, 12, binary_labels(), policy);
        ArtifactExporter::new(&sig).export_inference(&model, &block, &path, &device).unwrap();

        let artifact = Artifact::load(&path).unwrap();
        let ids = Array2::<i64>::zeros((1, 8));
        assert_eq!(artifact.run(&ids, &ids).unwrap_err().kind(), "ArtifactFormat");
    }

    #[test]
    fn test_non_artifact_file_is_rejected() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.safetensors");
        std::fs::write(&path, b"not a model").unwrap();
        assert_eq!(Artifact::load(&path).err().map(|e| e.kind()), Some("ArtifactFormat"));
    }

    #[test]
    fn test_erf_reference_points() {
        assert!(erf(0.0).abs() < 1e-7);
        assert!((erf(1.0) - 0.842_700_79).abs() < 1e-6);
        assert!((erf(-1.0) + 0.842_700_79).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let x = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![1.0, 2.0, 3.0, -1e9, 0.0, 0.0]).unwrap();
        let p = softmax_last(x);
        for row in p.outer_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
        assert_eq!(p[[1, 0]], 0.0);
    }
}
