// ============================================================
// Layer 5 — Graph Vocabulary
// ============================================================
// Plain data shared by the tracer (which records it from a live
// burn model) and the portable runtime (which interprets it with
// ndarray). Nothing here depends on the training framework, so
// the runtime can load an artifact without it.

use serde::{Deserialize, Serialize};

/// Handle to a value in the traced graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot(pub usize);

/// Operations the forward pass can emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TracedOp {
    /// Row lookup: ids [B,S] → [B,S,D].
    Embedding { weight: String },
    /// Lookup of positions 0..S, broadcast over the batch.
    PositionEmbedding { weight: String },
    Add,
    LayerNorm { gamma: String, beta: String, epsilon: f64 },
    /// `x · W + b` with W stored as [d_in, d_out].
    Linear { weight: String, bias: Option<String> },
    Gelu,
    Relu,
    /// [B,S,D] → [B,H,S,D/H]
    SplitHeads { heads: usize },
    /// [B,H,S,Dh] → [B,S,H*Dh]
    MergeHeads,
    /// q · kᵀ · scale
    AttentionScores { scale: f64 },
    /// Fill scores where attention_mask == 0.
    MaskPadding { fill: f32 },
    /// Softmax over the last axis.
    Softmax,
    MatMul,
    /// [B,S,D] → [B,D], position 0.
    SelectFirstToken,
    Dropout { prob: f64, active: bool },
}

impl TracedOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Embedding { .. }         => "embedding",
            Self::PositionEmbedding { .. } => "position_embedding",
            Self::Add                      => "add",
            Self::LayerNorm { .. }         => "layer_norm",
            Self::Linear { .. }            => "linear",
            Self::Gelu                     => "gelu",
            Self::Relu                     => "relu",
            Self::SplitHeads { .. }        => "split_heads",
            Self::MergeHeads               => "merge_heads",
            Self::AttentionScores { .. }   => "attention_scores",
            Self::MaskPadding { .. }       => "mask_padding",
            Self::Softmax                  => "softmax",
            Self::MatMul                   => "matmul",
            Self::SelectFirstToken         => "select_first_token",
            Self::Dropout { .. }           => "dropout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracedNode {
    pub op:     TracedOp,
    pub inputs: Vec<Slot>,
    pub output: Slot,
    pub shape:  Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphInput {
    pub name:  String,
    pub slot:  Slot,
    pub shape: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphOutput {
    pub name: String,
    pub slot: Slot,
}

/// A parameter snapshot, row-major f32.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamData {
    pub shape:  Vec<usize>,
    pub values: Vec<f32>,
}

/// The graph as stored in an artifact: weights live beside it as
/// named tensors, referenced from the ops by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortableGraph {
    pub inputs:  Vec<GraphInput>,
    pub nodes:   Vec<TracedNode>,
    pub outputs: Vec<GraphOutput>,
}

impl PortableGraph {
    /// Parameter names referenced by the ops, in first-use order.
    pub fn param_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for node in &self.nodes {
            for name in node.op.param_names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

impl TracedOp {
    pub fn param_names(&self) -> Vec<&str> {
        match self {
            Self::Embedding { weight } | Self::PositionEmbedding { weight } => vec![weight.as_str()],
            Self::LayerNorm { gamma, beta, .. } => vec![gamma.as_str(), beta.as_str()],
            Self::Linear { weight, bias } => {
                let mut v = vec![weight.as_str()];
                v.extend(bias.as_deref());
                v
            }
            _ => Vec::new(),
        }
    }
}
