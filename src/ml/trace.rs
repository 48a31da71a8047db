// ============================================================
// Layer 5 — Forward-Pass Tracing
// ============================================================
// The classifier's forward pass is written once and takes an
// observer. During training the observer is `NoTrace` and every
// hook is a no-op. During export it is a `GraphTracer`, which
// records each operation, its operand slots, the concrete output
// shape and a snapshot of every parameter it touches, while the
// real tensors flow through unchanged.
//
//   forward(ids, mask, &mut NoTrace)      → logits
//   forward(ids, mask, &mut GraphTracer)  → logits + TracedGraph
//
// Because both paths run the same code, the recorded graph can
// never drift from what the model actually computes.
//
// The `observed` helpers wrap the burn layers the model uses so
// the forward code reads like plain burn with one extra argument.

use std::collections::BTreeMap;

use burn::{
    nn::{Dropout, Embedding, LayerNorm, Linear},
    prelude::*,
};

pub use crate::ml::graph::{GraphInput, GraphOutput, ParamData, Slot, TracedNode, TracedOp};

#[derive(Debug, Clone, Default)]
pub struct TracedGraph {
    pub inputs:  Vec<GraphInput>,
    pub nodes:   Vec<TracedNode>,
    pub outputs: Vec<GraphOutput>,
    pub params:  BTreeMap<String, ParamData>,
}

impl TracedGraph {
    pub fn input(&self, name: &str) -> Option<&GraphInput> {
        self.inputs.iter().find(|i| i.name == name)
    }
}

// ─── Observer ─────────────────────────────────────────────────────────────────
pub trait GraphObserver<B: Backend> {
    fn input(&mut self, name: &str, dims: &[usize]) -> Slot;

    /// Register a parameter by name; `value` is only evaluated when tracing.
    fn param<const D: usize>(&mut self, name: String, value: impl FnOnce() -> Tensor<B, D>) -> String;

    fn op(&mut self, op: TracedOp, inputs: &[Slot], dims: &[usize]) -> Slot;

    fn output(&mut self, name: &str, slot: Slot);
}

/// Observer used for training and plain inference.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTrace;

impl<B: Backend> GraphObserver<B> for NoTrace {
    fn input(&mut self, _name: &str, _dims: &[usize]) -> Slot { Slot(0) }

    fn param<const D: usize>(&mut self, name: String, _value: impl FnOnce() -> Tensor<B, D>) -> String {
        name
    }

    fn op(&mut self, _op: TracedOp, _inputs: &[Slot], _dims: &[usize]) -> Slot { Slot(0) }

    fn output(&mut self, _name: &str, _slot: Slot) {}
}

/// Observer that records the graph for export.
#[derive(Debug, Default)]
pub struct GraphTracer {
    graph:     TracedGraph,
    next_slot: usize,
    errors:    Vec<String>,
}

impl GraphTracer {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&mut self) -> Slot {
        let s = Slot(self.next_slot);
        self.next_slot += 1;
        s
    }

    /// Finish tracing. Fails if any parameter could not be read back.
    pub fn finish(self) -> Result<TracedGraph, String> {
        if let Some(first) = self.errors.first() {
            return Err(first.clone());
        }
        Ok(self.graph)
    }
}

impl<B: Backend> GraphObserver<B> for GraphTracer {
    fn input(&mut self, name: &str, dims: &[usize]) -> Slot {
        let slot = self.fresh();
        self.graph.inputs.push(GraphInput { name: name.to_string(), slot, shape: dims.to_vec() });
        slot
    }

    fn param<const D: usize>(&mut self, name: String, value: impl FnOnce() -> Tensor<B, D>) -> String {
        if !self.graph.params.contains_key(&name) {
            let tensor = value();
            let shape  = tensor.dims().to_vec();
            match tensor.into_data().convert::<f32>().to_vec::<f32>() {
                Ok(values) => {
                    self.graph.params.insert(name.clone(), ParamData { shape, values });
                }
                Err(e) => self.errors.push(format!("cannot read parameter '{name}': {e:?}")),
            }
        }
        name
    }

    fn op(&mut self, op: TracedOp, inputs: &[Slot], dims: &[usize]) -> Slot {
        let output = self.fresh();
        self.graph.nodes.push(TracedNode {
            op,
            inputs: inputs.to_vec(),
            output,
            shape: dims.to_vec(),
        });
        output
    }

    fn output(&mut self, name: &str, slot: Slot) {
        self.graph.outputs.push(GraphOutput { name: name.to_string(), slot });
    }
}

// ─── Observed layers ──────────────────────────────────────────────────────────
// Each helper runs the burn layer and reports it to the observer.
pub mod observed {
    use super::*;
    use burn::tensor::activation;

    pub fn embedding<B: Backend, O: GraphObserver<B>>(
        obs:   &mut O,
        path:  &str,
        layer: &Embedding<B>,
        ids:   Tensor<B, 2, Int>,
        slot:  Slot,
    ) -> (Tensor<B, 3>, Slot) {
        let weight = obs.param(format!("{path}.weight"), || layer.weight.val());
        let out    = layer.forward(ids);
        let s      = obs.op(TracedOp::Embedding { weight }, &[slot], &out.dims());
        (out, s)
    }

    pub fn position_embedding<B: Backend, O: GraphObserver<B>>(
        obs:   &mut O,
        path:  &str,
        layer: &Embedding<B>,
        ids:   &Tensor<B, 2, Int>,
        slot:  Slot,
    ) -> (Tensor<B, 3>, Slot) {
        let [batch, seq_len] = ids.dims();
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &ids.device())
            .unsqueeze::<2>()
            .expand([batch, seq_len]);
        let weight = obs.param(format!("{path}.weight"), || layer.weight.val());
        let out    = layer.forward(positions);
        let s      = obs.op(TracedOp::PositionEmbedding { weight }, &[slot], &out.dims());
        (out, s)
    }

    pub fn linear<B: Backend, const D: usize, O: GraphObserver<B>>(
        obs:   &mut O,
        path:  &str,
        layer: &Linear<B>,
        x:     Tensor<B, D>,
        slot:  Slot,
    ) -> (Tensor<B, D>, Slot) {
        let weight = obs.param(format!("{path}.weight"), || layer.weight.val());
        let bias   = layer
            .bias
            .as_ref()
            .map(|b| obs.param(format!("{path}.bias"), || b.val()));
        let out = layer.forward(x);
        let s   = obs.op(TracedOp::Linear { weight, bias }, &[slot], &out.dims());
        (out, s)
    }

    pub fn layer_norm<B: Backend, O: GraphObserver<B>>(
        obs:     &mut O,
        path:    &str,
        layer:   &LayerNorm<B>,
        epsilon: f64,
        x:       Tensor<B, 3>,
        slot:    Slot,
    ) -> (Tensor<B, 3>, Slot) {
        let gamma = obs.param(format!("{path}.gamma"), || layer.gamma.val());
        let beta  = obs.param(format!("{path}.beta"), || layer.beta.val());
        let out   = layer.forward(x);
        let s     = obs.op(TracedOp::LayerNorm { gamma, beta, epsilon }, &[slot], &out.dims());
        (out, s)
    }

    pub fn dropout<B: Backend, const D: usize, O: GraphObserver<B>>(
        obs:   &mut O,
        layer: &Dropout,
        x:     Tensor<B, D>,
        slot:  Slot,
    ) -> (Tensor<B, D>, Slot) {
        // Dropout is only stochastic while autodiff is enabled.
        let active = B::ad_enabled() && layer.prob > 0.0;
        let out    = layer.forward(x);
        let s      = obs.op(TracedOp::Dropout { prob: layer.prob, active }, &[slot], &out.dims());
        (out, s)
    }

    pub fn gelu<B: Backend, const D: usize, O: GraphObserver<B>>(
        obs: &mut O, x: Tensor<B, D>, slot: Slot,
    ) -> (Tensor<B, D>, Slot) {
        let out = activation::gelu(x);
        let s   = obs.op(TracedOp::Gelu, &[slot], &out.dims());
        (out, s)
    }

    pub fn relu<B: Backend, const D: usize, O: GraphObserver<B>>(
        obs: &mut O, x: Tensor<B, D>, slot: Slot,
    ) -> (Tensor<B, D>, Slot) {
        let out = activation::relu(x);
        let s   = obs.op(TracedOp::Relu, &[slot], &out.dims());
        (out, s)
    }

    pub fn add<B: Backend, const D: usize, O: GraphObserver<B>>(
        obs: &mut O,
        a:   (Tensor<B, D>, Slot),
        b:   (Tensor<B, D>, Slot),
    ) -> (Tensor<B, D>, Slot) {
        let out = a.0 + b.0;
        let s   = obs.op(TracedOp::Add, &[a.1, b.1], &out.dims());
        (out, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArrayDevice, NdArray};
    use burn::nn::LinearConfig;

    type B = NdArray;

    #[test]
    fn test_tracer_records_linear_with_params() {
        let device = NdArrayDevice::default();
        let layer  = LinearConfig::new(3, 2).init::<B>(&device);
        let x      = Tensor::<B, 2>::ones([1, 3], &device);

        let mut tracer = GraphTracer::new();
        let s = GraphObserver::<B>::input(&mut tracer, "x", &[1, 3]);
        let (out, s) = observed::linear(&mut tracer, "head", &layer, x, s);
        GraphObserver::<B>::output(&mut tracer, "y", s);
        let graph = tracer.finish().unwrap();

        assert_eq!(out.dims(), [1, 2]);
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].shape, vec![1, 2]);
        assert_eq!(graph.params["head.weight"].shape, vec![3, 2]);
        assert!(graph.params.contains_key("head.bias"));
        assert_eq!(graph.outputs[0].slot, s);
    }

    #[test]
    fn test_no_trace_is_transparent() {
        let device = NdArrayDevice::default();
        let layer  = LinearConfig::new(3, 2).init::<B>(&device);
        let x      = Tensor::<B, 2>::ones([2, 3], &device);
        let (a, _) = observed::linear(&mut NoTrace, "head", &layer, x.clone(), Slot(0));
        let b      = layer.forward(x);
        let a: Vec<f32> = a.into_data().to_vec().unwrap();
        let b: Vec<f32> = b.into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dropout_inactive_without_autodiff() {
        let device  = NdArrayDevice::default();
        let dropout = burn::nn::DropoutConfig::new(0.5).init();
        let x       = Tensor::<B, 2>::ones([2, 2], &device);
        let mut tracer = GraphTracer::new();
        let _ = observed::dropout::<B, 2, _>(&mut tracer, &dropout, x, Slot(0));
        let graph = tracer.finish().unwrap();
        assert_eq!(graph.nodes[0].op, TracedOp::Dropout { prob: 0.5, active: false });
    }
}
