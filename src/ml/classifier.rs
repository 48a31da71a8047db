// ============================================================
// Layer 5 — Sequence Classifier
// ============================================================
// DistilBERT body + a fresh classification head:
//
//   hidden = distilbert(input_ids, attention_mask)   [B, S, D]
//   cls    = hidden[:, 0, :]                          [B, D]
//   x      = relu(pre_classifier(cls))
//   x      = dropout(x)                  (seq_classif_dropout)
//   logits = classifier(x)                            [B, num_labels]
//
// The body is filled from pretrained weights (see pretrained.rs);
// the head always starts from random init sized to the label set.

use burn::{
    nn::{loss::CrossEntropyLossConfig, Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
};

use crate::data::batcher::NoteBatch;
use crate::domain::signature::{ATTENTION_MASK, INPUT_IDS};
use crate::ml::distilbert::{DistilBertConfig, DistilBertModel};
use crate::ml::trace::{observed, GraphObserver, NoTrace, TracedOp};

/// Root path of the body's parameters; matches the HF checkpoint prefix.
pub const BODY_PATH: &str = "distilbert";

#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub body: DistilBertConfig,
    #[config(default = 2)]
    pub num_labels: usize,
}

impl ClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DistilBertClassifier<B> {
        let dim = self.body.dim;
        DistilBertClassifier {
            distilbert:     self.body.init(device),
            pre_classifier: LinearConfig::new(dim, dim).init(device),
            classifier:     LinearConfig::new(dim, self.num_labels).init(device),
            dropout:        DropoutConfig::new(self.body.seq_classif_dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct DistilBertClassifier<B: Backend> {
    pub distilbert:     DistilBertModel<B>,
    pub pre_classifier: Linear<B>,
    pub classifier:     Linear<B>,
    pub dropout:        Dropout,
}

impl<B: Backend> DistilBertClassifier<B> {
    /// input_ids, attention_mask: [batch, seq_len] → logits [batch, num_labels]
    pub fn forward<O: GraphObserver<B>>(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        obs:            &mut O,
    ) -> Tensor<B, 2> {
        let ids_slot  = obs.input(INPUT_IDS, &input_ids.dims());
        let mask_slot = obs.input(ATTENTION_MASK, &attention_mask.dims());

        let (hidden, s) = self.distilbert.forward(
            BODY_PATH, input_ids, ids_slot, &attention_mask, mask_slot, obs,
        );

        let [batch, _, dim] = hidden.dims();
        let cls = hidden.slice([0..batch, 0..1, 0..dim]).reshape([batch, dim]);
        let s   = obs.op(TracedOp::SelectFirstToken, &[s], &cls.dims());

        let (x, s) = observed::linear(obs, "pre_classifier", &self.pre_classifier, cls, s);
        let (x, s) = observed::relu(obs, x, s);
        let (x, s) = observed::dropout(obs, &self.dropout, x, s);
        let (logits, s) = observed::linear(obs, "classifier", &self.classifier, x, s);

        obs.output("logits", s);
        logits
    }

    /// Untraced forward pass.
    pub fn logits(&self, input_ids: Tensor<B, 2, Int>, attention_mask: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        self.forward(input_ids, attention_mask, &mut NoTrace)
    }

    /// Mean cross-entropy over the batch, plus the logits for accuracy.
    pub fn forward_loss(&self, batch: NoteBatch<B>) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.logits(batch.input_ids, batch.attention_mask);
        let loss = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), batch.labels);
        (loss, logits)
    }

    pub fn num_labels(&self) -> usize {
        self.classifier.weight.val().dims()[1]
    }
}

/// Number of correct argmax predictions in a batch.
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> usize {
    let [batch, _] = logits.dims();
    let predicted = logits.argmax(1).reshape([batch]);
    let correct: i64 = predicted.equal(labels).int().sum().into_scalar().elem::<i64>();
    correct.max(0) as usize
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A tiny randomly initialised classifier for tests.
    pub(crate) fn tiny_config(vocab_size: usize) -> ClassifierConfig {
        let body = DistilBertConfig::new(vocab_size)
            .with_max_position_embeddings(64)
            .with_dim(16)
            .with_n_layers(2)
            .with_n_heads(2)
            .with_hidden_dim(32);
        ClassifierConfig::new(body)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::tiny_config;
    use super::*;
    use burn::backend::{ndarray::NdArrayDevice, NdArray};
    use crate::ml::trace::GraphTracer;

    type B = NdArray;

    fn inputs(device: &NdArrayDevice) -> (Tensor<B, 2, Int>, Tensor<B, 2, Int>) {
        let ids  = Tensor::<B, 1, Int>::from_ints([101, 5, 6, 102, 101, 7, 102, 0], device).reshape([2, 4]);
        let mask = Tensor::<B, 1, Int>::from_ints([1, 1, 1, 1, 1, 1, 1, 0], device).reshape([2, 4]);
        (ids, mask)
    }

    #[test]
    fn test_logits_shape() {
        let device = NdArrayDevice::default();
        let model  = tiny_config(120).init::<B>(&device);
        let (ids, mask) = inputs(&device);
        assert_eq!(model.logits(ids, mask).dims(), [2, 2]);
        assert_eq!(model.num_labels(), 2);
    }

    #[test]
    fn test_padding_does_not_leak_into_cls() {
        // Appending a padded position must not change the logits.
        let device = NdArrayDevice::default();
        let model  = tiny_config(120).init::<B>(&device);

        let short_ids  = Tensor::<B, 1, Int>::from_ints([101, 7, 102], &device).reshape([1, 3]);
        let short_mask = Tensor::<B, 1, Int>::from_ints([1, 1, 1], &device).reshape([1, 3]);
        let long_ids   = Tensor::<B, 1, Int>::from_ints([101, 7, 102, 0], &device).reshape([1, 4]);
        let long_mask  = Tensor::<B, 1, Int>::from_ints([1, 1, 1, 0], &device).reshape([1, 4]);

        let a: Vec<f32> = model.logits(short_ids, short_mask).into_data().to_vec().unwrap();
        let b: Vec<f32> = model.logits(long_ids, long_mask).into_data().to_vec().unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-4, "{x} vs {y}");
        }
    }

    #[test]
    fn test_trace_names_inputs_and_output() {
        let device = NdArrayDevice::default();
        let model  = tiny_config(120).init::<B>(&device);
        let (ids, mask) = inputs(&device);

        let mut tracer = GraphTracer::new();
        model.forward(ids, mask, &mut tracer);
        let graph = tracer.finish().unwrap();

        assert_eq!(graph.input(INPUT_IDS).map(|i| i.shape.clone()), Some(vec![2, 4]));
        assert_eq!(graph.input(ATTENTION_MASK).map(|i| i.shape.clone()), Some(vec![2, 4]));
        assert_eq!(graph.outputs[0].name, "logits");
        assert!(graph.params.contains_key("distilbert.embeddings.word_embeddings.weight"));
        assert!(graph.params.contains_key("distilbert.transformer.layer.1.ffn.lin2.bias"));
        assert!(graph.params.contains_key("classifier.weight"));
    }

    #[test]
    fn test_count_correct() {
        let device = NdArrayDevice::default();
        let logits = Tensor::<B, 2>::from_floats([[0.1, 0.9], [0.8, 0.2], [0.3, 0.7]], &device);
        let labels = Tensor::<B, 1, Int>::from_ints([1, 1, 1], &device);
        assert_eq!(count_correct(logits, labels), 2);
    }
}
