// ============================================================
// Layer 5 — DistilBERT Encoder Body
// ============================================================
// The pretrained body of the classifier, laid out so every
// parameter path matches the Hugging Face checkpoint:
//
//   distilbert.embeddings.word_embeddings        [vocab, dim]
//   distilbert.embeddings.position_embeddings    [max_pos, dim]
//   distilbert.embeddings.layer_norm             (LayerNorm in HF)
//   distilbert.transformer.layer.{i}.attention.{q,k,v,out}_lin
//   distilbert.transformer.layer.{i}.sa_layer_norm
//   distilbert.transformer.layer.{i}.ffn.lin1 / lin2
//   distilbert.transformer.layer.{i}.output_layer_norm
//
// Each block is post-LN:
//   x = LN(x + Attn(x, mask))
//   x = LN(x + FFN(x))          FFN = lin2(gelu(lin1(x)))
//
// The pipeline treats this as an opaque forward/backward
// capability; it exists in this form only so pretrained weights
// load by name and the forward pass can be traced for export.
//
// Reference: Sanh et al. (2019) DistilBERT
//            Vaswani et al. (2017) Attention Is All You Need

use burn::{
    nn::{
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation,
};

use crate::ml::trace::{observed, GraphObserver, Slot, TracedOp};

/// Score assigned to padded key positions before the softmax.
pub const MASK_FILL: f32 = -1.0e9;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
// Field names follow HF's config.json so the pretrained file loads as-is.
#[derive(Config, Debug)]
pub struct DistilBertConfig {
    pub vocab_size: usize,
    #[config(default = 512)]
    pub max_position_embeddings: usize,
    #[config(default = 768)]
    pub dim: usize,
    #[config(default = 6)]
    pub n_layers: usize,
    #[config(default = 12)]
    pub n_heads: usize,
    #[config(default = 3072)]
    pub hidden_dim: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
    #[config(default = 0.1)]
    pub attention_dropout: f64,
    #[config(default = 0.2)]
    pub seq_classif_dropout: f64,
    #[config(default = 1e-12)]
    pub layer_norm_eps: f64,
}

impl DistilBertConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DistilBertModel<B> {
        let embeddings = Embeddings {
            word_embeddings:     EmbeddingConfig::new(self.vocab_size, self.dim).init(device),
            position_embeddings: EmbeddingConfig::new(self.max_position_embeddings, self.dim).init(device),
            layer_norm:          self.layer_norm(device),
            dropout:             DropoutConfig::new(self.dropout).init(),
            eps:                 self.layer_norm_eps,
        };
        let layer = (0..self.n_layers).map(|_| self.build_block(device)).collect();
        DistilBertModel { embeddings, transformer: Transformer { layer } }
    }

    fn layer_norm<B: Backend>(&self, device: &B::Device) -> LayerNorm<B> {
        LayerNormConfig::new(self.dim).with_epsilon(self.layer_norm_eps).init(device)
    }

    fn build_block<B: Backend>(&self, device: &B::Device) -> TransformerBlock<B> {
        let lin = |i, o| LinearConfig::new(i, o).init(device);
        TransformerBlock {
            attention: MultiHeadSelfAttention {
                q_lin:   lin(self.dim, self.dim),
                k_lin:   lin(self.dim, self.dim),
                v_lin:   lin(self.dim, self.dim),
                out_lin: lin(self.dim, self.dim),
                dropout: DropoutConfig::new(self.attention_dropout).init(),
                n_heads: self.n_heads,
            },
            sa_layer_norm: self.layer_norm(device),
            ffn: Ffn {
                lin1:    lin(self.dim, self.hidden_dim),
                lin2:    lin(self.hidden_dim, self.dim),
                dropout: DropoutConfig::new(self.dropout).init(),
            },
            output_layer_norm: self.layer_norm(device),
            eps: self.layer_norm_eps,
        }
    }
}

// ─── Embeddings ───────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct Embeddings<B: Backend> {
    pub word_embeddings:     Embedding<B>,
    pub position_embeddings: Embedding<B>,
    pub layer_norm:          LayerNorm<B>,
    pub dropout:             Dropout,
    pub eps:                 f64,
}

impl<B: Backend> Embeddings<B> {
    pub fn forward<O: GraphObserver<B>>(
        &self,
        path:      &str,
        input_ids: Tensor<B, 2, Int>,
        ids_slot:  Slot,
        obs:       &mut O,
    ) -> (Tensor<B, 3>, Slot) {
        let pos = observed::position_embedding(
            obs, &format!("{path}.position_embeddings"), &self.position_embeddings, &input_ids, ids_slot,
        );
        let tok = observed::embedding(
            obs, &format!("{path}.word_embeddings"), &self.word_embeddings, input_ids, ids_slot,
        );
        let (x, s) = observed::add(obs, tok, pos);
        let (x, s) = observed::layer_norm(obs, &format!("{path}.layer_norm"), &self.layer_norm, self.eps, x, s);
        observed::dropout(obs, &self.dropout, x, s)
    }
}

// ─── Self-attention ───────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct MultiHeadSelfAttention<B: Backend> {
    pub q_lin:   Linear<B>,
    pub k_lin:   Linear<B>,
    pub v_lin:   Linear<B>,
    pub out_lin: Linear<B>,
    pub dropout: Dropout,
    pub n_heads: usize,
}

impl<B: Backend> MultiHeadSelfAttention<B> {
    /// x: [batch, seq, dim], attention_mask: [batch, seq] (1 = token)
    pub fn forward<O: GraphObserver<B>>(
        &self,
        path:           &str,
        x:              Tensor<B, 3>,
        x_slot:         Slot,
        attention_mask: &Tensor<B, 2, Int>,
        mask_slot:      Slot,
        obs:            &mut O,
    ) -> (Tensor<B, 3>, Slot) {
        let [batch, seq_len, dim] = x.dims();
        let heads    = self.n_heads;
        let head_dim = dim / heads;
        let scale    = 1.0 / (head_dim as f64).sqrt();

        let split = |t: Tensor<B, 3>, s: Slot, obs: &mut O| {
            let out = t.reshape([batch, seq_len, heads, head_dim]).swap_dims(1, 2);
            let s   = obs.op(TracedOp::SplitHeads { heads }, &[s], &out.dims());
            (out, s)
        };

        let (q, qs) = observed::linear(obs, &format!("{path}.q_lin"), &self.q_lin, x.clone(), x_slot);
        let (k, ks) = observed::linear(obs, &format!("{path}.k_lin"), &self.k_lin, x.clone(), x_slot);
        let (v, vs) = observed::linear(obs, &format!("{path}.v_lin"), &self.v_lin, x, x_slot);
        let (q, qs) = split(q, qs, obs);
        let (k, ks) = split(k, ks, obs);
        let (v, vs) = split(v, vs, obs);

        // [B,H,S,Dh] x [B,H,Dh,S] → [B,H,S,S]
        let scores = q.matmul(k.swap_dims(2, 3)).mul_scalar(scale);
        let ss     = obs.op(TracedOp::AttentionScores { scale }, &[qs, ks], &scores.dims());

        let pad = attention_mask
            .clone()
            .equal_elem(0)
            .reshape([batch, 1, 1, seq_len])
            .expand([batch, heads, seq_len, seq_len]);
        let scores = scores.mask_fill(pad, MASK_FILL);
        let ss     = obs.op(TracedOp::MaskPadding { fill: MASK_FILL }, &[ss, mask_slot], &scores.dims());

        let weights = activation::softmax(scores, 3);
        let ws      = obs.op(TracedOp::Softmax, &[ss], &weights.dims());
        let (weights, ws) = observed::dropout(obs, &self.dropout, weights, ws);

        let context = weights.matmul(v);
        let cs      = obs.op(TracedOp::MatMul, &[ws, vs], &context.dims());

        let context = context.swap_dims(1, 2).reshape([batch, seq_len, dim]);
        let cs      = obs.op(TracedOp::MergeHeads, &[cs], &context.dims());

        observed::linear(obs, &format!("{path}.out_lin"), &self.out_lin, context, cs)
    }
}

// ─── Feed-forward ─────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct Ffn<B: Backend> {
    pub lin1:    Linear<B>,
    pub lin2:    Linear<B>,
    pub dropout: Dropout,
}

impl<B: Backend> Ffn<B> {
    pub fn forward<O: GraphObserver<B>>(
        &self, path: &str, x: Tensor<B, 3>, s: Slot, obs: &mut O,
    ) -> (Tensor<B, 3>, Slot) {
        let (h, s) = observed::linear(obs, &format!("{path}.lin1"), &self.lin1, x, s);
        let (h, s) = observed::gelu(obs, h, s);
        let (h, s) = observed::linear(obs, &format!("{path}.lin2"), &self.lin2, h, s);
        observed::dropout(obs, &self.dropout, h, s)
    }
}

// ─── Transformer block ────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct TransformerBlock<B: Backend> {
    pub attention:         MultiHeadSelfAttention<B>,
    pub sa_layer_norm:     LayerNorm<B>,
    pub ffn:               Ffn<B>,
    pub output_layer_norm: LayerNorm<B>,
    pub eps:               f64,
}

impl<B: Backend> TransformerBlock<B> {
    pub fn forward<O: GraphObserver<B>>(
        &self,
        path:           &str,
        x:              Tensor<B, 3>,
        x_slot:         Slot,
        attention_mask: &Tensor<B, 2, Int>,
        mask_slot:      Slot,
        obs:            &mut O,
    ) -> (Tensor<B, 3>, Slot) {
        let attn = self.attention.forward(
            &format!("{path}.attention"), x.clone(), x_slot, attention_mask, mask_slot, obs,
        );
        let (x, s) = observed::add(obs, (x, x_slot), attn);
        let (x, s) = observed::layer_norm(obs, &format!("{path}.sa_layer_norm"), &self.sa_layer_norm, self.eps, x, s);

        let ffn = self.ffn.forward(&format!("{path}.ffn"), x.clone(), s, obs);
        let (x, s) = observed::add(obs, (x, s), ffn);
        observed::layer_norm(obs, &format!("{path}.output_layer_norm"), &self.output_layer_norm, self.eps, x, s)
    }
}

#[derive(Module, Debug)]
pub struct Transformer<B: Backend> {
    pub layer: Vec<TransformerBlock<B>>,
}

// ─── Body ─────────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct DistilBertModel<B: Backend> {
    pub embeddings:  Embeddings<B>,
    pub transformer: Transformer<B>,
}

impl<B: Backend> DistilBertModel<B> {
    /// Returns hidden states [batch, seq_len, dim].
    pub fn forward<O: GraphObserver<B>>(
        &self,
        path:           &str,
        input_ids:      Tensor<B, 2, Int>,
        ids_slot:       Slot,
        attention_mask: &Tensor<B, 2, Int>,
        mask_slot:      Slot,
        obs:            &mut O,
    ) -> (Tensor<B, 3>, Slot) {
        let (mut x, mut s) = self.embeddings.forward(&format!("{path}.embeddings"), input_ids, ids_slot, obs);
        for (i, block) in self.transformer.layer.iter().enumerate() {
            (x, s) = block.forward(
                &format!("{path}.transformer.layer.{i}"), x, s, attention_mask, mask_slot, obs,
            );
        }
        (x, s)
    }
}
