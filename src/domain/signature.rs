// ============================================================
// Layer 3 — Model Signature
// ============================================================
// The contract handed from training to export: which inputs the
// model takes (name + exact shape), which padding policy produced
// them, and which label each output logit stands for.
//
// Export failures caused by shape drift between the tokenizer
// and the exported graph are caught by comparing this struct
// against the traced sample; nothing is inferred implicitly.

use serde::{Deserialize, Serialize};

pub const INPUT_IDS: &str = "input_ids";
pub const ATTENTION_MASK: &str = "attention_mask";

/// How the tokenizer adapter pads and truncates one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PaddingPolicy {
    /// Pad every row to the longest row in the call, truncating rows
    /// longer than `max_length`.
    Longest { max_length: usize },
    /// Pad or truncate every row to exactly `length`.
    Fixed { length: usize },
}

impl PaddingPolicy {
    pub fn max_length(&self) -> usize {
        match *self {
            Self::Longest { max_length } => max_length,
            Self::Fixed { length }       => length,
        }
    }
}

impl Default for PaddingPolicy {
    fn default() -> Self {
        Self::Longest { max_length: 512 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub name:  String,
    pub shape: Vec<usize>,
}

impl InputSpec {
    pub fn new(name: impl Into<String>, shape: impl Into<Vec<usize>>) -> Self {
        Self { name: name.into(), shape: shape.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub inputs:       Vec<InputSpec>,
    pub class_labels: Vec<String>,
    pub padding:      PaddingPolicy,
}

impl ModelSignature {
    /// Signature for the two token inputs, both `[batch, seq_len]`.
    pub fn token_inputs(
        batch:        usize,
        seq_len:      usize,
        class_labels: Vec<String>,
        padding:      PaddingPolicy,
    ) -> Self {
        Self {
            inputs: vec![
                InputSpec::new(INPUT_IDS, [batch, seq_len]),
                InputSpec::new(ATTENTION_MASK, [batch, seq_len]),
            ],
            class_labels,
            padding,
        }
    }

    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn num_labels(&self) -> usize {
        self.class_labels.len()
    }
}

/// Default labels for the binary has-optimisation task.
pub fn binary_labels() -> Vec<String> {
    vec!["0".to_string(), "1".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_inputs_share_shape() {
        let sig = ModelSignature::token_inputs(1, 16, binary_labels(), PaddingPolicy::default());
        assert_eq!(sig.input(INPUT_IDS).map(|i| i.shape.clone()), Some(vec![1, 16]));
        assert_eq!(sig.input(ATTENTION_MASK).map(|i| i.shape.clone()), Some(vec![1, 16]));
        assert_eq!(sig.num_labels(), 2);
    }

    #[test]
    fn test_padding_policy_json_is_tagged() {
        let json = serde_json::to_string(&PaddingPolicy::Fixed { length: 16 }).unwrap();
        assert_eq!(json, r#"{"strategy":"fixed","length":16}"#);
        let back: PaddingPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_length(), 16);
    }
}
