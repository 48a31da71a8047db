// ============================================================
// Layer 4 — Tokenizer Adapter
// ============================================================
// Turns raw note text into fixed-width rows of token ids plus
// attention masks, using the pretrained WordPiece vocabulary.
//
//   "Optimize transistor density for 5nm process."
//        │  tokenizer (adds [CLS] ... [SEP])
//        ▼
//   [101, 23569, 4697, ..., 102]          ← input_ids
//   [  1,     1,    1, ...,   1]          ← attention_mask
//        │  PaddingPolicy
//        ▼
//   rows of equal length, padded with [PAD]=0 / mask 0
//
// The policy is applied here rather than configured on the
// tokenizer object so the exact same code path produces both
// the training rows and the export sample.

use anyhow::{anyhow, Result};
use tokenizers::Tokenizer;

use crate::domain::signature::PaddingPolicy;

/// Token ids and masks for one tokenize call, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBlock {
    pub rows:           usize,
    pub seq_len:        usize,
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
}

impl TokenBlock {
    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.seq_len]
    }

    pub fn ids_row(&self, row: usize) -> &[u32] {
        &self.input_ids[row * self.seq_len..(row + 1) * self.seq_len]
    }

    pub fn mask_row(&self, row: usize) -> &[u32] {
        &self.attention_mask[row * self.seq_len..(row + 1) * self.seq_len]
    }
}

pub struct TokenizerAdapter {
    tokenizer: Tokenizer,
    pad_id:    u32,
}

impl TokenizerAdapter {
    pub fn new(tokenizer: Tokenizer) -> Self {
        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);
        Self { tokenizer, pad_id }
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    /// Tokenize `texts` in one call, padding/truncating per `policy`.
    pub fn tokenize<S: AsRef<str>>(&self, texts: &[S], policy: PaddingPolicy) -> Result<TokenBlock> {
        let inputs: Vec<&str> = texts.iter().map(AsRef::as_ref).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| anyhow!("Tokenisation error: {e}"))?;

        let rows: Vec<(Vec<u32>, Vec<u32>)> = encodings
            .iter()
            .map(|enc| {
                let ids     = real_tokens(enc.get_ids(), enc.get_attention_mask());
                let special = enc.get_special_tokens_mask();
                let ends_special = special
                    .get(ids.len().saturating_sub(1))
                    .map(|&s| s == 1)
                    .unwrap_or(false);
                truncate_row(ids, policy.max_length(), ends_special)
            })
            .map(|ids| {
                let mask = vec![1u32; ids.len()];
                (ids, mask)
            })
            .collect();

        let seq_len = match policy {
            PaddingPolicy::Longest { .. } => rows.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0),
            PaddingPolicy::Fixed { length } => length,
        };

        let mut input_ids      = Vec::with_capacity(rows.len() * seq_len);
        let mut attention_mask = Vec::with_capacity(rows.len() * seq_len);
        for (mut ids, mut mask) in rows.iter().cloned() {
            ids.resize(seq_len, self.pad_id);
            mask.resize(seq_len, 0);
            input_ids.extend(ids);
            attention_mask.extend(mask);
        }

        tracing::debug!("Tokenized {} texts to seq_len {} ({:?})", rows.len(), seq_len, policy);

        Ok(TokenBlock { rows: rows.len(), seq_len, input_ids, attention_mask })
    }
}

/// Drop any padding the tokenizer itself may have been configured with.
fn real_tokens(ids: &[u32], mask: &[u32]) -> Vec<u32> {
    ids.iter()
        .zip(mask)
        .filter(|(_, &m)| m == 1)
        .map(|(&id, _)| id)
        .collect()
}

/// Cut a row to `max_len`, keeping a trailing special token ([SEP]) in place.
fn truncate_row(mut ids: Vec<u32>, max_len: usize, ends_special: bool) -> Vec<u32> {
    if ids.len() <= max_len {
        return ids;
    }
    if ends_special && max_len > 0 {
        let last = ids[ids.len() - 1];
        ids.truncate(max_len - 1);
        ids.push(last);
    } else {
        ids.truncate(max_len);
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::tokenizer_store::testing::word_level_tokenizer;

    fn adapter() -> TokenizerAdapter {
        TokenizerAdapter::new(word_level_tokenizer(&[
            "optimize transistor density for 5nm process",
            "maintain current design",
        ]))
    }

    #[test]
    fn test_dynamic_padding_to_longest() {
        let a = adapter();
        let block = a
            .tokenize(&["optimize transistor density for 5nm process", "maintain"], PaddingPolicy::default())
            .unwrap();
        // [CLS] + 6 words + [SEP]
        assert_eq!(block.shape(), [2, 8]);
        assert_eq!(block.mask_row(1), &[1, 1, 1, 0, 0, 0, 0, 0]);
        assert_eq!(block.ids_row(1)[3..], [a.pad_id(); 5]);
    }

    #[test]
    fn test_shapes_of_ids_and_mask_agree() {
        let block = adapter()
            .tokenize(&["maintain current design", "optimize"], PaddingPolicy::Fixed { length: 16 })
            .unwrap();
        assert_eq!(block.input_ids.len(), block.attention_mask.len());
        assert_eq!(block.shape(), [2, 16]);
    }

    #[test]
    fn test_truncation_keeps_sep() {
        let a = adapter();
        let full  = a.tokenize(&["optimize transistor density for 5nm process"], PaddingPolicy::default()).unwrap();
        let short = a.tokenize(&["optimize transistor density for 5nm process"],
                               PaddingPolicy::Longest { max_length: 4 }).unwrap();
        assert_eq!(short.seq_len, 4);
        assert_eq!(short.ids_row(0)[3], *full.ids_row(0).last().unwrap());
        assert_eq!(short.ids_row(0)[0], full.ids_row(0)[0]);
    }

    #[test]
    fn test_deterministic() {
        let a = adapter();
        let x = a.tokenize(&["optimize current design"], PaddingPolicy::default()).unwrap();
        let y = a.tokenize(&["optimize current design"], PaddingPolicy::default()).unwrap();
        assert_eq!(x, y);
    }
}
