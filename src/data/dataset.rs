use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::tokenize::TokenBlock;

/// One tokenized, padded note with its label.
/// All samples built from one TokenBlock share the same length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSample {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub label:          u8,
}

impl NoteSample {
    pub fn real_len(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }
}

pub struct NoteDataset {
    samples: Vec<NoteSample>,
}

impl NoteDataset {
    pub fn new(samples: Vec<NoteSample>) -> Self { Self { samples } }

    /// Zip a tokenized block with its labels, row by row.
    pub fn from_block(block: &TokenBlock, labels: &[u8]) -> Self {
        assert_eq!(block.rows, labels.len(), "one label per tokenized row");
        let samples = (0..block.rows)
            .map(|row| NoteSample {
                input_ids:      block.ids_row(row).to_vec(),
                attention_mask: block.mask_row(row).to_vec(),
                label:          labels[row],
            })
            .collect();
        Self { samples }
    }

    pub fn seq_len(&self) -> usize {
        self.samples.first().map(|s| s.input_ids.len()).unwrap_or(0)
    }

    pub fn samples(&self) -> &[NoteSample] { &self.samples }

    /// Clone out the samples at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Vec<NoteSample> {
        indices.iter().filter_map(|&i| self.samples.get(i).cloned()).collect()
    }
}

impl Dataset<NoteSample> for NoteDataset {
    fn get(&self, index: usize) -> Option<NoteSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> TokenBlock {
        TokenBlock {
            rows: 2,
            seq_len: 3,
            input_ids: vec![101, 7, 102, 101, 102, 0],
            attention_mask: vec![1, 1, 1, 1, 1, 0],
        }
    }

    #[test]
    fn test_from_block_pairs_rows_with_labels() {
        let ds = NoteDataset::from_block(&block(), &[1, 0]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1).unwrap().input_ids, vec![101, 102, 0]);
        assert_eq!(ds.get(1).unwrap().label, 0);
        assert_eq!(ds.get(1).unwrap().real_len(), 2);
        assert_eq!(ds.seq_len(), 3);
    }

    #[test]
    fn test_select_preserves_order() {
        let ds = NoteDataset::from_block(&block(), &[1, 0]);
        let picked = ds.select(&[1, 0]);
        assert_eq!(picked[0].label, 0);
        assert_eq!(picked[1].label, 1);
    }
}
