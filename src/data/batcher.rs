// ============================================================
// Layer 4 — Note Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<NoteSample>
// into the three tensors one optimisation step consumes:
//
//   input_ids       [batch, seq_len]   Int
//   attention_mask  [batch, seq_len]   Int   (1 = token, 0 = pad)
//   labels          [batch]            Int
//
// Samples arrive pre-padded to a common seq_len by the tokenizer
// adapter, so batching is flatten-then-reshape:
//   [s1_t1, ..., s1_tS, s2_t1, ..., sN_tS] → [N, S]
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::NoteSample;

#[derive(Debug, Clone)]
pub struct NoteBatch<B: Backend> {
    pub input_ids:      Tensor<B, 2, Int>,
    pub attention_mask: Tensor<B, 2, Int>,
    pub labels:         Tensor<B, 1, Int>,
}

impl<B: Backend> NoteBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.labels.dims()[0]
    }
}

#[derive(Clone, Debug, Default)]
pub struct NoteBatcher;

impl<B: Backend> Batcher<B, NoteSample, NoteBatch<B>> for NoteBatcher {
    fn batch(&self, items: Vec<NoteSample>, device: &B::Device) -> NoteBatch<B> {
        let batch_size = items.len();
        let seq_len    = items.first().map(|s| s.input_ids.len()).unwrap_or(0);

        let ids_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.input_ids.iter().map(|&x| x as i32))
            .collect();

        let mask_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.attention_mask.iter().map(|&x| x as i32))
            .collect();

        let labels: Vec<i32> = items.iter().map(|s| s.label as i32).collect();

        let input_ids = Tensor::<B, 1, Int>::from_ints(ids_flat.as_slice(), device)
            .reshape([batch_size, seq_len]);
        let attention_mask = Tensor::<B, 1, Int>::from_ints(mask_flat.as_slice(), device)
            .reshape([batch_size, seq_len]);
        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), device);

        NoteBatch { input_ids, attention_mask, labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArrayDevice, NdArray};

    #[test]
    fn test_batch_shapes_agree() {
        let items = vec![
            NoteSample { input_ids: vec![101, 5, 102, 0], attention_mask: vec![1, 1, 1, 0], label: 1 },
            NoteSample { input_ids: vec![101, 6, 7, 102], attention_mask: vec![1, 1, 1, 1], label: 0 },
            NoteSample { input_ids: vec![101, 102, 0, 0], attention_mask: vec![1, 1, 0, 0], label: 1 },
        ];
        let device = NdArrayDevice::default();
        let batch: NoteBatch<NdArray> =
            Batcher::<NdArray, _, _>::batch(&NoteBatcher, items, &device);

        assert_eq!(batch.input_ids.dims(), batch.attention_mask.dims());
        assert_eq!(batch.input_ids.dims(), [3, 4]);
        assert_eq!(batch.batch_size(), 3);
    }

    #[test]
    fn test_batch_preserves_values() {
        let items = vec![
            NoteSample { input_ids: vec![101, 9, 102], attention_mask: vec![1, 1, 1], label: 1 },
        ];
        let device = NdArrayDevice::default();
        let batch: NoteBatch<NdArray> =
            Batcher::<NdArray, _, _>::batch(&NoteBatcher, items, &device);
        let ids: Vec<i64> = batch.input_ids.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(ids, vec![101, 9, 102]);
    }
}
