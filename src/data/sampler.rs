// ============================================================
// Layer 4 — Epoch Batch Plan
// ============================================================
// Decides which examples go into which batch for one epoch.
//
//   indices 0..n  ──shuffle(StdRng(seed, epoch))──▶  permutation
//   permutation   ──chunks(batch_size)───────────▶  batches
//
// Properties the training loop relies on:
//   - every index appears exactly once per epoch
//   - the same (seed, epoch) always gives the same plan
//   - only the last batch may be shorter than batch_size
//
// The seed is explicit and per run; nothing reads global RNG state.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochPlan {
    batches: Vec<Vec<usize>>,
}

impl EpochPlan {
    pub fn new(num_examples: usize, batch_size: usize, seed: u64, epoch: usize) -> Self {
        assert!(batch_size >= 1, "batch_size must be at least 1");

        let mut order: Vec<usize> = (0..num_examples).collect();
        let mut rng = StdRng::seed_from_u64(epoch_seed(seed, epoch));
        order.shuffle(&mut rng);

        let batches = order.chunks(batch_size).map(<[usize]>::to_vec).collect();
        Self { batches }
    }

    pub fn batches(&self) -> &[Vec<usize>] {
        &self.batches
    }
}

/// Split a batch into two halves for the out-of-memory retry.
pub fn halve(batch: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let mid = batch.len().div_ceil(2);
    (batch[..mid].to_vec(), batch[mid..].to_vec())
}

fn epoch_seed(seed: u64, epoch: usize) -> u64 {
    // splitmix-style mixing so consecutive epochs are unrelated streams
    let mut z = seed ^ (epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_order() {
        let a = EpochPlan::new(100, 8, 42, 1);
        let b = EpochPlan::new(100, 8, 42, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_epochs_differ() {
        let a = EpochPlan::new(100, 8, 42, 1);
        let b = EpochPlan::new(100, 8, 42, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_every_example_exactly_once() {
        for epoch in 1..=3 {
            let plan = EpochPlan::new(37, 5, 7, epoch);
            let mut seen: Vec<usize> = plan.batches().iter().flatten().copied().collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..37).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_only_last_batch_short() {
        let plan = EpochPlan::new(10, 4, 0, 1);
        let sizes: Vec<usize> = plan.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_empty_dataset_has_no_batches() {
        assert!(EpochPlan::new(0, 4, 0, 1).batches().is_empty());
    }

    #[test]
    fn test_halve_covers_batch() {
        let (a, b) = halve(&[3, 1, 4, 1, 5]);
        assert_eq!(a, vec![3, 1, 4]);
        assert_eq!(b, vec![1, 5]);
        let (a, b) = halve(&[9]);
        assert_eq!(a, vec![9]);
        assert!(b.is_empty());
    }
}
