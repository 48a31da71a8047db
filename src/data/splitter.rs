// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Optionally carves a validation hold-out from the labelled
// notes before training. The default fraction is 0.0 (train on
// everything); a non-zero fraction gives a per-epoch val_loss and
// val_acc in the metrics log.
//
// The shuffle uses an explicitly seeded StdRng, so the same seed
// always produces the same split.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` with `seed` and split into (train, validation).
/// `val_fraction` is clamped to [0, 1].
pub fn split_train_val<T>(mut samples: Vec<T>, val_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let val_fraction = val_fraction.clamp(0.0, 1.0);
    if val_fraction == 0.0 {
        return (samples, Vec::new());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let val_size = ((total as f64) * val_fraction).round() as usize;
    let split_at = total - val_size.min(total);

    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation",
        samples.len(),
        val.len(),
    );

    (samples, val)
}
