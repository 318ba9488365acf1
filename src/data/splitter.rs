// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles samples with a seeded RNG and splits them in two:
//   - training set:   used to update model weights
//   - validation set: used to measure loss on unseen windows
//
// The seed comes from random_forest.random_state so repeated
// runs hold out the same windows.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` and split into (train, validation), with
/// `val_fraction` of the samples (rounded) held out.
pub fn split_train_val<T>(mut samples: Vec<T>, val_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let n_val    = ((total as f64) * val_fraction).round() as usize;
    let split_at = total.saturating_sub(n_val);

    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation ({}% / {}%)",
        samples.len(),
        val.len(),
        (samples.len() * 100) / total.max(1),
        (val.len()     * 100) / total.max(1),
    );

    (samples, val)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, val)      = split_train_val(items, 0.2, 42);
        assert_eq!(train.len(), 80);
        assert_eq!(val.len(),   20);
    }

    #[test]
    fn test_all_items_preserved() {
        let items: Vec<usize> = (0..50).collect();
        let (mut train, val)  = split_train_val(items, 0.3, 7);
        train.extend(val);
        train.sort();
        assert_eq!(train, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_split() {
        let (a, _) = split_train_val((0..30).collect::<Vec<u32>>(), 0.2, 1);
        let (b, _) = split_train_val((0..30).collect::<Vec<u32>>(), 0.2, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_dataset() {
        let items: Vec<usize> = Vec::new();
        let (train, val)      = split_train_val(items, 0.2, 0);
        assert!(train.is_empty());
        assert!(val.is_empty());
    }
}
