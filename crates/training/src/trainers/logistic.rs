//! Mini-batch SGD logistic regression shared by all three local-model
//! variants; they differ only in how text becomes a sparse feature vector
//! (see `bow.rs`, `hashlinear.rs`, `fasttext.rs`), not in how the weights are
//! fit.

use std::time::{Duration, Instant};

use storage::SampleRecord;

/// One epoch's worth of `(sparse features, label)` pairs, already extracted
/// so the hot fitting loop never has to re-tokenize.
pub struct TrainingExample {
    pub features: Vec<(usize, f32)>,
    pub label: f32,
}

pub fn prepare_examples(records: &[SampleRecord], extract: impl Fn(&str) -> Vec<(usize, f32)>) -> Vec<TrainingExample> {
    records
        .iter()
        .map(|r| TrainingExample {
            features: extract(&r.text),
            label: r.label as f32,
        })
        .collect()
}

/// Progress callback invoked once per epoch: `(epoch, examples_seen, elapsed)`.
pub type ProgressFn<'a> = dyn FnMut(usize, usize, Duration) + 'a;

/// Fit dense logistic-regression weights (`dim` features plus a bias) by
/// mini-batch SGD, shuffling examples each epoch and stopping early if
/// `max_seconds` elapses mid-run — the trainer always returns a usable
/// (if undertrained) model rather than erroring out on a slow box.
pub fn fit(
    examples: &mut [TrainingExample],
    dim: usize,
    epochs: usize,
    batch_size: usize,
    learning_rate: f32,
    max_seconds: u64,
    seed: u64,
    mut on_progress: impl FnMut(usize, usize, Duration),
) -> (Vec<f32>, f32) {
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    let mut weights = vec![0.0f32; dim];
    let mut bias = 0.0f32;
    let start = Instant::now();
    let budget = Duration::from_secs(max_seconds.max(1));
    let mut rng = StdRng::seed_from_u64(seed);
    let batch_size = batch_size.max(1);

    'epochs: for epoch in 0..epochs.max(1) {
        examples.shuffle(&mut rng);

        for batch in examples.chunks(batch_size) {
            if start.elapsed() > budget {
                break 'epochs;
            }

            let mut grad_bias = 0.0f32;
            let mut grad_w: std::collections::HashMap<usize, f32> = std::collections::HashMap::new();

            for example in batch {
                let z = example.features.iter().fold(bias, |acc, &(idx, v)| acc + weights.get(idx).copied().unwrap_or(0.0) * v);
                let pred = 1.0 / (1.0 + (-z).exp());
                let error = pred - example.label;

                for &(idx, v) in &example.features {
                    *grad_w.entry(idx).or_insert(0.0) += error * v;
                }
                grad_bias += error;
            }

            let n = batch.len() as f32;
            for (idx, g) in grad_w {
                weights[idx] -= learning_rate * (g / n);
            }
            bias -= learning_rate * (grad_bias / n);
        }

        on_progress(epoch, examples.len(), start.elapsed());

        if start.elapsed() > budget {
            break;
        }
    }

    (weights, bias)
}
