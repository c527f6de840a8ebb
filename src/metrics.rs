/// probabilities are clipped to [EPSILON, 1 - EPSILON] before taking the log, so a confident wrong answer costs a large but finite loss
pub const EPSILON: f64 = 1e-7;

/// Sparse categorical cross-entropy of a single prediction: `-ln(p[label])`, with `p[label]` clipped to [`EPSILON`, 1 - `EPSILON`]
///
/// `label` must index into `probabilities`.
pub fn sparse_categorical_crossentropy(probabilities: &[f32], label: usize) -> f64 {
    let p = (probabilities[label] as f64).clamp(EPSILON, 1.0 - EPSILON);
    -p.ln()
}

/// Returns 1.0 if the most likely class is `label`, 0.0 otherwise. On ties the lowest class index wins.
pub fn sparse_categorical_accuracy(probabilities: &[f32], label: usize) -> f64 {
    match argmax(probabilities) {
        Some(predicted) if predicted == label => 1.0,
        _ => 0.0,
    }
}

/// index of the largest value, or None if the slice is empty. The first maximum wins ties; NaNs are never selected
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// A running mean. Reports NaN until at least one value has been added
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Mean {
    total: f64,
    count: usize,
}

impl Mean {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Mean::default()
    }

    /// add a single observation
    pub fn add(&mut self, value: f64) {
        self.total += value;
        self.count += 1;
    }

    /// the number of observations seen so far
    pub fn count(&self) -> usize {
        self.count
    }

    /// the mean of the observations seen so far
    pub fn value(&self) -> f64 {
        if self.count == 0 {
            return f64::NAN;
        }
        self.total / self.count as f64
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use statrs::assert_almost_eq;

    #[test]
    fn test_crossentropy_of_confident_correct_prediction_is_small() {
        let loss = sparse_categorical_crossentropy(&[0.0, 1.0, 0.0], 1);
        assert!(loss < 1e-6, "loss was {}", loss);
    }

    #[test]
    fn test_crossentropy_matches_negative_log() {
        let loss = sparse_categorical_crossentropy(&[0.25, 0.25, 0.5], 2);
        assert_almost_eq!(loss, std::f64::consts::LN_2, 1e-6);
    }

    #[test]
    fn test_crossentropy_of_zero_probability_is_finite() {
        let loss = sparse_categorical_crossentropy(&[1.0, 0.0], 1);
        assert!(loss.is_finite());
        assert_almost_eq!(loss, -(EPSILON.ln()), 1e-9);
    }

    #[test]
    fn test_accuracy_hit_and_miss() {
        assert_eq!(sparse_categorical_accuracy(&[0.1, 0.7, 0.2], 1), 1.0);
        assert_eq!(sparse_categorical_accuracy(&[0.1, 0.7, 0.2], 2), 0.0);
    }

    #[test]
    fn test_argmax_first_maximum_wins() {
        assert_eq!(argmax(&[0.5, 0.5, 0.1]), Some(0));
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[f32::NAN, 0.2]), Some(1));
    }

    #[test]
    fn test_mean() {
        let mut mean = Mean::new();
        assert!(mean.value().is_nan());
        mean.add(1.0);
        mean.add(2.0);
        mean.add(6.0);
        assert_eq!(mean.count(), 3);
        assert_almost_eq!(mean.value(), 3.0, 1e-12);
    }
}
