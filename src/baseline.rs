use log::trace;
use nalgebra::DVector;

use crate::model::{check_label, Model, ModelError};
use crate::Sample;

/// A nearest-centroid classifier, used to drive [`fit`](crate::fit) end to end without a numerical backend.
///
/// Each class keeps the running mean of every training sample seen with that label. Class probabilities are a softmax over the negative mean squared distance
/// from the input to each centroid, divided by `temperature`. A class with no samples yet has its centroid at the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestCentroid {
    num_features: usize,
    temperature: f64,
    sums: Vec<DVector<f64>>,
    counts: Vec<usize>,
    centroids: Vec<DVector<f64>>,
}

impl NearestCentroid {
    /// Create an untrained classifier for inputs of `num_features` values and `num_classes` classes.
    ///
    /// `temperature` controls how sharp the predicted distribution is; it is clamped to be positive.
    pub fn new(num_features: usize, num_classes: usize, temperature: f64) -> Self {
        NearestCentroid {
            num_features,
            temperature: temperature.max(f64::MIN_POSITIVE),
            sums: vec![DVector::zeros(num_features); num_classes],
            counts: vec![0; num_classes],
            centroids: vec![DVector::zeros(num_features); num_classes],
        }
    }

    /// number of training samples seen for each class
    pub fn class_counts(&self) -> &[usize] {
        &self.counts
    }

    fn check_input(&self, features: &[f32]) -> Result<(), ModelError> {
        if features.len() != self.num_features {
            return Err(ModelError::InputSizeMismatch {
                expected: self.num_features,
                actual: features.len(),
            });
        }
        Ok(())
    }

    fn probabilities(&self, features: &[f32]) -> Vec<f32> {
        let input = DVector::from_iterator(features.len(), features.iter().map(|&x| x as f64));
        let logits: Vec<f64> = self
            .centroids
            .iter()
            .map(|centroid| {
                -(&input - centroid).norm_squared() / self.num_features.max(1) as f64
                    / self.temperature
            })
            .collect();
        softmax(&logits)
    }
}

impl Model for NearestCentroid {
    fn num_classes(&self) -> usize {
        self.counts.len()
    }

    fn train_batch(&mut self, batch: &[&Sample]) -> Result<Vec<Vec<f32>>, ModelError> {
        if batch.is_empty() {
            return Err(ModelError::EmptyBatch);
        }
        // validate the whole batch before touching any state
        for sample in batch {
            self.check_input(sample.features())?;
            check_label(sample.label(), self.num_classes())?;
        }
        let outputs = batch
            .iter()
            .map(|sample| self.probabilities(sample.features()))
            .collect();
        for sample in batch {
            let label = sample.label();
            for (sum, &x) in self.sums[label].iter_mut().zip(sample.features()) {
                *sum += x as f64;
            }
            self.counts[label] += 1;
        }
        for (class, centroid) in self.centroids.iter_mut().enumerate() {
            if self.counts[class] > 0 {
                *centroid = &self.sums[class] / self.counts[class] as f64;
            }
        }
        trace!("class counts after batch: {:?}", self.counts);
        Ok(outputs)
    }

    fn predict(&self, features: &[f32]) -> Result<Vec<f32>, ModelError> {
        self.check_input(features)?;
        Ok(self.probabilities(features))
    }
}

fn softmax(logits: &[f64]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let counts: Vec<f64> = logits.iter().map(|&x| (x - max).exp()).collect();
    let total: f64 = counts.iter().sum();
    counts.iter().map(|&c| (c / total) as f32).collect()
}
