use crate::Sample;

pub mod model_error;
pub use model_error::ModelError;

/// The numerical side of a training run.
///
/// [`fit`](crate::fit) owns the epoch loop and hands each shuffled batch to the model; the model owns the forward pass, the gradients and the optimizer.
/// Both methods return one probability vector per sample, of length [`Model::num_classes`], which the loop turns into loss and accuracy.
pub trait Model {
    /// the number of classes the model predicts. Every probability vector the model returns must have this length
    fn num_classes(&self) -> usize;

    /// Run one optimization step over `batch`, returning the class probabilities the model produced for each sample during the forward pass.
    ///
    /// # Errors
    /// Returns a [`ModelError`] if any sample does not fit the model or the batch is empty.
    fn train_batch(&mut self, batch: &[&Sample]) -> Result<Vec<Vec<f32>>, ModelError>;

    /// Predict the class probabilities for a single input without updating the model.
    ///
    /// # Errors
    /// Returns a [`ModelError`] if the input does not fit the model.
    fn predict(&self, features: &[f32]) -> Result<Vec<f32>, ModelError>;

    /// Predict the class probabilities for every sample of `batch` without updating the model.
    ///
    /// The default calls [`Model::predict`] on each sample in turn; backends that vectorize inference should override it.
    ///
    /// # Errors
    /// Returns a [`ModelError`] if any sample does not fit the model.
    fn predict_batch(&self, batch: &[&Sample]) -> Result<Vec<Vec<f32>>, ModelError> {
        batch
            .iter()
            .map(|sample| self.predict(sample.features()))
            .collect()
    }
}

/// Check that a label names one of `num_classes` classes
pub(crate) fn check_label(label: usize, num_classes: usize) -> Result<(), ModelError> {
    if label >= num_classes {
        return Err(ModelError::LabelOutOfRange { label, num_classes });
    }
    Ok(())
}

/// Check that a probability vector returned by a model has one entry per class
pub(crate) fn check_output(output: &[f32], num_classes: usize) -> Result<(), ModelError> {
    if output.len() != num_classes {
        return Err(ModelError::OutputSizeMismatch {
            expected: num_classes,
            actual: output.len(),
        });
    }
    Ok(())
}
