use std::fmt;

/// An error reported by a [`Model`](crate::model::Model) while training on or predicting a batch of samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelError {
    /// The sample's feature vector did not have the length the model expects
    InputSizeMismatch {
        /// the number of features the model expects
        expected: usize,
        /// the number of features the sample had
        actual: usize,
    },
    /// The sample's label does not name one of the model's classes
    LabelOutOfRange {
        /// the offending label
        label: usize,
        /// the number of classes the model predicts
        num_classes: usize,
    },
    /// The model produced a probability vector of the wrong length
    OutputSizeMismatch {
        /// the number of classes the model claims to predict
        expected: usize,
        /// the length of the vector actually produced
        actual: usize,
    },
    /// The model was asked to process a batch with no samples in it
    EmptyBatch,
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelError::InputSizeMismatch { expected, actual } => write!(
                f,
                "input size mismatch: expected {} features, got {}",
                expected, actual
            ),
            ModelError::LabelOutOfRange { label, num_classes } => write!(
                f,
                "label {} is out of range for a model with {} classes",
                label, num_classes
            ),
            ModelError::OutputSizeMismatch { expected, actual } => write!(
                f,
                "output size mismatch: expected {} class probabilities, got {}",
                expected, actual
            ),
            ModelError::EmptyBatch => write!(f, "cannot process an empty batch"),
        }
    }
}

impl std::error::Error for ModelError {}
