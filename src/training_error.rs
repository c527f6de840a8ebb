use crate::model::ModelError;

/// Indicates that an error was encountered during training
///
/// If displayed, this error will show the epoch and batch at which the error was encountered, as well as the [ModelError] that caused the error.
#[derive(Clone, PartialEq, Debug)]
pub struct TrainingError {
    /// The error that caused the training error
    pub source: ModelError,
    /// The zero-based epoch at which the error was encountered
    pub epoch: usize,
    /// The zero-based batch within the epoch at which the error was encountered
    pub batch: usize,
}

impl std::fmt::Display for TrainingError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "epoch {} batch {} encountered error {}",
            self.epoch, self.batch, self.source
        )
    }
}

impl std::error::Error for TrainingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
