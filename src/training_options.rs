use std::fmt;

/// Used by the [`fit`](crate::fit) function to determine how the model should be trained.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TrainingOptions {
    /// number of epochs for which to train, where an epoch is one complete pass through the training data. Observers may end the run sooner
    pub num_epochs: usize,
    /// number of samples passed to [`Model::train_batch`](crate::model::Model::train_batch) at once. The last batch of an epoch may be smaller
    pub batch_size: usize,
    /// whether to reshuffle the training data at the start of each epoch
    pub shuffle: bool,
    /// seed for the shuffling RNG. If None, the RNG is seeded from the operating system and runs are not reproducible
    pub seed: Option<u64>,
}

impl TrainingOptions {
    /// Create a new TrainingOptions struct with the given parameters.
    /// # Errors
    /// Returns [`TrainingOptionsError`] error if...
    /// * `num_epochs` is 0,
    /// * `batch_size` is 0.
    pub fn new(
        num_epochs: usize,
        batch_size: usize,
        shuffle: bool,
        seed: Option<u64>,
    ) -> Result<TrainingOptions, TrainingOptionsError> {
        if num_epochs == 0 {
            return Err(TrainingOptionsError::ZeroEpochs);
        }
        if batch_size == 0 {
            return Err(TrainingOptionsError::ZeroBatchSize);
        }
        Ok(TrainingOptions {
            num_epochs,
            batch_size,
            shuffle,
            seed,
        })
    }
}

impl Default for TrainingOptions {
    /// Returns a TrainingOptions struct with the following default values:
    /// * `num_epochs`: 10
    /// * `batch_size`: 60
    /// * `shuffle`: true
    /// * `seed`: None
    fn default() -> Self {
        TrainingOptions {
            num_epochs: 10,
            batch_size: 60,
            shuffle: true,
            seed: None,
        }
    }
}

/// Errors that can occur when creating a new TrainingOptions struct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingOptionsError {
    /// The run was configured to train for zero epochs
    ZeroEpochs,
    /// The batch size was zero, so no sample could ever be trained on
    ZeroBatchSize,
}

impl fmt::Display for TrainingOptionsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrainingOptionsError::ZeroEpochs => write!(f, "Number of epochs must be at least 1"),
            TrainingOptionsError::ZeroBatchSize => write!(f, "Batch size must be at least 1"),
        }
    }
}

impl std::error::Error for TrainingOptionsError {}
