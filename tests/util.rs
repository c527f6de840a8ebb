use std::cell::RefCell;

use convfit::model::{Model, ModelError};
use convfit::training_context::TrainingContext;
use convfit::training_observer::TrainingObserver;
use convfit::Sample;

/// Prints each epoch's results and remembers which epochs it saw, and whether the stop flag was set when it saw them
#[derive(Default)]
pub struct TestObserver {
    pub epochs: RefCell<Vec<(usize, bool)>>,
}

impl TestObserver {
    pub fn new() -> Self {
        TestObserver::default()
    }
}

impl TrainingObserver for TestObserver {
    fn on_epoch_end(&self, epoch: usize, context: &mut TrainingContext) {
        if let Some(logs) = context.logs() {
            println!(
                "Epoch: {}, Loss: {}, Validation Loss: {:?}",
                epoch, logs.loss, logs.val_loss
            );
        }
        self.epochs.borrow_mut().push((epoch, context.should_stop()));
    }
}

/// A model that predicts a uniform distribution and counts the batches it was trained on
pub struct UniformModel {
    pub num_classes: usize,
    pub batches_seen: usize,
}

impl Model for UniformModel {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn train_batch(&mut self, batch: &[&Sample]) -> Result<Vec<Vec<f32>>, ModelError> {
        self.batches_seen += 1;
        Ok(batch
            .iter()
            .map(|_| vec![1.0 / self.num_classes as f32; self.num_classes])
            .collect())
    }

    fn predict(&self, _features: &[f32]) -> Result<Vec<f32>, ModelError> {
        Ok(vec![1.0 / self.num_classes as f32; self.num_classes])
    }
}
