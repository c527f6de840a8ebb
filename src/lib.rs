#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! A library to drive image-classifier training runs.
//!
//! The `convfit` crate owns the parts of a training run that sit around the numerics: loading and normalizing the CIFAR-10 dataset,
//! describing the network architecture, running the epoch loop, computing loss and accuracy, recording learning curves,
//! and letting [observers](training_observer::TrainingObserver) watch (and stop) the run at each epoch boundary.
//!
//! The numerics themselves live behind the [`Model`](model::Model) trait. The crate ships [`NearestCentroid`](baseline::NearestCentroid),
//! a simple baseline, so a run can be driven end to end without a numerical backend.
//!
//! ## Stopping a run early
//! Observers receive a mutable [`TrainingContext`](training_context::TrainingContext) at the end of every epoch. Calling
//! [`stop_training`](training_context::TrainingContext::stop_training) on it ends the run once the current epoch is complete.
//! [`EpochLimiter`](epoch_limiter::EpochLimiter) does exactly this when a given epoch is reached.
//!
//! # Examples
//! Train the baseline for at most 10 epochs, stopping after the fifth (epoch index 4):
//! ```
//! use convfit::baseline::NearestCentroid;
//! use convfit::epoch_limiter::EpochLimiter;
//! use convfit::{fit, evaluate, EachEpoch, Sample, TrainingOptions};
//!
//! let training_data: Vec<Sample> = Vec::new();
//! /* Load training data */
//! # let training_data = vec![Sample::new(vec![0.0, 0.0], 0), Sample::new(vec![1.0, 1.0], 1)];
//! # let test_data = training_data.clone();
//!
//! let mut model = NearestCentroid::new(2, 2, 1.0);
//! let limiter = EpochLimiter::new(4);
//! let history = fit(
//!     &mut model,
//!     &training_data,
//!     EachEpoch::ValidateModel(&test_data),
//!     &[&limiter],
//!     &TrainingOptions { num_epochs: 10, batch_size: 60, ..TrainingOptions::default() },
//! )?;
//! assert_eq!(history.len(), 5);
//!
//! let evaluation = evaluate(&model, &test_data, 60)?;
//! println!("Test accuracy: {}", evaluation.accuracy);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Declarative description of the convolutional network, with shape inference and parameter counting.
pub mod architecture;
/// A nearest-centroid [`Model`](model::Model) for running the training loop without a numerical backend.
pub mod baseline;
pub mod dataset;
/// Stops a training run after a fixed epoch.
pub mod epoch_limiter;
/// Per-epoch metrics and learning curves.
pub mod history;
/// Loss and accuracy functions.
pub mod metrics;
/// The trait through which the training loop drives a model.
pub mod model;
/// The per-run state handed to observers.
pub mod training_context;
/// Errors raised by [`fit`].
pub mod training_error;
/// Provides a trait for observing the training process during [`crate::fit`].
pub mod training_observer;
/// Options for training a model with [`crate::fit`].
pub mod training_options;

use log::{debug, info, trace};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use shuffle::{fy, shuffler::Shuffler};

pub use history::{EpochLogs, History};
use metrics::{sparse_categorical_accuracy, sparse_categorical_crossentropy, Mean};
use model::{check_label, check_output, Model, ModelError};
use training_context::TrainingContext;
pub use training_error::TrainingError;
use training_observer::TrainingObserver;
pub use training_options::TrainingOptions;

/// A labelled sample of data to be used in training a model.
///
/// Used for both [training](fit) and [evaluation](evaluate) data.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Sample {
    /// The input data for the model
    features: Vec<f32>,
    /// The index of the sample's class
    label: usize,
}

impl Sample {
    /// Create a new Sample
    pub fn new(features: Vec<f32>, label: usize) -> Self {
        Sample { features, label }
    }

    /// Get the features of the sample
    pub fn features(&self) -> &[f32] {
        &self.features
    }
    /// Get the label of the sample
    pub fn label(&self) -> usize {
        self.label
    }
}

/// Indicates whether the model should be tested against the validation data set after each epoch
pub enum EachEpoch<'a> {
    /// Test the model against the validation data set after each epoch, and report the validation loss and accuracy through the [TrainingContext]
    ValidateModel(&'a [Sample]),
    /// Do not test the model against the validation data set after each epoch
    DoNotValidateModel,
}

/// The loss and accuracy of a model over a data set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// mean sparse categorical cross-entropy
    pub loss: f64,
    /// fraction of samples whose most likely class was the label
    pub accuracy: f64,
}

/// Train the provided model with the provided data.
///
/// Each epoch, the training data is shuffled (if `options.shuffle` is set) and passed through [`Model::train_batch`] in batches of `options.batch_size`.
/// If `validate` is [`EachEpoch::ValidateModel`], the model is then [evaluated](evaluate) against the validation data.
/// The epoch's metrics are recorded in the run's [`TrainingContext`], then each observer's [`on_epoch_end`](TrainingObserver::on_epoch_end) is called, in order.
/// If any observer has [requested a stop](TrainingContext::stop_training), no further epochs are run.
///
/// Epochs are numbered from zero. Returns the [`History`] of every epoch that ran.
///
/// # Errors
/// returns a [TrainingError] if the model reports an error at any point during training or validation, or returns a malformed output.
/// Empty training data is reported as [`ModelError::EmptyBatch`] at epoch 0.
///
/// # Example
/// train a model with a closure observer that stops the run once training accuracy passes 90%:
/// ```
/// use convfit::baseline::NearestCentroid;
/// use convfit::training_context::TrainingContext;
/// use convfit::training_observer::from_fn;
/// use convfit::{fit, EachEpoch, Sample, TrainingOptions};
/// # use convfit::TrainingError;
///
/// let mut training_data: Vec<Sample> = Vec::new();
/// /* Load training data */
/// # training_data.push(Sample::new(vec![0.0], 0));
/// # training_data.push(Sample::new(vec![1.0], 1));
///
/// let good_enough = from_fn(|_epoch, context: &mut TrainingContext| {
///     if context.logs().map_or(false, |logs| logs.accuracy > 0.9) {
///         context.stop_training();
///     }
/// });
/// let mut model = NearestCentroid::new(1, 2, 0.01);
/// let history = fit(
///     &mut model,
///     &training_data,
///     EachEpoch::DoNotValidateModel,
///     &[&good_enough],
///     &TrainingOptions::default(),
/// )?;
/// assert!(history.len() <= 10);
/// # Ok::<(), TrainingError>(())
/// ```
pub fn fit<M: Model>(
    model: &mut M,
    training_data: &[Sample],
    validate: EachEpoch,
    observers: &[&dyn TrainingObserver],
    options: &TrainingOptions,
) -> Result<History, TrainingError> {
    if training_data.is_empty() {
        return Err(TrainingError {
            source: ModelError::EmptyBatch,
            epoch: 0,
            batch: 0,
        });
    }
    let mut randomness = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut fys = fy::FisherYates::default();
    let batch_size = options.batch_size.max(1);
    let num_classes = model.num_classes();

    let mut context = TrainingContext::new(options.num_epochs);
    for observer in observers {
        observer.on_train_begin(&context);
    }

    for epoch in 0..options.num_epochs {
        let mut loss = Mean::new();
        let mut accuracy = Mean::new();
        let mut order: Vec<&Sample> = training_data.iter().collect();
        if options.shuffle {
            fys.shuffle(&mut order, &mut randomness)
                .expect("Shuffling can't fail");
        }

        let mut batches_run = 0;
        for (batch_index, batch) in order.chunks(batch_size).enumerate() {
            let as_training_error = |source: ModelError| TrainingError {
                source,
                epoch,
                batch: batch_index,
            };
            let outputs = model.train_batch(batch).map_err(as_training_error)?;
            if outputs.len() != batch.len() {
                return Err(as_training_error(ModelError::OutputSizeMismatch {
                    expected: batch.len(),
                    actual: outputs.len(),
                }));
            }
            for (sample, output) in batch.iter().zip(outputs.iter()) {
                check_output(output, num_classes).map_err(as_training_error)?;
                check_label(sample.label(), num_classes).map_err(as_training_error)?;
                loss.add(sparse_categorical_crossentropy(output, sample.label()));
                accuracy.add(sparse_categorical_accuracy(output, sample.label()));
            }
            trace!(
                "epoch {} batch {}: running loss {}",
                epoch,
                batch_index,
                loss.value()
            );
            for observer in observers {
                observer.on_batch_end(batch_index, batch.len());
            }
            batches_run += 1;
        }

        let validation = match validate {
            EachEpoch::ValidateModel(validation_data) => Some(
                evaluate(model, validation_data, batch_size).map_err(|source| TrainingError {
                    source,
                    epoch,
                    batch: batches_run,
                })?,
            ),
            EachEpoch::DoNotValidateModel => None,
        };
        let logs = EpochLogs {
            epoch,
            loss: loss.value(),
            accuracy: accuracy.value(),
            val_loss: validation.map(|v| v.loss),
            val_accuracy: validation.map(|v| v.accuracy),
        };
        debug!("epoch {} finished: {:?}", epoch, logs);
        context.end_epoch(logs);

        // notify the observers that the epoch has ended
        for observer in observers {
            observer.on_epoch_end(epoch, &mut context);
        }
        if context.should_stop() {
            info!(
                "training stopped after epoch {} of {}",
                epoch,
                options.num_epochs
            );
            break;
        }
    }

    for observer in observers {
        observer.on_train_end(&context);
    }
    Ok(context.into_history())
}

/// Calculates the mean sparse categorical cross-entropy and accuracy of the model on the provided data, without updating the model.
///
/// The data is passed to [`Model::predict_batch`] in order, in batches of `batch_size` (the last batch may be short). A `batch_size` of 0 is treated as 1.
///
/// # Errors
/// Returns a [`ModelError`] if the data is empty, the model rejects a sample, or the model returns a malformed output.
pub fn evaluate<M: Model>(
    model: &M,
    data: &[Sample],
    batch_size: usize,
) -> Result<Evaluation, ModelError> {
    if data.is_empty() {
        return Err(ModelError::EmptyBatch);
    }
    let num_classes = model.num_classes();
    let mut loss = Mean::new();
    let mut accuracy = Mean::new();
    let samples: Vec<&Sample> = data.iter().collect();
    for batch in samples.chunks(batch_size.max(1)) {
        let outputs = model.predict_batch(batch)?;
        if outputs.len() != batch.len() {
            return Err(ModelError::OutputSizeMismatch {
                expected: batch.len(),
                actual: outputs.len(),
            });
        }
        for (sample, output) in batch.iter().zip(outputs.iter()) {
            check_output(output, num_classes)?;
            check_label(sample.label(), num_classes)?;
            loss.add(sparse_categorical_crossentropy(output, sample.label()));
            accuracy.add(sparse_categorical_accuracy(output, sample.label()));
        }
    }
    Ok(Evaluation {
        loss: loss.value(),
        accuracy: accuracy.value(),
    })
}

// EmptyObserver is basically a singleton, so there's no point in implementing any other common traits
/// An observer that does nothing when called.
/// Used for ignoring training events in the [fit] function.
#[derive(Default)]
pub struct EmptyObserver {}
impl EmptyObserver {
    /// Create a new instance of the EmptyObserver
    pub fn new() -> Self {
        EmptyObserver {}
    }
}
impl TrainingObserver for EmptyObserver {
    fn on_epoch_end(&self, _epoch: usize, _context: &mut TrainingContext) {
        // do nothing
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use test_log::test;

    /// predicts a fixed distribution and records every batch size it sees
    struct FixedModel {
        output: Vec<f32>,
        batch_sizes: Vec<usize>,
    }

    impl FixedModel {
        fn new(output: Vec<f32>) -> Self {
            FixedModel {
                output,
                batch_sizes: Vec::new(),
            }
        }
    }

    impl Model for FixedModel {
        fn num_classes(&self) -> usize {
            self.output.len()
        }

        fn train_batch(&mut self, batch: &[&Sample]) -> Result<Vec<Vec<f32>>, ModelError> {
            self.batch_sizes.push(batch.len());
            Ok(vec![self.output.clone(); batch.len()])
        }

        fn predict(&self, _features: &[f32]) -> Result<Vec<f32>, ModelError> {
            Ok(self.output.clone())
        }
    }

    #[derive(Default)]
    struct EpochRecorder {
        epochs: RefCell<Vec<usize>>,
        began: RefCell<usize>,
        ended: RefCell<usize>,
    }

    impl TrainingObserver for EpochRecorder {
        fn on_epoch_end(&self, epoch: usize, _context: &mut TrainingContext) {
            self.epochs.borrow_mut().push(epoch);
        }

        fn on_train_begin(&self, _context: &TrainingContext) {
            *self.began.borrow_mut() += 1;
        }

        fn on_train_end(&self, _context: &TrainingContext) {
            *self.ended.borrow_mut() += 1;
        }
    }

    fn data(n: usize) -> Vec<Sample> {
        (0..n).map(|i| Sample::new(vec![i as f32], i % 2)).collect()
    }

    #[test]
    fn test_runs_every_planned_epoch_without_stop() {
        let mut model = FixedModel::new(vec![0.5, 0.5]);
        let recorder = EpochRecorder::default();
        let history = fit(
            &mut model,
            &data(10),
            EachEpoch::DoNotValidateModel,
            &[&recorder],
            &TrainingOptions {
                num_epochs: 3,
                batch_size: 4,
                ..TrainingOptions::default()
            },
        )
        .unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(*recorder.epochs.borrow(), vec![0, 1, 2]);
        assert_eq!(*recorder.began.borrow(), 1);
        assert_eq!(*recorder.ended.borrow(), 1);
        // 10 samples in batches of 4, three times
        assert_eq!(model.batch_sizes, vec![4, 4, 2, 4, 4, 2, 4, 4, 2]);
    }

    #[test]
    fn test_metrics_are_recorded() {
        let mut model = FixedModel::new(vec![0.25, 0.75]);
        let history = fit(
            &mut model,
            &data(4),
            EachEpoch::ValidateModel(&data(2)),
            &[&EmptyObserver::new()],
            &TrainingOptions {
                num_epochs: 1,
                ..TrainingOptions::default()
            },
        )
        .unwrap();
        // labels alternate 0, 1: half the samples have p = 0.25, half p = 0.75
        let expected_loss = (-(0.25f64.ln()) - 0.75f64.ln()) / 2.0;
        assert!((history.loss()[0] - expected_loss).abs() < 1e-6);
        assert_eq!(history.accuracy(), &[0.5]);
        assert_eq!(history.val_accuracy(), &[0.5]);
        assert_eq!(history.val_loss().len(), 1);
    }

    #[test]
    fn test_stop_request_ends_run_after_current_epoch() {
        let mut model = FixedModel::new(vec![0.5, 0.5]);
        let recorder = EpochRecorder::default();
        let stopper = training_observer::from_fn(|epoch, context: &mut TrainingContext| {
            if epoch == 1 {
                context.stop_training();
            }
        });
        // the recorder is registered after the stopper, and still sees the stopping epoch
        let history = fit(
            &mut model,
            &data(3),
            EachEpoch::DoNotValidateModel,
            &[&stopper, &recorder],
            &TrainingOptions::default(),
        )
        .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(*recorder.epochs.borrow(), vec![0, 1]);
        assert_eq!(*recorder.began.borrow(), 1);
        assert_eq!(*recorder.ended.borrow(), 1);
    }

    #[test]
    fn test_empty_training_data_is_an_error() {
        let mut model = FixedModel::new(vec![1.0]);
        let result = fit(
            &mut model,
            &[],
            EachEpoch::DoNotValidateModel,
            &[],
            &TrainingOptions::default(),
        );
        assert_eq!(
            result.unwrap_err(),
            TrainingError {
                source: ModelError::EmptyBatch,
                epoch: 0,
                batch: 0
            }
        );
    }

    #[test]
    fn test_label_outside_model_classes_is_reported_with_position() {
        let mut model = FixedModel::new(vec![1.0]);
        let result = fit(
            &mut model,
            &data(4),
            EachEpoch::DoNotValidateModel,
            &[],
            &TrainingOptions {
                batch_size: 1,
                shuffle: false,
                ..TrainingOptions::default()
            },
        );
        // sample 1 has label 1, but the model only has one class
        assert_eq!(
            result.unwrap_err(),
            TrainingError {
                source: ModelError::LabelOutOfRange {
                    label: 1,
                    num_classes: 1
                },
                epoch: 0,
                batch: 1
            }
        );
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        struct OrderModel(Vec<usize>);
        impl Model for OrderModel {
            fn num_classes(&self) -> usize {
                1
            }
            fn train_batch(&mut self, batch: &[&Sample]) -> Result<Vec<Vec<f32>>, ModelError> {
                self.0
                    .extend(batch.iter().map(|sample| sample.features()[0] as usize));
                Ok(vec![vec![1.0]; batch.len()])
            }
            fn predict(&self, _features: &[f32]) -> Result<Vec<f32>, ModelError> {
                Ok(vec![1.0])
            }
        }
        let samples: Vec<Sample> = (0..20).map(|i| Sample::new(vec![i as f32], 0)).collect();
        let options = TrainingOptions {
            num_epochs: 2,
            seed: Some(42),
            ..TrainingOptions::default()
        };
        let mut first = OrderModel(Vec::new());
        let mut second = OrderModel(Vec::new());
        fit(&mut first, &samples, EachEpoch::DoNotValidateModel, &[], &options).unwrap();
        fit(&mut second, &samples, EachEpoch::DoNotValidateModel, &[], &options).unwrap();
        assert_eq!(first.0, second.0);
        assert_eq!(first.0.len(), 40);
    }

    #[test]
    fn test_evaluate_empty_data() {
        let model = FixedModel::new(vec![1.0]);
        assert_eq!(evaluate(&model, &[], 4), Err(ModelError::EmptyBatch));
    }

    #[test]
    fn test_evaluate_rejects_wrong_output_size() {
        struct ShortModel;
        impl Model for ShortModel {
            fn num_classes(&self) -> usize {
                3
            }
            fn train_batch(&mut self, batch: &[&Sample]) -> Result<Vec<Vec<f32>>, ModelError> {
                Ok(vec![vec![1.0]; batch.len()])
            }
            fn predict(&self, _features: &[f32]) -> Result<Vec<f32>, ModelError> {
                Ok(vec![1.0])
            }
        }
        assert_eq!(
            evaluate(&ShortModel, &data(1), 4),
            Err(ModelError::OutputSizeMismatch {
                expected: 3,
                actual: 1
            })
        );
    }

    /// records the size of every prediction batch
    struct BatchCounter {
        batch_sizes: RefCell<Vec<usize>>,
    }

    impl Model for BatchCounter {
        fn num_classes(&self) -> usize {
            2
        }
        fn train_batch(&mut self, batch: &[&Sample]) -> Result<Vec<Vec<f32>>, ModelError> {
            Ok(vec![vec![0.5, 0.5]; batch.len()])
        }
        fn predict(&self, _features: &[f32]) -> Result<Vec<f32>, ModelError> {
            Ok(vec![0.25, 0.75])
        }
        fn predict_batch(&self, batch: &[&Sample]) -> Result<Vec<Vec<f32>>, ModelError> {
            self.batch_sizes.borrow_mut().push(batch.len());
            Ok(vec![vec![0.25, 0.75]; batch.len()])
        }
    }

    #[test]
    fn test_evaluate_in_batches() {
        let model = BatchCounter {
            batch_sizes: RefCell::new(Vec::new()),
        };
        let evaluation = evaluate(&model, &data(10), 4).unwrap();
        assert_eq!(*model.batch_sizes.borrow(), vec![4, 4, 2]);
        assert_eq!(evaluation.accuracy, 0.5);
        // batch size does not change the result
        let unbatched = evaluate(&model, &data(10), 0).unwrap();
        assert_eq!(model.batch_sizes.borrow().len(), 13);
        assert!((unbatched.loss - evaluation.loss).abs() < 1e-12);
    }

    #[test]
    fn test_validation_uses_training_batch_size() {
        let mut model = BatchCounter {
            batch_sizes: RefCell::new(Vec::new()),
        };
        fit(
            &mut model,
            &data(4),
            EachEpoch::ValidateModel(&data(5)),
            &[],
            &TrainingOptions {
                num_epochs: 1,
                batch_size: 3,
                ..TrainingOptions::default()
            },
        )
        .unwrap();
        assert_eq!(*model.batch_sizes.borrow(), vec![3, 2]);
    }

    #[test]
    fn test_evaluate_rejects_missing_batch_outputs() {
        struct DroppingModel;
        impl Model for DroppingModel {
            fn num_classes(&self) -> usize {
                1
            }
            fn train_batch(&mut self, batch: &[&Sample]) -> Result<Vec<Vec<f32>>, ModelError> {
                Ok(vec![vec![1.0]; batch.len()])
            }
            fn predict(&self, _features: &[f32]) -> Result<Vec<f32>, ModelError> {
                Ok(vec![1.0])
            }
            fn predict_batch(&self, _batch: &[&Sample]) -> Result<Vec<Vec<f32>>, ModelError> {
                Ok(vec![vec![1.0]])
            }
        }
        let samples = vec![Sample::new(vec![0.0], 0); 3];
        assert_eq!(
            evaluate(&DroppingModel, &samples, 3),
            Err(ModelError::OutputSizeMismatch {
                expected: 3,
                actual: 1
            })
        );
    }

    #[test]
    fn test_error_send() {
        fn assert_send<T: Send>() {}
        assert_send::<TrainingError>();
    }

    #[test]
    fn test_error_sync() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<TrainingError>();
    }
}
