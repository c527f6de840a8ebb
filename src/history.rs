use std::{
    fmt,
    io::{self, Write},
};

use serde::{Deserialize, Serialize};

/// The metrics of a single completed epoch, as seen by observers at the end of that epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLogs {
    /// zero-based index of the epoch
    pub epoch: usize,
    /// mean sparse categorical cross-entropy over the training batches
    pub loss: f64,
    /// mean sparse categorical accuracy over the training batches
    pub accuracy: f64,
    /// loss against the validation data, if the model was validated this epoch
    pub val_loss: Option<f64>,
    /// accuracy against the validation data, if the model was validated this epoch
    pub val_accuracy: Option<f64>,
}

/// Per-epoch learning curves for one training run.
///
/// Each series has one entry per executed epoch, except the validation series, which only grow on epochs where the model was validated.
/// Deserializing checks that the series line up, see [`HistoryError`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HistorySeries", into = "HistorySeries")]
pub struct History {
    loss: Vec<f64>,
    accuracy: Vec<f64>,
    val_loss: Vec<f64>,
    val_accuracy: Vec<f64>,
}

/// unchecked mirror of [`History`], used for (de)serialization
#[derive(Serialize, Deserialize)]
struct HistorySeries {
    loss: Vec<f64>,
    accuracy: Vec<f64>,
    val_loss: Vec<f64>,
    val_accuracy: Vec<f64>,
}

impl TryFrom<HistorySeries> for History {
    type Error = HistoryError;

    fn try_from(series: HistorySeries) -> Result<Self, Self::Error> {
        if series.accuracy.len() != series.loss.len() {
            return Err(HistoryError::AccuracyLength {
                loss: series.loss.len(),
                accuracy: series.accuracy.len(),
            });
        }
        if series.val_accuracy.len() != series.val_loss.len() {
            return Err(HistoryError::ValidationLength {
                val_loss: series.val_loss.len(),
                val_accuracy: series.val_accuracy.len(),
            });
        }
        if series.val_loss.len() > series.loss.len() {
            return Err(HistoryError::TooManyValidations {
                epochs: series.loss.len(),
                validations: series.val_loss.len(),
            });
        }
        Ok(History {
            loss: series.loss,
            accuracy: series.accuracy,
            val_loss: series.val_loss,
            val_accuracy: series.val_accuracy,
        })
    }
}

impl From<History> for HistorySeries {
    fn from(history: History) -> Self {
        HistorySeries {
            loss: history.loss,
            accuracy: history.accuracy,
            val_loss: history.val_loss,
            val_accuracy: history.val_accuracy,
        }
    }
}

/// A deserialized [`History`] whose series do not line up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    /// the training accuracy series does not have one entry per epoch
    AccuracyLength {
        /// length of the loss series
        loss: usize,
        /// length of the accuracy series
        accuracy: usize,
    },
    /// the validation loss and validation accuracy series differ in length
    ValidationLength {
        /// length of the validation loss series
        val_loss: usize,
        /// length of the validation accuracy series
        val_accuracy: usize,
    },
    /// more validated epochs than epochs
    TooManyValidations {
        /// number of recorded epochs
        epochs: usize,
        /// length of the validation series
        validations: usize,
    },
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::AccuracyLength { loss, accuracy } => write!(
                f,
                "history has {} loss values but {} accuracy values",
                loss, accuracy
            ),
            HistoryError::ValidationLength {
                val_loss,
                val_accuracy,
            } => write!(
                f,
                "history has {} validation loss values but {} validation accuracy values",
                val_loss, val_accuracy
            ),
            HistoryError::TooManyValidations {
                epochs,
                validations,
            } => write!(
                f,
                "history has {} validation values for only {} epochs",
                validations, epochs
            ),
        }
    }
}

impl std::error::Error for HistoryError {}

impl History {
    /// Create an empty history
    pub fn new() -> Self {
        History::default()
    }

    pub(crate) fn record(&mut self, logs: &EpochLogs) {
        self.loss.push(logs.loss);
        self.accuracy.push(logs.accuracy);
        if let Some(val_loss) = logs.val_loss {
            self.val_loss.push(val_loss);
        }
        if let Some(val_accuracy) = logs.val_accuracy {
            self.val_accuracy.push(val_accuracy);
        }
    }

    /// number of epochs recorded
    pub fn len(&self) -> usize {
        self.loss.len()
    }

    /// true if no epoch has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.loss.is_empty()
    }

    /// one-based epoch numbers, suitable as the x-axis of a learning curve
    pub fn epochs(&self) -> Vec<usize> {
        (1..=self.len()).collect()
    }

    /// training loss per epoch
    pub fn loss(&self) -> &[f64] {
        &self.loss
    }

    /// training accuracy per epoch
    pub fn accuracy(&self) -> &[f64] {
        &self.accuracy
    }

    /// validation loss per validated epoch
    pub fn val_loss(&self) -> &[f64] {
        &self.val_loss
    }

    /// validation accuracy per validated epoch
    pub fn val_accuracy(&self) -> &[f64] {
        &self.val_accuracy
    }

    /// true if every recorded epoch was validated
    fn fully_validated(&self) -> bool {
        !self.is_empty() && self.val_loss.len() == self.len()
    }

    /// The zero-based epoch with the lowest loss.
    ///
    /// Uses the validation loss when every epoch was validated, and the training loss otherwise. Returns None for an empty history.
    pub fn best_epoch(&self) -> Option<usize> {
        let series = if self.fully_validated() {
            &self.val_loss
        } else {
            &self.loss
        };
        series
            .iter()
            .enumerate()
            .filter(|(_, loss)| !loss.is_nan())
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(idx, _)| idx)
    }

    /// Write the history as CSV, one row per epoch, with a header of `epoch,loss,accuracy,val_loss,val_accuracy`.
    ///
    /// Validation columns are left empty for epochs that were not validated.
    pub fn write_csv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writeln!(writer, "epoch,loss,accuracy,val_loss,val_accuracy")?;
        let validated = self.fully_validated();
        let cell = |series: &[f64], idx: usize| {
            series
                .get(idx)
                .filter(|_| validated)
                .map_or(String::new(), |value| value.to_string())
        };
        for (idx, (loss, accuracy)) in self.loss.iter().zip(&self.accuracy).enumerate() {
            writeln!(
                writer,
                "{},{},{},{},{}",
                idx + 1,
                loss,
                accuracy,
                cell(&self.val_loss, idx),
                cell(&self.val_accuracy, idx)
            )?;
        }
        Ok(())
    }
}
