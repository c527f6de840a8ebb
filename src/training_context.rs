use crate::history::{EpochLogs, History};

/// The state of a single training run, as exposed to [`TrainingObserver`](crate::training_observer::TrainingObserver)s at each epoch boundary.
///
/// A context belongs to exactly one run: [`fit`](crate::fit) creates a fresh one, hands it by `&mut` to every observer, and checks its stop flag before starting the next epoch.
/// The stop flag can only be raised, never lowered, so an observer requesting a stop can't be overruled by one called after it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingContext {
    planned_epochs: usize,
    stop_training: bool,
    logs: Option<EpochLogs>,
    history: History,
}

impl TrainingContext {
    /// Create the context for a run planned to last `planned_epochs` epochs
    pub fn new(planned_epochs: usize) -> Self {
        TrainingContext {
            planned_epochs,
            stop_training: false,
            logs: None,
            history: History::new(),
        }
    }

    /// Ask the training loop to finish after the current epoch. Calling this more than once has no further effect
    pub fn stop_training(&mut self) {
        self.stop_training = true;
    }

    /// whether any observer has asked the run to stop
    pub fn should_stop(&self) -> bool {
        self.stop_training
    }

    /// the number of epochs the run will execute if no observer stops it
    pub fn planned_epochs(&self) -> usize {
        self.planned_epochs
    }

    /// the metrics of the epoch that just ended, or None before the first epoch has finished
    pub fn logs(&self) -> Option<&EpochLogs> {
        self.logs.as_ref()
    }

    /// the metrics of every epoch finished so far in this run
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Consume the context, keeping the recorded learning curves
    pub fn into_history(self) -> History {
        self.history
    }

    pub(crate) fn end_epoch(&mut self, logs: EpochLogs) {
        self.history.record(&logs);
        self.logs = Some(logs);
    }
}
