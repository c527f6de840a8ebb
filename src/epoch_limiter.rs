use log::info;

use crate::training_context::TrainingContext;
use crate::training_observer::TrainingObserver;

/// Stops a training run once a fixed epoch has finished, regardless of how the model is converging.
///
/// `stop_epoch` is zero-based: `EpochLimiter::new(4)` lets epochs 0 through 4 run, so a run planned for 10 epochs executes 5.
/// A `stop_epoch` at or beyond the planned epoch count never fires.
///
/// The limiter holds no per-run state; the stop request lives in the [`TrainingContext`], so a new context starts a new run.
///
/// ```
/// use convfit::epoch_limiter::EpochLimiter;
/// use convfit::training_context::TrainingContext;
/// use convfit::training_observer::TrainingObserver;
///
/// let limiter = EpochLimiter::new(1);
/// let mut context = TrainingContext::new(10);
/// limiter.on_epoch_end(0, &mut context);
/// assert!(!context.should_stop());
/// limiter.on_epoch_end(1, &mut context);
/// assert!(context.should_stop());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EpochLimiter {
    stop_epoch: usize,
}

impl EpochLimiter {
    /// Create a limiter that stops the run after epoch `stop_epoch` (zero-based)
    pub fn new(stop_epoch: usize) -> Self {
        EpochLimiter { stop_epoch }
    }

    /// the zero-based epoch after which the run is stopped
    pub fn stop_epoch(&self) -> usize {
        self.stop_epoch
    }
}

impl TrainingObserver for EpochLimiter {
    fn on_epoch_end(&self, epoch: usize, context: &mut TrainingContext) {
        if epoch == self.stop_epoch {
            info!("epoch {} reached, requesting stop", epoch);
            context.stop_training();
        }
    }
}
