use crate::training_context::TrainingContext;

/// Structs implementing this trait can be used to observe, and stop, the training process.
pub trait TrainingObserver {
    /// called by [`crate::fit`] at the end of each epoch, with the zero-based index of the epoch that just finished.
    /// The epoch's metrics are available through [`TrainingContext::logs`]; calling [`TrainingContext::stop_training`] ends the run before the next epoch starts.
    fn on_epoch_end(&self, epoch: usize, context: &mut TrainingContext);

    /// called by [`crate::fit`] after each batch has been passed through the model. useful for reporting progress.
    fn on_batch_end(&self, _batch: usize, _batch_size: usize) {}

    /// called by [`crate::fit`] once, before the first epoch
    fn on_train_begin(&self, _context: &TrainingContext) {}

    /// called by [`crate::fit`] once, after the last executed epoch
    fn on_train_end(&self, _context: &TrainingContext) {}
}

/// Adapts a closure into an end-of-epoch [`TrainingObserver`]
///
/// ```
/// use convfit::training_observer::{from_fn, TrainingObserver};
/// use convfit::training_context::TrainingContext;
///
/// let stop_at_three = from_fn(|epoch, context: &mut TrainingContext| {
///     if epoch == 3 {
///         context.stop_training();
///     }
/// });
/// let mut context = TrainingContext::new(10);
/// stop_at_three.on_epoch_end(3, &mut context);
/// assert!(context.should_stop());
/// ```
pub struct FnObserver<F>(F);

/// Wrap `f` so it is called at the end of every epoch
pub fn from_fn<F>(f: F) -> FnObserver<F>
where
    F: Fn(usize, &mut TrainingContext),
{
    FnObserver(f)
}

impl<F> TrainingObserver for FnObserver<F>
where
    F: Fn(usize, &mut TrainingContext),
{
    fn on_epoch_end(&self, epoch: usize, context: &mut TrainingContext) {
        (self.0)(epoch, context)
    }
}
