use tracing::error;

/// Sink for failures caught at the task/step invocation boundary.
///
/// The scheduler never stops on a failing body: the failure is reported
/// here and the next tick proceeds as usual.
pub trait TickObserver: Send + Sync {
    /// A recurring task body panicked.
    fn task_failed(&self, task: &str, detail: &str);

    /// A step guard or action panicked, or the action reported failure.
    fn step_failed(&self, index: usize, detail: &str);
}

/// Default observer: reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl TickObserver for LogObserver {
    fn task_failed(&self, task: &str, detail: &str) {
        error!(task, detail, "task tick failed");
    }

    fn step_failed(&self, index: usize, detail: &str) {
        error!(index, detail, "step tick failed");
    }
}
