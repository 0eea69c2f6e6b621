//! Progress state and listener interface for batch runs

use crate::s3::S3Error;

/// Accumulated outcome of a batch run.
///
/// Only the executor's dispatch loop mutates it; listeners see it by
/// shared reference.
#[derive(Debug)]
pub struct BatchProgress<T> {
    /// Successful results in completion order
    pub completed: Vec<(String, T)>,
    /// Terminal per-operation failures in completion order
    pub errors: Vec<(String, S3Error)>,
    /// Whether the run was cancelled before every operation was dispatched
    pub cancelled: bool,
    /// Number of operations submitted
    pub total: usize,
}

impl<T> BatchProgress<T> {
    pub fn new(total: usize) -> Self {
        Self {
            completed: Vec::new(),
            errors: Vec::new(),
            cancelled: false,
            total,
        }
    }

    /// Operations that reached a terminal state
    pub fn finished(&self) -> usize {
        self.completed.len() + self.errors.len()
    }

    /// Whether every submitted operation succeeded
    pub fn is_complete_success(&self) -> bool {
        !self.cancelled && self.errors.is_empty() && self.completed.len() == self.total
    }
}

/// Results that arrived since the previous progress event
#[derive(Debug)]
pub struct ProgressBatch<'a, T> {
    pub completed: &'a [(String, T)],
    pub errors: &'a [(String, S3Error)],
    /// Successes so far, this batch included
    pub completed_total: usize,
    /// Failures so far, this batch included
    pub errors_total: usize,
    pub total: usize,
}

/// Receives batch events.
///
/// Calls are made from a single dispatch loop, one at a time, so
/// implementations need no locking of their own. `on_complete` is called
/// exactly once and nothing follows it.
pub trait BatchListener<T>: Send {
    fn on_progress(&mut self, batch: &ProgressBatch<'_, T>);

    fn on_complete(&mut self, progress: &BatchProgress<T>);
}

/// Listener that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl<T> BatchListener<T> for NoopListener {
    fn on_progress(&mut self, _batch: &ProgressBatch<'_, T>) {}

    fn on_complete(&mut self, _progress: &BatchProgress<T>) {}
}

/// Fan events out to several listeners, in order
impl<T> BatchListener<T> for Vec<Box<dyn BatchListener<T>>> {
    fn on_progress(&mut self, batch: &ProgressBatch<'_, T>) {
        for listener in self.iter_mut() {
            listener.on_progress(batch);
        }
    }

    fn on_complete(&mut self, progress: &BatchProgress<T>) {
        for listener in self.iter_mut() {
            listener.on_complete(progress);
        }
    }
}

/// Owned accumulator driven by the dispatch loop
pub(crate) struct Accumulator<T> {
    progress: BatchProgress<T>,
    emitted_completed: usize,
    emitted_errors: usize,
}

impl<T> Accumulator<T> {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            progress: BatchProgress::new(total),
            emitted_completed: 0,
            emitted_errors: 0,
        }
    }

    pub(crate) fn record(&mut self, key: String, result: Result<T, S3Error>) {
        match result {
            Ok(value) => self.progress.completed.push((key, value)),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "operation failed");
                self.progress.errors.push((key, err));
            }
        }
    }

    /// Emit one progress event with everything recorded since the last one
    pub(crate) fn flush(&mut self, listener: &mut dyn BatchListener<T>) {
        let completed = &self.progress.completed[self.emitted_completed..];
        let errors = &self.progress.errors[self.emitted_errors..];
        if completed.is_empty() && errors.is_empty() {
            return;
        }

        listener.on_progress(&ProgressBatch {
            completed,
            errors,
            completed_total: self.progress.completed.len(),
            errors_total: self.progress.errors.len(),
            total: self.progress.total,
        });
        self.emitted_completed = self.progress.completed.len();
        self.emitted_errors = self.progress.errors.len();
    }

    /// Flush what is pending, then deliver the terminal event
    pub(crate) fn finish(
        mut self,
        cancelled: bool,
        listener: &mut dyn BatchListener<T>,
    ) -> BatchProgress<T> {
        self.flush(listener);
        self.progress.cancelled = cancelled;
        listener.on_complete(&self.progress);
        self.progress
    }
}
