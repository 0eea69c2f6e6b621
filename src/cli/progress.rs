//! Terminal progress bar driven by batch events

use indicatif::{ProgressBar, ProgressStyle};

use crate::batch::{BatchListener, BatchProgress, ProgressBatch};

/// Progress bar over the operations of one batch
pub struct BarListener {
    bar: ProgressBar,
}

impl BarListener {
    pub fn new(label: &str) -> anyhow::Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.green/blue} {pos}/{len} {msg}")?
                .progress_chars("=>-"),
        );
        bar.set_message(label.to_string());
        Ok(Self { bar })
    }

    /// Bar that draws nothing, for scripted output
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl<T> BatchListener<T> for BarListener {
    fn on_progress(&mut self, batch: &ProgressBatch<'_, T>) {
        self.bar.set_length(batch.total as u64);
        self.bar
            .set_position((batch.completed_total + batch.errors_total) as u64);
        for (key, err) in batch.errors {
            self.bar.println(format!("failed: {} ({})", key, err));
        }
    }

    fn on_complete(&mut self, progress: &BatchProgress<T>) {
        self.bar.set_length(progress.total as u64);
        self.bar.set_position(progress.finished() as u64);
        let message = if progress.cancelled {
            "cancelled".to_string()
        } else if progress.errors.is_empty() {
            "done".to_string()
        } else {
            format!("{} failed", progress.errors.len())
        };
        self.bar.finish_with_message(message);
    }
}
