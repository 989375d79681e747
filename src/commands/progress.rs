// src/commands/progress.rs
//! Progress bars for long package runs
//!
//! Shows an overall bar over the package list with the current phase as
//! its message. When stderr is not a terminal progress goes to the log.

use debslim::{LogProgress, ProgressTracker};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

/// indicatif-backed tracker
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub fn new(total: u64, operation: &str) -> Self {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {prefix} ({pos}/{len}) [{bar:40.green/dim}] {wide_msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
        bar.set_style(style);
        bar.set_prefix(operation.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl ProgressTracker for CliProgress {
    fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn increment(&self, amount: u64) {
        self.bar.inc(amount);
    }

    fn position(&self) -> u64 {
        self.bar.position()
    }

    fn finish_with_message(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// A progress bar on a terminal, log lines otherwise
pub fn tracker(total: u64, operation: &str) -> Arc<dyn ProgressTracker> {
    if std::io::stderr().is_terminal() {
        Arc::new(CliProgress::new(total, operation))
    } else {
        Arc::new(LogProgress::new(operation, total))
    }
}
