//! Progress indicator for long-running external calls.
//!
//! [`with_progress`] runs the work future on the calling task and drives a
//! spinner on one auxiliary task. The spinner only reads a cancellation flag
//! and stops as soon as the flag flips or its sender goes away. The work's
//! typed result is handed straight back to the caller.

use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

const TICK: Duration = Duration::from_millis(100);

/// Run `work` while showing a spinner labelled `label`.
pub async fn with_progress<F, T>(label: &str, work: F) -> T
where
    F: Future<Output = T>,
{
    let (done_tx, done_rx) = watch::channel(false);
    let indicator = tokio::spawn(spin(label.to_string(), done_rx));

    let result = work.await;

    // A send error means the spinner already exited.
    let _ = done_tx.send(true);
    drop(done_tx);
    let _ = indicator.await;

    result
}

async fn spin(label: String, mut done: watch::Receiver<bool>) {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(label);

    let mut ticker = tokio::time::interval(TICK);
    loop {
        tokio::select! {
            _ = ticker.tick() => bar.tick(),
            changed = done.changed() => {
                if changed.is_err() || *done.borrow() {
                    break;
                }
            }
        }
    }
    bar.finish_and_clear();
}
