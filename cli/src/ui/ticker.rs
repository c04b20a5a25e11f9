//! Once-a-second status line shown while waiting for the user.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::auth::PollInterval;

const REDRAW_EVERY: Duration = Duration::from_secs(1);

/// Progress display running on its own task.
///
/// Reads the poll interval but never writes it.
pub struct Ticker {
    bar: ProgressBar,
    task: JoinHandle<()>,
}

impl Ticker {
    /// Starts redrawing on stderr. Must be called inside a Tokio runtime.
    pub fn start(poll_interval: PollInterval) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        let task = {
            let bar = bar.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let mut redraw = interval(REDRAW_EVERY);
                redraw.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    redraw.tick().await;
                    bar.set_message(status_line(started.elapsed(), poll_interval.get()));
                    bar.tick();
                }
            })
        };

        Self { bar, task }
    }

    /// Prints `line` above the status line.
    pub fn println(&self, line: &str) {
        self.bar.println(line);
    }

    /// Stops redrawing and erases the status line.
    pub fn stop(self) {
        self.task.abort();
        self.bar.finish_and_clear();
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn status_line(elapsed: Duration, poll_interval: Duration) -> String {
    format!(
        "Waiting for authorization... {}s elapsed, polling every {:.1}s",
        elapsed.as_secs(),
        poll_interval.as_secs_f64()
    )
}
