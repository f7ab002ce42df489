//! Fixed-window start limiter: at most `limit` job starts per `interval`.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub(super) struct RateWindow {
    limit: usize,
    interval: Duration,
    window_start: Instant,
    started: usize,
}

impl RateWindow {
    pub(super) fn new(limit: usize, interval: Duration) -> Self {
        Self {
            limit: limit.max(1),
            interval,
            window_start: Instant::now(),
            started: 0,
        }
    }

    /// Wait until another start fits in the current window, then count it.
    pub(super) async fn acquire(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.interval {
            self.window_start = now;
            self.started = 0;
        }

        if self.started >= self.limit {
            let next_window = self.window_start + self.interval;
            tokio::time::sleep_until(next_window).await;
            self.window_start = next_window;
            self.started = 0;
        }

        self.started += 1;
    }
}
