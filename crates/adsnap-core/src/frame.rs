//! Frame pacing between normalization and capture.

use std::time::Duration;

use async_trait::async_trait;

/// Resolves once the next frame has been laid out.
#[async_trait]
pub trait FrameClock: Send + Sync {
    async fn next_frame(&self);
}

/// Waits a fixed interval per frame (16 ms is one frame at 60 Hz).
#[derive(Debug, Clone, Copy)]
pub struct IntervalClock {
    interval: Duration,
}

impl IntervalClock {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for IntervalClock {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

#[async_trait]
impl FrameClock for IntervalClock {
    async fn next_frame(&self) {
        if self.interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.interval).await;
        }
    }
}
