//! Outbound request rate limiting
//!
//! Allows at most `limit` request issuances per window (100ms by default).
//! A window opens with the first issuance after the previous one elapsed.
//! Once the window is used up, callers sleep for a fixed backoff and try
//! again.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Default length of a throttle window
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(100);

/// Default sleep between attempts once the window is exhausted
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// Requests issued in the current window
#[derive(Debug)]
struct ThrottleState {
    count: u32,
    window_start: Instant,
}

/// Bounds how many requests may be issued per window
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    backoff: Duration,
    state: Mutex<ThrottleState>,
}

impl RateLimiter {
    /// Creates a limiter allowing `limit` requests per 100ms window
    pub fn new(limit: u32) -> Self {
        Self::with_window(limit, DEFAULT_WINDOW, DEFAULT_BACKOFF)
    }

    /// Creates a limiter with a custom window and backoff
    ///
    /// A `limit` of zero is raised to one, otherwise `acquire` could never return.
    pub fn with_window(limit: u32, window: Duration, backoff: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            backoff,
            state: Mutex::new(ThrottleState {
                count: 0,
                window_start: Instant::now(),
            }),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Waits until a request may be issued, then counts it
    pub async fn acquire(&self) {
        loop {
            {
                let mut state = self.state.lock().await;
                if state.window_start.elapsed() > self.window {
                    state.count = 0;
                    state.window_start = Instant::now();
                }
                if state.count < self.limit {
                    state.count += 1;
                    return;
                }
            }

            tracing::debug!("Rate limit reached, backing off for {:?}", self.backoff);
            sleep(self.backoff).await;
        }
    }
}
