// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local request ceiling for outgoing WHOOP calls.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// WHOOP allows 100 requests per minute account-wide.
pub const DEFAULT_MAX_CALLS: usize = 100;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window limiter. Callers over the ceiling wait rather than fail.
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALLS, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            sent: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    /// Wait until a call may be sent, then record it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut sent = self.sent.lock().await;
                let now = Instant::now();
                while let Some(&oldest) = sent.front() {
                    if now.duration_since(oldest) >= self.window {
                        sent.pop_front();
                    } else {
                        break;
                    }
                }

                match sent.front() {
                    Some(&oldest) if sent.len() >= self.max_calls => {
                        self.window - now.duration_since(oldest)
                    }
                    _ => {
                        sent.push_back(now);
                        return;
                    }
                }
            };

            tracing::debug!(
                wait_ms = wait.as_millis() as u64,
                "Local rate ceiling reached, delaying request"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Calls recorded in the current window.
    pub async fn in_flight_window(&self) -> usize {
        let sent = self.sent.lock().await;
        let now = Instant::now();
        sent.iter()
            .filter(|&&at| now.duration_since(at) < self.window)
            .count()
    }
}
