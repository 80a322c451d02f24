//! Sliding-window request rate limiting
//!
//! Admits at most `max_requests` events in any trailing window of fixed
//! length. Over-budget callers are suspended (a cooperative await, no spin)
//! until the oldest retained request leaves the window; requests are never
//! dropped. This is a sliding window, not a token bucket: the budget applies
//! to every trailing interval, not to fixed buckets.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// TMDB publishes roughly 40 requests per 10 seconds per IP; stay below it
/// with some margin.
const DEFAULT_MAX_REQUESTS: usize = 35;
const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Slack added to the computed wait so the retried admission lands strictly
/// outside the window.
const EPSILON: Duration = Duration::from_millis(50);

/// Sliding-window admission control over outbound requests.
///
/// Owned exclusively by the client that embeds it; not shared between
/// flows of control.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    recent: VecDeque<Instant>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            recent: VecDeque::with_capacity(max_requests),
        }
    }

    /// Waits until the request budget allows one more request, then records
    /// it. Returns immediately when under budget; otherwise suspends for at
    /// most one window length.
    pub async fn admit(&mut self) {
        self.prune(Instant::now());
        if self.recent.len() >= self.max_requests {
            // Budget exhausted: wait until the oldest retained request
            // falls out of the trailing window.
            if let Some(oldest) = self.recent.front().copied() {
                let elapsed = Instant::now().duration_since(oldest);
                let wait = self.window.saturating_sub(elapsed) + EPSILON;
                debug!(wait_ms = wait.as_millis() as u64, "request budget exhausted, waiting");
                sleep(wait).await;
                self.prune(Instant::now());
            }
        }
        self.recent.push_back(Instant::now());
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.recent.front() {
            if now.duration_since(*front) >= self.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_under_budget_admissions_do_not_wait() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(10));

        let start = Instant::now();
        for _ in 0..3 {
            limiter.admit().await;
        }

        assert!(
            Instant::now().duration_since(start) < Duration::from_secs(1),
            "admissions inside the budget must not block"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_over_budget_admission_blocks_for_remaining_window() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(10));

        for _ in 0..3 {
            limiter.admit().await;
        }
        let before = Instant::now();
        limiter.admit().await;
        let waited = Instant::now().duration_since(before);

        assert!(
            waited >= Duration::from_secs(10),
            "fourth admission should wait out the window, waited {:?}",
            waited
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_frees_up_as_the_window_slides() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(10));

        limiter.admit().await;
        tokio::time::advance(Duration::from_secs(6)).await;
        limiter.admit().await;

        // First admission leaves the window after 4 more seconds; the next
        // one then only waits for that remainder, not a full window.
        let before = Instant::now();
        limiter.admit().await;
        let waited = Instant::now().duration_since(before);

        assert!(waited >= Duration::from_secs(4), "waited {:?}", waited);
        assert!(waited < Duration::from_secs(6), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_more_than_max_inside_any_window() {
        let window = Duration::from_secs(10);
        let mut limiter = RateLimiter::new(5, window);

        let mut admitted: Vec<Instant> = Vec::new();
        for _ in 0..12 {
            limiter.admit().await;
            admitted.push(Instant::now());
        }

        for (i, start) in admitted.iter().enumerate() {
            let inside = admitted[i..]
                .iter()
                .filter(|t| t.duration_since(*start) < window)
                .count();
            assert!(
                inside <= 5,
                "found {} admissions inside one sliding window",
                inside
            );
        }
    }
}
