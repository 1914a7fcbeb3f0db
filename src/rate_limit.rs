//! Per-user sliding-window request limiter.

use crate::transport::UserId;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Timestamps of one user's recent requests, oldest first.
#[derive(Debug, Default)]
struct Window {
    hits: VecDeque<Instant>,
}

impl Window {
    fn evict(&mut self, now: Instant, span: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.duration_since(oldest) >= span {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Allows at most `max` requests per user within any trailing `window`.
///
/// Each check-and-record is one critical section, so concurrent requests
/// from the same user cannot slip past the cap.
#[derive(Debug)]
pub struct RateLimiter {
    max: usize,
    window: Duration,
    windows: Mutex<HashMap<UserId, Window>>,
}

impl RateLimiter {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            max,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `user` if the cap allows it.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn allowed(&self, user: UserId) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let window = windows.entry(user).or_default();
        window.evict(now, self.window);

        if window.hits.len() < self.max {
            window.hits.push_back(now);
            true
        } else {
            tracing::debug!(
                user = %user,
                hits = window.hits.len(),
                "Rate limit reached"
            );
            false
        }
    }

    /// Requests `user` may still make in the current window.
    pub async fn remaining(&self, user: UserId) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        match windows.get_mut(&user) {
            Some(window) => {
                window.evict(now, self.window);
                self.max.saturating_sub(window.hits.len())
            }
            None => self.max,
        }
    }

    /// Forget users whose window has emptied. Returns how many were dropped.
    pub async fn purge_idle(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| {
            w.evict(now, self.window);
            !w.hits.is_empty()
        });
        before - windows.len()
    }
}
