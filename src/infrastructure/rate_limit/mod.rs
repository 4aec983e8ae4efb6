// src/infrastructure/rate_limit/mod.rs
// Outbound request budget shared by every exchange call

use std::collections::VecDeque;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Snapshot of the current window
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitBudget {
    pub window_start: Option<Instant>,
    pub calls_used: u32,
    pub window_capacity: u32,
}

/// Proof that a call was admitted
#[derive(Debug, Clone, Copy)]
pub struct RatePermit {
    pub sequence: u64,
    pub granted_at: Instant,
}

#[derive(Debug, Default)]
struct LimiterState {
    /// Grant times inside the current sliding window
    grants: VecDeque<Instant>,
    last_grant: Option<Instant>,
    issued: u64,
}

/// Sliding-window limiter: at most `capacity` permits in any `window`,
/// optionally spaced by `min_interval`. Callers over budget wait, they are
/// never refused.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: Option<u32>,
    window: Duration,
    min_interval: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            window,
            min_interval: Duration::ZERO,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// No budget at all; only `min_interval` spacing, if set, applies
    pub fn unlimited() -> Self {
        Self {
            capacity: None,
            window: Duration::ZERO,
            min_interval: Duration::ZERO,
            state: Mutex::new(LimiterState::default()),
        }
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Wait until a call fits in the budget, then take a slot
    pub async fn acquire(&self) -> RatePermit {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                match self.wait_time(&mut state, now) {
                    None => {
                        if self.capacity.is_some() {
                            state.grants.push_back(now);
                        }
                        state.last_grant = Some(now);
                        state.issued += 1;
                        return RatePermit {
                            sequence: state.issued,
                            granted_at: now,
                        };
                    }
                    Some(wait) => wait,
                }
            };

            log::debug!("Rate limit reached, waiting {:?}", wait);
            sleep(wait).await;
        }
    }

    pub async fn budget(&self) -> RateLimitBudget {
        let mut state = self.state.lock().await;
        self.evict_expired(&mut state, Instant::now());
        RateLimitBudget {
            window_start: state.grants.front().copied(),
            calls_used: state.grants.len() as u32,
            window_capacity: self.capacity.unwrap_or(u32::MAX),
        }
    }

    fn wait_time(&self, state: &mut LimiterState, now: Instant) -> Option<Duration> {
        let mut wait = Duration::ZERO;

        if let Some(last) = state.last_grant {
            let ready_at = last + self.min_interval;
            if ready_at > now {
                wait = ready_at - now;
            }
        }

        if let Some(capacity) = self.capacity {
            self.evict_expired(state, now);
            if state.grants.len() >= capacity as usize {
                if let Some(oldest) = state.grants.front() {
                    wait = wait.max(*oldest + self.window - now);
                }
            }
        }

        if wait.is_zero() {
            None
        } else {
            Some(wait)
        }
    }

    fn evict_expired(&self, state: &mut LimiterState, now: Instant) {
        while state
            .grants
            .front()
            .is_some_and(|&t| now.duration_since(t) >= self.window)
        {
            state.grants.pop_front();
        }
    }
}
