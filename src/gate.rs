//! Process-wide spacing of requests to the rate-limited profile host.
//!
//! The host sits behind IP-based abuse detection; bursts push later tiers
//! into authwalls for the rest of the run. One [`RateGate`] is built in
//! `main` and shared by handle with every orchestrator run.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub struct RateGate {
    next_allowed: Mutex<Instant>,
    min_delay: Duration,
}

impl RateGate {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            next_allowed: Mutex::new(Instant::now()),
            min_delay,
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Wait until the next request slot, then push the slot `min_delay` out.
    ///
    /// The lock is held across the sleep so that at most one waiter is
    /// released per window. Waiters queue in FIFO order on the mutex.
    pub async fn acquire(&self) {
        let mut next_allowed = self.next_allowed.lock().await;
        let now = Instant::now();
        if *next_allowed > now {
            let wait = *next_allowed - now;
            debug!(wait_ms = wait.as_millis() as u64, "rate gate holding caller");
            sleep_until(*next_allowed).await;
        }
        *next_allowed = Instant::now() + self.min_delay;
    }
}
