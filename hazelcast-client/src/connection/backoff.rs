//! Exponential backoff between cluster connection attempts.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::config::RetryConfig;

/// Scales `duration` by `factor`, capped at `max` before converting back so
/// large products cannot overflow.
fn scale_capped(duration: Duration, factor: f64, max: Duration) -> Duration {
    let seconds = duration.as_secs_f64() * factor;
    if !seconds.is_finite() || seconds >= max.as_secs_f64() {
        max
    } else {
        Duration::from_secs_f64(seconds.max(0.0))
    }
}

/// Applies the jitter to `current`, capped at `max_backoff`.
fn calculate_backoff_with_jitter(current: Duration, max_backoff: Duration, jitter: f64) -> Duration {
    let jitter_factor = if jitter > 0.0 {
        let mut rng = rand::thread_rng();
        1.0 + rng.gen_range(-jitter..=jitter)
    } else {
        1.0
    };

    scale_capped(current, jitter_factor, max_backoff)
}

/// Paces the attempts made against one cluster.
///
/// Each call to [`WaitStrategy::sleep`] waits for the current backoff and
/// then grows it by the multiplier. Once the cluster-connect timeout has
/// elapsed no further waits are granted.
#[derive(Debug)]
pub(crate) struct WaitStrategy {
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    jitter: f64,
    cluster_connect_timeout: Option<Duration>,
    current_backoff: Duration,
    attempt: u32,
    deadline: Option<Instant>,
}

impl WaitStrategy {
    pub(crate) fn new(config: &RetryConfig) -> Self {
        let mut strategy = Self {
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
            multiplier: config.multiplier(),
            jitter: config.jitter(),
            cluster_connect_timeout: config.cluster_connect_timeout(),
            current_backoff: config.initial_backoff(),
            attempt: 0,
            deadline: None,
        };
        strategy.reset();
        strategy
    }

    /// Restarts the backoff sequence and the cluster-connect deadline.
    pub(crate) fn reset(&mut self) {
        self.current_backoff = self.initial_backoff;
        self.attempt = 0;
        // An overflowing deadline is as good as none.
        self.deadline = self
            .cluster_connect_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
    }

    /// Number of waits granted since the last reset.
    #[cfg(test)]
    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the next delay, or `None` once the deadline has passed.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        let mut delay =
            calculate_backoff_with_jitter(self.current_backoff, self.max_backoff, self.jitter);

        if let Some(deadline) = self.deadline {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            delay = delay.min(deadline - now);
        }

        self.attempt += 1;
        self.current_backoff = scale_capped(self.current_backoff, self.multiplier, self.max_backoff);
        Some(delay)
    }

    /// Sleeps for the next delay. Returns false if the deadline has passed.
    pub(crate) async fn sleep(&mut self) -> bool {
        match self.next_delay() {
            Some(delay) => {
                tracing::debug!(
                    attempt = self.attempt,
                    delay = ?delay,
                    "waiting before next cluster connection attempt"
                );
                tokio::time::sleep(delay).await;
                true
            }
            None => false,
        }
    }
}
