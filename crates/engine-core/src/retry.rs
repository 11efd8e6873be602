use async_trait::async_trait;
use std::time::Duration;

/// Sleeps for a given duration. Production code uses `RealClock`; tests use
/// `NullClock` so retry-path tests don't sit through minutes of real sleep
/// (spec §4.4: "implementations may shorten waits in test mode").
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

#[async_trait]
impl Clock for RealClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullClock;

#[async_trait]
impl Clock for NullClock {
    async fn sleep(&self, _duration: Duration) {}
}

/// Linear-by-attempt backoff: the delay before attempt `n` (1-based) is
/// `base_secs * n`. Deliberately not exponential — the engine is
/// batch-oriented and the remote stores' throttling windows sit on this
/// order of magnitude (spec §4.4).
#[derive(Debug, Clone, Copy)]
pub struct LinearBackoff {
    pub base_secs: u64,
    pub max_attempts: usize,
}

impl LinearBackoff {
    /// Fetch retry: `(i+1)*120s` for i ∈ {1,2,3}.
    pub const FETCH: LinearBackoff = LinearBackoff {
        base_secs: 120,
        max_attempts: 3,
    };

    /// Write retry (post-batch): `120*(i+1)s` for i ∈ {1,2,3}.
    pub const WRITE: LinearBackoff = LinearBackoff {
        base_secs: 120,
        max_attempts: 3,
    };

    /// Update retry (partitioned transactional update): `60*i` seconds.
    pub const UPDATE: LinearBackoff = LinearBackoff {
        base_secs: 60,
        max_attempts: 3,
    };

    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        Duration::from_secs(self.base_secs * attempt as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_backoff_matches_spec_literal_waits() {
        let backoff = LinearBackoff::FETCH;
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(120));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(240));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(360));
    }

    #[test]
    fn update_backoff_matches_spec_literal_waits() {
        let backoff = LinearBackoff::UPDATE;
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(60));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn null_clock_does_not_wait() {
        let started = tokio::time::Instant::now();
        NullClock.sleep(Duration::from_secs(120)).await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }
}
