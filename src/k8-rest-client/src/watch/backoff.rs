use std::time::Duration;

use rand::Rng;

/// bounded exponential backoff with jitter for reconnect attempts
#[derive(Debug)]
pub(crate) struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub(crate) fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// delay for the next attempt; grows by powers of two up to the cap,
    /// with up to half the delay added as jitter
    pub(crate) fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);

        let scaled = self
            .base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max);
        let jitter = rand::thread_rng().gen_range(0..=scaled.as_millis() as u64 / 2);
        scaled + Duration::from_millis(jitter)
    }

    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod test {

    use std::time::Duration;

    use super::Backoff;

    #[test]
    fn test_backoff_growth_is_bounded() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));

        let first = backoff.next_delay();
        assert!(first >= Duration::from_millis(100));
        assert!(first <= Duration::from_millis(150));

        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay <= Duration::from_secs(15));
        }
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        assert!(backoff.next_delay() <= Duration::from_millis(150));
    }
}
