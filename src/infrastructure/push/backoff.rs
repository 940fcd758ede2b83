use rand::Rng;
use std::time::Duration;

/// Retry delay parameters for a single push call
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    /// Fractional jitter applied to each delay, e.g. 0.2 for ±20%
    pub jitter: f64,
    /// Total time budget of one push call, retries included
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
            deadline: Duration::from_secs(30),
        }
    }
}

/// Exponential backoff: base, base*factor, ... capped at `max_delay`.
pub struct ExponentialBackoff {
    current_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: f64,
    retries: u32,
}

impl ExponentialBackoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            current_delay: policy.base_delay.min(policy.max_delay),
            max_delay: policy.max_delay,
            multiplier: policy.factor.max(1.0),
            jitter: policy.jitter.clamp(0.0, 1.0),
            retries: 0,
        }
    }

    /// Next capped delay, without jitter
    pub fn next_base_delay(&mut self) -> Duration {
        let delay = self.current_delay;
        self.current_delay = Duration::from_secs_f64(
            (self.current_delay.as_secs_f64() * self.multiplier).min(self.max_delay.as_secs_f64()),
        );
        self.retries += 1;
        delay
    }

    /// Next delay with jitter drawn from `rng`
    pub fn next_delay<R: Rng>(&mut self, rng: &mut R) -> Duration {
        let base = self.next_base_delay();
        apply_jitter(base, self.jitter, rng)
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }
}

/// Scale `delay` by a uniform factor in `[1 - fraction, 1 + fraction]`.
pub fn apply_jitter<R: Rng>(delay: Duration, fraction: f64, rng: &mut R) -> Duration {
    if fraction <= 0.0 || delay.is_zero() {
        return delay;
    }
    let factor = rng.random_range((1.0 - fraction)..=(1.0 + fraction));
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_default_sequence_doubles_and_caps() {
        let mut backoff = ExponentialBackoff::new(&RetryPolicy::default());
        let secs: Vec<u64> = (0..8).map(|_| backoff.next_base_delay().as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 30, 30, 30]);
        assert_eq!(backoff.retries(), 8);
    }

    #[test]
    fn test_jitter_stays_within_twenty_percent() {
        let mut rng = StdRng::seed_from_u64(7);
        let policy = RetryPolicy::default();
        let mut jittered = ExponentialBackoff::new(&policy);
        let mut plain = ExponentialBackoff::new(&policy);
        for _ in 0..10 {
            let base = plain.next_base_delay().as_secs_f64();
            let delay = jittered.next_delay(&mut rng).as_secs_f64();
            assert!(
                delay >= base * 0.8 - 1e-9 && delay <= base * 1.2 + 1e-9,
                "delay {} outside ±20% of {}",
                delay,
                base
            );
        }
    }

    #[test]
    fn test_jitter_is_reproducible_with_seed() {
        let policy = RetryPolicy::default();
        let mut a = ExponentialBackoff::new(&policy);
        let mut b = ExponentialBackoff::new(&policy);
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        for _ in 0..5 {
            assert_eq!(a.next_delay(&mut rng_a), b.next_delay(&mut rng_b));
        }
    }

    #[test]
    fn test_zero_jitter_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let d = Duration::from_millis(250);
        assert_eq!(apply_jitter(d, 0.0, &mut rng), d);
    }

    #[test]
    fn test_base_above_cap_is_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(60),
            ..RetryPolicy::default()
        };
        let mut backoff = ExponentialBackoff::new(&policy);
        assert_eq!(backoff.next_base_delay(), Duration::from_secs(30));
    }
}
