use rand::{Rng, RngCore};
use std::time::Duration;

/// Exponential backoff for the given (zero-based) retry, capped at `max`.
pub(crate) fn exponential_backoff(initial: Duration, max: Duration, retry: usize) -> Duration {
    let factor = 1u32.checked_shl(retry.min(16) as u32).unwrap_or(u32::MAX);
    initial.saturating_mul(factor).min(max)
}

pub(crate) fn jittered_backoff(rng: &mut impl RngCore, backoff: Duration) -> Duration {
    let backoff_ms = backoff.as_millis() as u64;
    if backoff_ms <= 1 {
        return backoff;
    }

    // "Equal jitter": delay is in [backoff/2, backoff].
    let half_ms = backoff_ms / 2;
    let jitter_ms = rng.gen_range(0..=half_ms);
    Duration::from_millis(half_ms.saturating_add(jitter_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_exponential_backoff_caps() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_secs(1);
        assert_eq!(exponential_backoff(initial, max, 0), initial);
        assert_eq!(exponential_backoff(initial, max, 2), Duration::from_millis(400));
        assert_eq!(exponential_backoff(initial, max, 10), max);
        assert_eq!(exponential_backoff(initial, max, 1_000), max);
    }

    #[test]
    fn test_jittered_backoff_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let backoff = Duration::from_millis(200);
        for _ in 0..100 {
            let delay = jittered_backoff(&mut rng, backoff);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= backoff);
        }
        assert_eq!(jittered_backoff(&mut rng, Duration::ZERO), Duration::ZERO);
    }
}
