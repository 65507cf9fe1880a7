//! Retry backoff
//!
//! `min(base * 2^retry, max)` seconds with ±10% symmetric jitter, returned
//! in milliseconds. Jitter keeps a burst of failed entries from hammering
//! the regulator in lockstep once the outage clears.

use rand::Rng;

/// Millisecond delay before the next attempt of a retryable entry.
pub fn calculate_backoff(retry_count: u32, base_secs: u64, max_secs: u64) -> u64 {
    let exp_secs = base_secs
        .saturating_mul(2u64.saturating_pow(retry_count))
        .min(max_secs);
    let base_ms = exp_secs.saturating_mul(1000);

    if base_ms == 0 {
        return 0;
    }

    let factor: f64 = rand::thread_rng().gen_range(0.9..=1.1);
    (base_ms as f64 * factor) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_retry_is_near_base() {
        for _ in 0..50 {
            let delay = calculate_backoff(0, 60, 3600);
            assert!((54_000..=66_000).contains(&delay), "delay {delay}");
        }
    }

    #[test]
    fn deep_retry_is_capped_at_max() {
        for _ in 0..50 {
            let delay = calculate_backoff(10, 60, 3600);
            assert!((3_240_000..=3_960_000).contains(&delay), "delay {delay}");
        }
    }

    #[test]
    fn expectation_is_non_decreasing_in_retry_count() {
        // Jitter is ±10%, so comparing the jitter-free midpoints is enough.
        let midpoint = |n: u32| 60u64.saturating_mul(2u64.saturating_pow(n)).min(3600) * 1000;
        for n in 0..20 {
            assert!(midpoint(n) <= midpoint(n + 1));
        }
    }

    #[test]
    fn huge_retry_count_does_not_overflow() {
        let delay = calculate_backoff(u32::MAX, 60, 3600);
        assert!((3_240_000..=3_960_000).contains(&delay));
    }

    #[test]
    fn zero_base_short_circuits() {
        assert_eq!(calculate_backoff(3, 0, 3600), 0);
    }
}
