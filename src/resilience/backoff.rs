//! Exponential backoff with jitter between connection attempts.

use std::time::Duration;
use rand::Rng;

/// Delay before connection attempt `attempt` (1-based; the first attempt waits 0).
pub fn retry_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt <= 1 || base_ms == 0 {
        return Duration::ZERO;
    }

    let doublings = attempt - 2;
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(doublings));
    let capped = delay_ms.min(max_ms);

    // Up to 10% extra
    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_is_immediate() {
        assert_eq!(retry_delay(0, 100, 1000), Duration::ZERO);
        assert_eq!(retry_delay(1, 100, 1000), Duration::ZERO);
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let second = retry_delay(2, 100, 1000);
        assert!(second >= Duration::from_millis(100) && second < Duration::from_millis(110));

        let third = retry_delay(3, 100, 1000);
        assert!(third >= Duration::from_millis(200) && third < Duration::from_millis(220));

        let capped = retry_delay(20, 100, 1000);
        assert!(capped >= Duration::from_millis(1000) && capped < Duration::from_millis(1100));
    }

    #[test]
    fn test_zero_base_disables_delay() {
        assert_eq!(retry_delay(3, 0, 1000), Duration::ZERO);
    }
}
