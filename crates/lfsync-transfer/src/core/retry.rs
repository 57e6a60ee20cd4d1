use std::time::Duration;

/// How long to wait before re-authorization `round` (zero-based).
///
/// Each round waits twice as long as the one before it, starting at `base`.
/// Huge rounds clamp instead of overflowing.
///
/// ```
/// use std::time::Duration;
/// use lfsync_transfer::retry_delay;
///
/// let base = Duration::from_millis(100);
/// assert_eq!(retry_delay(0, base), base);
/// assert_eq!(retry_delay(3, base), Duration::from_millis(800));
/// ```
pub fn retry_delay(round: u32, base: Duration) -> Duration {
    let factor = 1_u32.checked_shl(round).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles() {
        let base = Duration::from_millis(10);
        let delays: Vec<Duration> = (0..5).map(|i| retry_delay(i, base)).collect();
        for pair in delays.windows(2) {
            assert_eq!(pair[1], pair[0] * 2);
        }
    }

    #[test]
    fn test_retry_delay_zero_base() {
        assert_eq!(retry_delay(10, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_retry_delay_clamps_large_rounds() {
        assert_eq!(retry_delay(40, Duration::from_secs(1)), Duration::from_secs(u64::from(u32::MAX)));
        assert_eq!(retry_delay(40, Duration::MAX), Duration::MAX);
    }
}
