use std::time::Duration;

/// Retry schedule from §4.1 / Design Notes: backoff = 2·2ⁿ seconds for
/// attempt n (1-indexed), capped by `MAX_RETRIES = 4` (so 5 total attempts).
pub const MAX_RETRIES: u64 = 4;

pub fn backoff(attempt: u64) -> Duration {
    let secs = 2u64.saturating_mul(1u64 << attempt.min(16));
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_two_seconds() {
        assert_eq!(backoff(0), Duration::from_secs(2));
        assert_eq!(backoff(1), Duration::from_secs(4));
        assert_eq!(backoff(2), Duration::from_secs(8));
    }
}
