// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `backoff.rs`

#[cfg(test)]
mod tests {
    use super::super::backoff::ItemBackoff;
    use std::time::Duration;

    fn assert_close_to(delay: Duration, expected: Duration) {
        // Delays carry ±10% jitter.
        let lower = expected.mul_f64(0.89);
        let upper = expected.mul_f64(1.11);
        assert!(
            delay >= lower && delay <= upper,
            "delay {delay:?} outside [{lower:?}, {upper:?}]",
        );
    }

    #[test]
    fn test_delay_doubles_per_consecutive_failure() {
        let backoff = ItemBackoff::new(Duration::from_millis(5), Duration::from_secs(1000));

        assert_close_to(backoff.next_delay("ns/r"), Duration::from_millis(5));
        assert_close_to(backoff.next_delay("ns/r"), Duration::from_millis(10));
        assert_close_to(backoff.next_delay("ns/r"), Duration::from_millis(20));
        assert_close_to(backoff.next_delay("ns/r"), Duration::from_millis(40));
    }

    #[test]
    fn test_keys_are_tracked_independently() {
        let backoff = ItemBackoff::new(Duration::from_millis(5), Duration::from_secs(1000));

        backoff.next_delay("ns/a");
        backoff.next_delay("ns/a");
        backoff.next_delay("ns/a");

        // A fresh key starts from the initial delay.
        assert_close_to(backoff.next_delay("ns/b"), Duration::from_millis(5));
    }

    #[test]
    fn test_delay_is_capped() {
        let backoff = ItemBackoff::new(Duration::from_millis(5), Duration::from_secs(1000));

        for _ in 0..40 {
            backoff.next_delay("ns/r");
        }
        let delay = backoff.next_delay("ns/r");
        assert!(delay <= Duration::from_secs(1000).mul_f64(1.11));
        assert!(delay >= Duration::from_secs(1000).mul_f64(0.89));
    }

    #[test]
    fn test_forget_resets_the_key() {
        let backoff = ItemBackoff::new(Duration::from_millis(5), Duration::from_secs(1000));

        backoff.next_delay("ns/r");
        backoff.next_delay("ns/r");
        backoff.forget("ns/r");

        assert_close_to(backoff.next_delay("ns/r"), Duration::from_millis(5));
    }
}
