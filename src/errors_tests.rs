// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

#[cfg(test)]
mod tests {
    use crate::errors::{is_retryable_status, ResolveError, TrafficError};

    #[test]
    fn test_unexpected_object_count_names_kind_and_count() {
        let err = ResolveError::UnexpectedObjectCountFromSelector {
            kind: "CapacityTarget",
            selector: "helmsman-release=my-app-v2".to_string(),
            count: 0,
        };

        let text = err.to_string();
        assert!(text.contains("CapacityTarget"));
        assert!(text.contains("helmsman-release=my-app-v2"));
        assert!(text.contains("found 0"));
    }

    #[test]
    fn test_duplicate_traffic_target_names_both_objects() {
        let err = TrafficError::DuplicateTrafficTarget {
            release: "my-app-v2".to_string(),
            first: "my-app-v2".to_string(),
            second: "my-app-v2-copy".to_string(),
        };

        let text = err.to_string();
        assert!(text.contains("my-app-v2"));
        assert!(text.contains("my-app-v2-copy"));
    }

    #[test]
    fn test_configuration_errors_are_flagged() {
        let missing = TrafficError::MissingReleaseLabel {
            name: "tt".to_string(),
        };
        let duplicate = TrafficError::DuplicateTrafficTarget {
            release: "r".to_string(),
            first: "a".to_string(),
            second: "b".to_string(),
        };
        let short = TrafficError::FleetShortOfPods {
            release: "r".to_string(),
            missing: 3,
            idle: 1,
        };

        assert!(missing.is_configuration());
        assert!(duplicate.is_configuration());
        assert!(!short.is_configuration());
    }

    #[test]
    fn test_retryable_status_codes() {
        assert!(is_retryable_status(409)); // conflict
        assert!(is_retryable_status(429)); // rate limited
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));

        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(422));
        assert!(!is_retryable_status(200));
    }
}
