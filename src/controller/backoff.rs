// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Per-key exponential backoff for the work queues.
//!
//! Failed reconciles re-enter the queue with a delay that doubles per
//! consecutive failure of the same key, from 5ms up to a 1000s cap, with
//! ±10% jitter to prevent thundering herd. A successful reconcile forgets
//! the key, resetting its delay.

use crate::constants::{BACKOFF_INITIAL_MILLIS, BACKOFF_JITTER_FACTOR, BACKOFF_MAX_SECS};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Tracks consecutive failures per queue key.
#[derive(Debug)]
pub struct ItemBackoff {
    initial: Duration,
    max: Duration,
    attempts: Mutex<HashMap<String, u32>>,
}

impl Default for ItemBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(BACKOFF_INITIAL_MILLIS),
            Duration::from_secs(BACKOFF_MAX_SECS),
        )
    }
}

impl ItemBackoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Delay before the next retry of `key`, advancing its failure count.
    pub fn next_delay(&self, key: &str) -> Duration {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
            let entry = attempts.entry(key.to_string()).or_insert(0);
            let attempt = *entry;
            *entry = entry.saturating_add(1);
            attempt
        };

        let delay = if attempt >= 31 {
            self.max
        } else {
            self.initial.saturating_mul(1 << attempt).min(self.max)
        };
        jitter(delay)
    }

    /// Reset the failure count of `key` after a successful reconcile.
    pub fn forget(&self, key: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}

fn jitter(delay: Duration) -> Duration {
    let factor = 1.0 + BACKOFF_JITTER_FACTOR * (2.0 * rand::random::<f64>() - 1.0);
    delay.mul_f64(factor)
}
