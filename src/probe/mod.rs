//! Probe implementations.
//!
//! Every probe exposes the same capability: given an address (and its
//! provider), produce a [`ProbeOutcome`](crate::types::ProbeOutcome). The
//! strategy composes them in a per-provider order; the bounce probe is the
//! bulk variant and maps a whole batch to outcomes.

pub mod bounce;
pub mod browser;
pub mod microsoft;
pub mod smtp;

use rand::Rng;
use rand::distributions::Alphanumeric;
use std::time::Duration;

use crate::address::EmailAddress;
use crate::strategy::Provider;
use crate::types::ProbeOutcome;

/// Uniform probe capability used by the strategy.
pub trait Probe: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, address: &EmailAddress, provider: &Provider) -> ProbeOutcome;
}

/// Random lowercase alphanumeric local part for catch-all detection.
pub(crate) fn random_local_part(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .take(len.clamp(6, 32))
        .collect()
}

/// Retry backoff schedule for transient network errors: 2, 4, 8 seconds.
pub(crate) fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.clamp(1, 3))
}

/// Browser-like user agents rotated across HTTP and WebDriver sessions.
pub(crate) const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36 Edg/122.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15",
];

pub(crate) fn random_user_agent() -> &'static str {
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_local_part_respects_bounds() {
        let part = random_local_part(16);
        assert_eq!(part.len(), 16);
        assert!(part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_eq!(random_local_part(2).len(), 6);
        assert_eq!(random_local_part(100).len(), 32);
    }

    #[test]
    fn retry_backoff_doubles() {
        assert_eq!(retry_backoff(1), Duration::from_secs(2));
        assert_eq!(retry_backoff(2), Duration::from_secs(4));
        assert_eq!(retry_backoff(3), Duration::from_secs(8));
        assert_eq!(retry_backoff(9), Duration::from_secs(8));
    }
}
