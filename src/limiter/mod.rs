//! Per-domain sliding-window rate limiting with explicit backoff.
//!
//! A domain is limited when it sits inside an explicit backoff interval or
//! when `max_requests` requests were recorded within the rolling window.
//! Probes call [`RateLimiter::acquire`] before touching a domain: it sleeps
//! out the limitation, then records the request.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct DomainEntry {
    hits: VecDeque<Instant>,
    backoff_until: Option<Instant>,
}

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    domains: Mutex<HashMap<String, DomainEntry>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            domains: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_limited(&self, domain: &str) -> bool {
        let now = Instant::now();
        let mut domains = self.domains.lock();
        let Some(entry) = domains.get_mut(domain) else {
            return false;
        };

        if let Some(until) = entry.backoff_until {
            if now < until {
                return true;
            }
            entry.backoff_until = None;
        }

        Self::expire(entry, now, self.window);
        entry.hits.len() >= self.max_requests
    }

    pub fn record(&self, domain: &str) {
        let now = Instant::now();
        let mut domains = self.domains.lock();
        let entry = domains.entry(domain.to_string()).or_default();
        Self::expire(entry, now, self.window);
        entry.hits.push_back(now);
    }

    pub fn set_backoff(&self, domain: &str, backoff: Duration) {
        let until = Instant::now() + backoff;
        let mut domains = self.domains.lock();
        let entry = domains.entry(domain.to_string()).or_default();
        entry.backoff_until = Some(until);
    }

    /// Time the caller must wait before the domain stops being limited. Covers
    /// both the explicit backoff and the saturated window (time until the
    /// oldest recorded request leaves it).
    pub fn remaining_backoff(&self, domain: &str) -> Duration {
        let now = Instant::now();
        let mut domains = self.domains.lock();
        let Some(entry) = domains.get_mut(domain) else {
            return Duration::ZERO;
        };

        let mut wait = Duration::ZERO;
        if let Some(until) = entry.backoff_until {
            if until > now {
                wait = until - now;
            }
        }

        Self::expire(entry, now, self.window);
        if entry.hits.len() >= self.max_requests {
            if let Some(oldest) = entry.hits.front() {
                let window_wait = (*oldest + self.window).saturating_duration_since(now);
                wait = wait.max(window_wait);
            }
        }
        wait
    }

    /// Block until the domain is no longer limited, then record the request.
    pub fn acquire(&self, domain: &str) {
        loop {
            if !self.is_limited(domain) {
                break;
            }
            let wait = self.remaining_backoff(domain);
            debug!(target: "limiter", %domain, ?wait, "rate limited, sleeping");
            std::thread::sleep(wait.max(Duration::from_millis(10)));
        }
        self.record(domain);
    }

    fn expire(entry: &mut DomainEntry, now: Instant, window: Duration) {
        while let Some(front) = entry.hits.front() {
            if now.duration_since(*front) < window {
                break;
            }
            entry.hits.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_domain_is_not_limited() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(!limiter.is_limited("example.com"));
        assert_eq!(limiter.remaining_backoff("example.com"), Duration::ZERO);
    }

    #[test]
    fn window_saturation_limits_the_domain() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        limiter.record("example.com");
        assert!(!limiter.is_limited("example.com"));
        limiter.record("example.com");
        assert!(limiter.is_limited("example.com"));
        assert!(limiter.remaining_backoff("example.com") > Duration::ZERO);
        assert!(!limiter.is_limited("other.example"));
    }

    #[test]
    fn window_entries_expire() {
        let limiter = RateLimiter::new(1, Duration::from_millis(30));
        limiter.record("example.com");
        assert!(limiter.is_limited("example.com"));
        std::thread::sleep(Duration::from_millis(50));
        assert!(!limiter.is_limited("example.com"));
    }

    #[test]
    fn explicit_backoff_trumps_an_empty_window() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        limiter.set_backoff("example.com", Duration::from_millis(40));
        assert!(limiter.is_limited("example.com"));
        assert!(limiter.remaining_backoff("example.com") > Duration::ZERO);
        std::thread::sleep(Duration::from_millis(60));
        assert!(!limiter.is_limited("example.com"));
    }

    #[test]
    fn acquire_records_after_waiting() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        limiter.acquire("example.com");
        // Second acquire has to wait out the window but must succeed.
        limiter.acquire("example.com");
        assert!(limiter.is_limited("example.com"));
    }
}
