//! Passive provider health tracking based on real request outcomes, kept in
//! a rolling window so a provider that is recovering stops looking `down`
//! once fresh traffic succeeds.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use crate::error::LlmError;

const WINDOW_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Ok,
    Degraded,
    Down,
    RateLimited,
    Unknown,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Degraded => "degraded",
            Self::Down => "down",
            Self::RateLimited => "rate-limited",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealthEntry {
    pub name: String,
    pub status: ProviderStatus,
    pub last_success_at: Option<i64>,
    pub last_error_at: Option<i64>,
    pub last_error: Option<String>,
    pub avg_latency_ms: u64,
    pub requests_ok: u32,
    pub requests_err: u32,
    pub total_requests: u64,
}

struct InternalEntry {
    window: VecDeque<(Instant, bool, u64)>,
    last_success_at: Option<i64>,
    last_error_at: Option<i64>,
    last_error: Option<String>,
    total_requests: u64,
    rate_limited_until: Option<Instant>,
}

impl InternalEntry {
    fn new() -> Self {
        Self {
            window: VecDeque::new(),
            last_success_at: None,
            last_error_at: None,
            last_error: None,
            total_requests: 0,
            rate_limited_until: None,
        }
    }

    fn prune(&mut self) {
        let cutoff = Instant::now() - Duration::from_secs(WINDOW_SECS);
        while self.window.front().is_some_and(|(t, _, _)| *t < cutoff) {
            self.window.pop_front();
        }
    }

    fn derive_status(&self) -> ProviderStatus {
        if let Some(until) = self.rate_limited_until {
            if Instant::now() < until {
                return ProviderStatus::RateLimited;
            }
        }

        if self.window.is_empty() {
            return ProviderStatus::Unknown;
        }

        let total = self.window.len() as f64;
        let ok = self.window.iter().filter(|(_, ok, _)| *ok).count() as f64;
        let success_rate = ok / total;

        if success_rate > 0.8 {
            ProviderStatus::Ok
        } else if success_rate >= 0.5 {
            ProviderStatus::Degraded
        } else {
            ProviderStatus::Down
        }
    }

    fn avg_latency_ms(&self) -> u64 {
        if self.window.is_empty() {
            return 0;
        }
        let sum: u64 = self.window.iter().map(|(_, _, lat)| lat).sum();
        sum / self.window.len() as u64
    }

    fn requests_ok(&self) -> u32 {
        self.window.iter().filter(|(_, ok, _)| *ok).count() as u32
    }

    fn requests_err(&self) -> u32 {
        self.window.iter().filter(|(_, ok, _)| !*ok).count() as u32
    }

    fn to_entry(&self, name: &str) -> ProviderHealthEntry {
        ProviderHealthEntry {
            name: name.to_string(),
            status: self.derive_status(),
            last_success_at: self.last_success_at,
            last_error_at: self.last_error_at,
            last_error: self.last_error.clone(),
            avg_latency_ms: self.avg_latency_ms(),
            requests_ok: self.requests_ok(),
            requests_err: self.requests_err(),
            total_requests: self.total_requests,
        }
    }
}

/// Concurrent health state for every provider the router knows about.
pub struct HealthTracker {
    entries: DashMap<String, InternalEntry>,
}

impl HealthTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { entries: DashMap::new() })
    }

    pub fn record_success(&self, provider: &str, latency_ms: u64) {
        let mut entry = self.entries.entry(provider.to_string()).or_insert_with(InternalEntry::new);
        entry.prune();
        entry.window.push_back((Instant::now(), true, latency_ms));
        entry.last_success_at = Some(chrono::Utc::now().timestamp());
        entry.total_requests += 1;
        entry.rate_limited_until = None;
    }

    pub fn record_error(&self, provider: &str, error: &LlmError) {
        let mut entry = self.entries.entry(provider.to_string()).or_insert_with(InternalEntry::new);
        entry.prune();
        entry.window.push_back((Instant::now(), false, 0));
        entry.last_error_at = Some(chrono::Utc::now().timestamp());
        entry.last_error = Some(error.to_string());
        entry.total_requests += 1;

        if let LlmError::RateLimited { retry_after_ms } = error {
            entry.rate_limited_until = Some(Instant::now() + Duration::from_millis(*retry_after_ms));
        }
    }

    pub fn all_entries(&self) -> Vec<ProviderHealthEntry> {
        self.entries.iter().map(|e| e.value().to_entry(e.key())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_success_yields_ok_status() {
        let tracker = HealthTracker::new();
        for _ in 0..5 {
            tracker.record_success("p", 100);
        }
        let entries = tracker.all_entries();
        assert_eq!(entries[0].status, ProviderStatus::Ok);
        assert_eq!(entries[0].avg_latency_ms, 100);
    }

    #[test]
    fn mixed_traffic_derives_degraded() {
        let tracker = HealthTracker::new();
        for _ in 0..6 {
            tracker.record_success("p", 50);
        }
        for _ in 0..4 {
            tracker.record_error("p", &LlmError::Unavailable("x".into()));
        }
        assert_eq!(tracker.all_entries()[0].status, ProviderStatus::Degraded);
    }

    #[test]
    fn all_failures_derive_down() {
        let tracker = HealthTracker::new();
        for _ in 0..10 {
            tracker.record_error("p", &LlmError::Unavailable("x".into()));
        }
        assert_eq!(tracker.all_entries()[0].status, ProviderStatus::Down);
    }

    #[test]
    fn rate_limited_overrides_until_it_expires() {
        let tracker = HealthTracker::new();
        tracker.record_success("p", 10);
        tracker.record_error("p", &LlmError::RateLimited { retry_after_ms: 100_000 });
        assert_eq!(tracker.all_entries()[0].status, ProviderStatus::RateLimited);
    }

    #[test]
    fn unknown_provider_has_no_entries() {
        let tracker = HealthTracker::new();
        assert!(tracker.all_entries().is_empty());
    }
}
