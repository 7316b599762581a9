//! Keyed rate limiting with exponential backoff and hard lockout.
//!
//! The guard protects the verification-code flow from enumeration and
//! flooding. Every request is gated on two identifiers at once, the
//! caller's origin and the target address, and both must pass. The two
//! checks are always evaluated together and a denial charges neither
//! budget, so a denied response leaks nothing about which identifier
//! tripped.

pub mod error;

pub use error::Deny;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing;

/// Guard tuning. Deserialized from the server config file.
#[derive(Debug, Clone, Deserialize)]
pub struct GuardConfig {
    /// Sliding window length for request counting.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Maximum allowed requests per key within the window.
    #[serde(default = "default_max_in_window")]
    pub max_in_window: u32,
    /// Base delay after the first verification failure; doubles per
    /// consecutive failure.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    /// Upper bound on the backoff delay.
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
    /// Consecutive failures that trigger a hard lockout.
    #[serde(default = "default_lockout_threshold")]
    pub lockout_threshold: u32,
    /// Lockout duration once the threshold is reached.
    #[serde(default = "default_lockout_secs")]
    pub lockout_secs: u64,
}

fn default_window_secs() -> u64 {
    300
}

fn default_max_in_window() -> u32 {
    5
}

fn default_backoff_base_secs() -> u64 {
    2
}

fn default_backoff_cap_secs() -> u64 {
    300
}

fn default_lockout_threshold() -> u32 {
    10
}

fn default_lockout_secs() -> u64 {
    3600
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_in_window: default_max_in_window(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
            lockout_threshold: default_lockout_threshold(),
            lockout_secs: default_lockout_secs(),
        }
    }
}

#[derive(Debug, Default)]
struct KeyState {
    hits: VecDeque<DateTime<Utc>>,
    failures: u32,
    last_failure: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
}

/// In-memory keyed rate limiter.
///
/// State is per process; a restart clears it. That is acceptable for
/// the verification-code flow, where the worst case after a restart is
/// one extra burst within the window.
pub struct RateLimitGuard {
    cfg: GuardConfig,
    entries: Mutex<HashMap<String, KeyState>>,
}

impl RateLimitGuard {
    pub fn new(cfg: GuardConfig) -> Self {
        Self {
            cfg,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Gates one request on `key`, charging its budget when allowed.
    pub fn check(&self, key: &str) -> Result<(), Deny> {
        self.check_at(key, Utc::now())
    }

    /// Clock-injected variant of [`check`](Self::check).
    pub fn check_at(&self, key: &str, now: DateTime<Utc>) -> Result<(), Deny> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let state = entries.entry(key.to_string()).or_default();
        self.evaluate(state, now)?;
        state.hits.push_back(now);
        Ok(())
    }

    /// Gates one request on two identifiers at once; both must pass.
    ///
    /// Neither budget is charged unless both checks allow, and both are
    /// always evaluated, so the response does not reveal which
    /// identifier is throttled. On a double denial the longer wait is
    /// reported.
    pub fn check_pair(&self, key_a: &str, key_b: &str) -> Result<(), Deny> {
        self.check_pair_at(key_a, key_b, Utc::now())
    }

    /// Clock-injected variant of [`check_pair`](Self::check_pair).
    pub fn check_pair_at(
        &self,
        key_a: &str,
        key_b: &str,
        now: DateTime<Utc>,
    ) -> Result<(), Deny> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let verdict_a = self.evaluate(entries.entry(key_a.to_string()).or_default(), now);
        let verdict_b = self.evaluate(entries.entry(key_b.to_string()).or_default(), now);

        match (verdict_a, verdict_b) {
            (Ok(()), Ok(())) => {
                if let Some(state) = entries.get_mut(key_a) {
                    state.hits.push_back(now);
                }
                if let Some(state) = entries.get_mut(key_b) {
                    state.hits.push_back(now);
                }
                Ok(())
            }
            (Err(a), Err(b)) => Err(if a.retry_after_secs() >= b.retry_after_secs() {
                a
            } else {
                b
            }),
            (Err(deny), Ok(())) | (Ok(()), Err(deny)) => Err(deny),
        }
    }

    /// Records a verification failure against `key`, escalating the
    /// backoff and, past the threshold, locking the key out.
    pub fn record_failure(&self, key: &str) {
        self.record_failure_at(key, Utc::now());
    }

    pub fn record_failure_at(&self, key: &str, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let state = entries.entry(key.to_string()).or_default();
        state.failures += 1;
        state.last_failure = Some(now);
        if state.failures >= self.cfg.lockout_threshold {
            let until = now + Duration::seconds(self.cfg.lockout_secs as i64);
            state.locked_until = Some(until);
            tracing::warn!(key, failures = state.failures, until = %until, "Key locked out");
        }
    }

    /// Clears the failure streak for `key` after a successful
    /// verification. Window hits are kept; success does not refund
    /// request budget.
    pub fn clear_failures(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = entries.get_mut(key) {
            state.failures = 0;
            state.last_failure = None;
            state.locked_until = None;
        }
    }

    /// Drops keys with no live window hits, no failure streak, and no
    /// active lockout. Called periodically by the server.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let window = Duration::seconds(self.cfg.window_secs as i64);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, state| {
            while let Some(front) = state.hits.front() {
                if now - *front > window {
                    state.hits.pop_front();
                } else {
                    break;
                }
            }
            !state.hits.is_empty()
                || state.failures > 0
                || state.locked_until.is_some_and(|until| until > now)
        });
    }

    fn evaluate(&self, state: &mut KeyState, now: DateTime<Utc>) -> Result<(), Deny> {
        if let Some(until) = state.locked_until {
            if until > now {
                return Err(Deny::Locked {
                    retry_after_secs: (until - now).num_seconds().max(1),
                });
            }
            state.locked_until = None;
        }

        if let Some(last) = state.last_failure {
            if state.failures > 0 {
                let exp = state.failures.saturating_sub(1).min(31);
                let delay = self
                    .cfg
                    .backoff_base_secs
                    .saturating_mul(1u64 << exp)
                    .min(self.cfg.backoff_cap_secs);
                let ready = last + Duration::seconds(delay as i64);
                if ready > now {
                    return Err(Deny::Backoff {
                        retry_after_secs: (ready - now).num_seconds().max(1),
                    });
                }
            }
        }

        let window = Duration::seconds(self.cfg.window_secs as i64);
        while let Some(front) = state.hits.front() {
            if now - *front > window {
                state.hits.pop_front();
            } else {
                break;
            }
        }
        if state.hits.len() >= self.cfg.max_in_window as usize {
            // Oldest hit leaving the window frees the next slot.
            let retry_after = state
                .hits
                .front()
                .map(|front| (*front + window - now).num_seconds().max(1))
                .unwrap_or(1);
            return Err(Deny::WindowExceeded {
                retry_after_secs: retry_after,
            });
        }
        Ok(())
    }
}
