//! Per-provider health tracking.
//!
//! Providers start healthy. After `failure_threshold` consecutive failures a
//! provider is demoted and skipped by hybrid fan-out. Once `cooldown` has
//! passed since the last failure one probe call is let through; its success
//! restores the provider, its failure demotes it again.

use parking_lot::Mutex;
use search_core::Source;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Demoted,
    /// A single call is in flight after the cooldown.
    Probing,
}

#[derive(Debug, Clone)]
struct Entry {
    state: HealthState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    probe_started_at: Option<Instant>,
}

impl Default for Entry {
    fn default() -> Self {
        Self { state: HealthState::Healthy, consecutive_failures: 0, last_failure_at: None, probe_started_at: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderReport {
    pub source: Source,
    pub state: HealthState,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
pub struct ProviderHealth {
    failure_threshold: u32,
    cooldown: Duration,
    entries: Mutex<BTreeMap<Source, Entry>>,
}

impl ProviderHealth {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self { failure_threshold, cooldown, entries: Mutex::new(BTreeMap::new()) }
    }

    pub fn record_success(&self, source: Source) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(source).or_default();
        if entry.state != HealthState::Healthy {
            tracing::info!(%source, "provider restored");
        }
        *entry = Entry::default();
    }

    pub fn record_failure(&self, source: Source) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(source).or_default();
        entry.consecutive_failures += 1;
        entry.last_failure_at = Some(Instant::now());
        entry.probe_started_at = None;
        if entry.consecutive_failures >= self.failure_threshold {
            if entry.state == HealthState::Healthy {
                tracing::warn!(%source, failures = entry.consecutive_failures, "provider demoted");
            }
            entry.state = HealthState::Demoted;
        }
    }

    /// Whether the fan-out should call `source` now. Claims the probe slot
    /// when a demoted provider's cooldown has run out.
    pub fn should_attempt(&self, source: Source) -> bool {
        let mut entries = self.entries.lock();
        let entry = entries.entry(source).or_default();
        match entry.state {
            HealthState::Healthy => true,
            HealthState::Demoted => {
                let cooled = entry.last_failure_at.map_or(true, |t| t.elapsed() >= self.cooldown);
                if cooled {
                    entry.state = HealthState::Probing;
                    entry.probe_started_at = Some(Instant::now());
                }
                cooled
            }
            // a probe whose outcome never came back (caller dropped) frees the slot after another cooldown
            HealthState::Probing => {
                let stale = entry.probe_started_at.map_or(true, |t| t.elapsed() >= self.cooldown);
                if stale {
                    entry.probe_started_at = Some(Instant::now());
                }
                stale
            }
        }
    }

    pub fn state(&self, source: Source) -> HealthState {
        self.entries.lock().get(&source).map_or(HealthState::Healthy, |e| e.state)
    }

    pub fn report(&self, sources: &[Source]) -> Vec<ProviderReport> {
        let entries = self.entries.lock();
        sources
            .iter()
            .map(|&source| {
                let entry = entries.get(&source).cloned().unwrap_or_default();
                ProviderReport { source, state: entry.state, consecutive_failures: entry.consecutive_failures }
            })
            .collect()
    }
}
