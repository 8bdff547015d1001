//! Counter-rate tracking across sampling cycles
//!
//! Keeps the last observed cumulative CPU seconds per container so the
//! exposition tier can turn a monotonic counter into an instantaneous
//! rate. The state lives as long as the process; a restart starts over
//! and the first observation of every container reports zero. Baselines
//! of pods that no longer exist are evicted by the exposition tier.

use std::collections::HashMap;

/// Last observation of a cumulative CPU counter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterEntry {
    pub cumulative_cpu_seconds: f64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Default)]
pub struct CounterState {
    entries: HashMap<String, CounterEntry>,
}

impl CounterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation and return the CPU rate in millicores
    ///
    /// Returns 0 when there is no prior observation, when the counter went
    /// backwards (reset), or when time did not advance. The observation is
    /// stored either way so the next cycle has a baseline.
    pub fn observe(&mut self, key: &str, total_seconds: f64, timestamp_ms: i64) -> u64 {
        let rate = match self.entries.get(key) {
            Some(prev)
                if total_seconds >= prev.cumulative_cpu_seconds
                    && timestamp_ms > prev.timestamp_ms =>
            {
                let elapsed_secs = (timestamp_ms - prev.timestamp_ms) as f64 / 1000.0;
                let delta = total_seconds - prev.cumulative_cpu_seconds;
                (1000.0 * delta / elapsed_secs).round().max(0.0) as u64
            }
            _ => 0,
        };

        self.entries.insert(
            key.to_string(),
            CounterEntry {
                cumulative_cpu_seconds: total_seconds,
                timestamp_ms,
            },
        );

        rate
    }

    /// Keep only the baselines whose key satisfies `keep`
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.entries.retain(|key, _| keep(key));
    }

    pub fn get(&self, key: &str) -> Option<&CounterEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Key identifying one logical container in the counter state
pub fn counter_key(namespace: &str, pod: &str, container: &str) -> String {
    format!("{}/{}/{}", namespace, pod, container)
}

/// Split a counter key back into (namespace, pod)
pub fn counter_key_pod(key: &str) -> Option<(&str, &str)> {
    let (namespace, rest) = key.split_once('/')?;
    let (pod, _container) = rest.split_once('/')?;
    Some((namespace, pod))
}
