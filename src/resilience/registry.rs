//! Process-wide circuit breaker registry.
//!
//! Breakers are created on first lookup and live until process exit.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::BreakerConfig;
use crate::resilience::circuit_breaker::{BreakerStatus, CircuitBreaker, CircuitState};

#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the breaker for `name`, creating it with `config` if absent.
    pub fn get_or_create<F>(&self, name: &str, config: F) -> Arc<CircuitBreaker>
    where
        F: FnOnce() -> BreakerConfig,
    {
        if let Some(existing) = self.breakers.get(name) {
            return existing.value().clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = config();
                tracing::debug!(breaker = %name, ?config, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(name, config))
            })
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// Status of every breaker, sorted by name.
    pub fn statuses(&self) -> Vec<BreakerStatus> {
        let mut statuses: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| entry.value().status())
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Names of breakers currently open.
    pub fn open_breakers(&self) -> Vec<String> {
        let mut open: Vec<_> = self
            .breakers
            .iter()
            .filter(|entry| entry.value().state() == CircuitState::Open)
            .map(|entry| entry.key().clone())
            .collect();
        open.sort();
        open
    }

    /// Push new settings to every live breaker.
    pub fn reconfigure_all<F>(&self, config_for: F)
    where
        F: Fn(&str) -> BreakerConfig,
    {
        for entry in self.breakers.iter() {
            entry.value().reconfigure(config_for(entry.key()));
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
