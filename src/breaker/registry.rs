use ahash::AHashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::circuit::{BreakerSettings, BreakerStatus, CircuitBreaker};

/// Registry of per-dependency circuit breakers.
///
/// Constructed once at startup and shared by reference. Breakers are
/// created lazily on first lookup and live for the registry's lifetime;
/// every caller naming the same dependency shares one breaker.
#[derive(Debug)]
pub struct BreakerRegistry {
    defaults: BreakerSettings,
    overrides: AHashMap<String, BreakerSettings>,
    breakers: RwLock<AHashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Create a registry using `defaults` for every dependency.
    pub fn new(defaults: BreakerSettings) -> Self {
        BreakerRegistry::with_overrides(defaults, HashMap::new())
    }

    /// Create a registry with per-dependency settings.
    pub fn with_overrides(
        defaults: BreakerSettings,
        overrides: HashMap<String, BreakerSettings>,
    ) -> Self {
        BreakerRegistry {
            defaults,
            overrides: overrides.into_iter().collect(),
            breakers: RwLock::new(AHashMap::new()),
        }
    }

    /// Get or create the breaker for a dependency. Never fails.
    pub fn get(&self, dependency: &str) -> Arc<CircuitBreaker> {
        // Fast path: breaker exists
        {
            let read_guard = self.breakers.read();
            if let Some(breaker) = read_guard.get(dependency) {
                return breaker.clone();
            }
        }

        let mut write_guard = self.breakers.write();

        // Double-check after acquiring write lock
        if let Some(breaker) = write_guard.get(dependency) {
            return breaker.clone();
        }

        let breaker = Arc::new(CircuitBreaker::new(
            dependency,
            self.settings_for(dependency),
        ));
        write_guard.insert(dependency.to_string(), breaker.clone());

        tracing::debug!(dependency = dependency, "Created circuit breaker");
        breaker
    }

    /// Settings a breaker for `dependency` is (or would be) created with.
    pub fn settings_for(&self, dependency: &str) -> BreakerSettings {
        self.overrides
            .get(dependency)
            .copied()
            .unwrap_or(self.defaults)
    }

    /// Status of every breaker created so far, sorted by dependency name.
    pub fn statuses(&self) -> Vec<BreakerStatus> {
        let mut statuses: Vec<BreakerStatus> = self
            .breakers
            .read()
            .values()
            .map(|breaker| breaker.status())
            .collect();
        statuses.sort_by(|a, b| a.dependency.cmp(&b.dependency));
        statuses
    }

    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        BreakerRegistry::new(BreakerSettings::default())
    }
}
