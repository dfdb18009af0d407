//! SLO registry: wires SLIs into named SLOs and owns per-SLO evaluation,
//! handing every transition-generated signal to whatever the caller wants
//! to do with it (typically feeding [`super::incident_detector`]).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::domain::error::ConfigError;
use crate::domain::models::{Signal, Slo, SloStatus};

/// Owns every registered SLO and evaluates them on demand.
///
/// A single `RwLock` over the name->SLO map protects registration only;
/// each `Slo` is its own critical section for evaluation, so concurrent
/// `evaluate_all` calls never contend with each other beyond the map read.
pub struct SloRegistry {
    slos: RwLock<HashMap<String, Arc<Slo>>>,
}

impl Default for SloRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SloRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self { slos: RwLock::new(HashMap::new()) }
    }

    /// Registers an SLO under its own name. Returns
    /// [`ConfigError::DuplicateName`] if the name is already registered.
    #[instrument(skip(self, slo), fields(slo_name = %slo.name()))]
    pub fn register(&self, slo: Arc<Slo>) -> Result<(), ConfigError> {
        let mut slos = self.slos.write().expect("slo registry lock poisoned");
        let name = slo.name().to_string();
        if slos.contains_key(&name) {
            return Err(ConfigError::DuplicateName(name));
        }
        info!(slo_name = %name, "registered SLO");
        slos.insert(name, slo);
        Ok(())
    }

    /// Looks up a registered SLO by name.
    pub fn get(&self, name: &str) -> Option<Arc<Slo>> {
        self.slos.read().expect("slo registry lock poisoned").get(name).cloned()
    }

    /// Every registered SLO name.
    pub fn names(&self) -> Vec<String> {
        self.slos.read().expect("slo registry lock poisoned").keys().cloned().collect()
    }

    /// Evaluates every registered SLO at `now`, returning each SLO's name,
    /// its status, and any signal emitted on a status transition.
    #[instrument(skip(self))]
    pub fn evaluate_all(&self, now: DateTime<Utc>) -> Vec<(String, SloStatus, Option<Signal>)> {
        let slos: Vec<(String, Arc<Slo>)> = {
            let guard = self.slos.read().expect("slo registry lock poisoned");
            guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        slos.into_iter()
            .map(|(name, slo)| {
                let (status, signal) = slo.evaluate(now);
                if signal.is_some() {
                    warn!(slo_name = %name, ?status, "SLO transitioned with a signal to emit");
                } else {
                    debug!(slo_name = %name, ?status, "SLO evaluated");
                }
                (name, status, signal)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::error_budget::ErrorBudget;
    use crate::domain::models::sli::{BuiltinKind, BuiltinSli, ServiceLevelIndicator};
    use std::time::Duration;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    #[test]
    fn registering_duplicate_name_is_rejected() {
        let registry = SloRegistry::new();
        let sli: Arc<dyn ServiceLevelIndicator> =
            Arc::new(BuiltinSli::new("success", BuiltinKind::TaskSuccessRate, 0.9, Duration::from_secs(3600)));
        let slo = Arc::new(Slo::new("svc", vec![sli], ErrorBudget::new(0.01, 86_400)).unwrap());
        registry.register(slo.clone()).unwrap();
        let err = registry.register(slo).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateName("svc".to_string()));
    }

    #[test]
    fn evaluate_all_covers_every_registered_slo() {
        let registry = SloRegistry::new();
        for name in ["svc-a", "svc-b"] {
            let sli: Arc<dyn ServiceLevelIndicator> =
                Arc::new(BuiltinSli::new("success", BuiltinKind::TaskSuccessRate, 0.9, Duration::from_secs(3600)));
            let slo = Arc::new(Slo::new(name, vec![sli], ErrorBudget::new(0.01, 86_400)).unwrap());
            registry.register(slo).unwrap();
        }
        let results = registry.evaluate_all(t(0));
        assert_eq!(results.len(), 2);
    }
}
