//! Incident detector: correlates signals into incidents within a sliding
//! window, deduplicates repeats, and drives registered automated-response
//! hooks. Hooks are resolved once at registration — no dynamic dispatch
//! through strings at call sites, per the redesign notes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::error::StateError;
use crate::domain::models::incident::severity_for_signal;
use crate::domain::models::{Incident, Signal, SignalKind};

/// A callback invoked when a signal of its registered kind produces or
/// extends an incident. Receives the incident after correlation.
pub type ResponseHook = dyn Fn(&Incident) + Send + Sync;

/// Default correlation window, per the data-model design.
pub const DEFAULT_CORRELATION_WINDOW_SECS: u64 = 300;

/// Owns open and resolved incidents and the signal->incident correlation
/// logic, plus the automated-response hook table.
pub struct IncidentDetector {
    correlation_window: Duration,
    incidents: RwLock<HashMap<Uuid, Arc<Mutex<Incident>>>>,
    hooks: RwLock<HashMap<SignalKind, Vec<(String, Arc<ResponseHook>)>>>,
}

impl Default for IncidentDetector {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_CORRELATION_WINDOW_SECS))
    }
}

impl IncidentDetector {
    /// Creates a detector with the given correlation window.
    pub fn new(correlation_window: Duration) -> Self {
        Self {
            correlation_window,
            incidents: RwLock::new(HashMap::new()),
            hooks: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a named automated-response hook for a signal kind. Hooks
    /// resolve once, at registration time; `ingest_signal` simply invokes
    /// whatever was registered for the incoming signal's kind.
    pub fn register_hook(&self, kind: SignalKind, name: impl Into<String>, hook: Arc<ResponseHook>) {
        let mut hooks = self.hooks.write().expect("incident detector hook table lock poisoned");
        hooks.entry(kind).or_default().push((name.into(), hook));
    }

    /// Every incident currently open (not `RESOLVED`).
    pub fn open_incidents(&self) -> Vec<Incident> {
        let incidents = self.incidents.read().expect("incident detector lock poisoned");
        incidents
            .values()
            .filter_map(|i| {
                let guard = i.lock().expect("incident lock poisoned");
                (!guard.is_resolved()).then(|| guard.clone())
            })
            .collect()
    }

    /// Looks up an incident by id, open or resolved.
    pub fn get(&self, id: Uuid) -> Option<Incident> {
        let incidents = self.incidents.read().expect("incident detector lock poisoned");
        incidents.get(&id).map(|i| i.lock().expect("incident lock poisoned").clone())
    }

    /// Ingests a signal: drops an exact dedup-key repeat within an open
    /// incident's correlation window, otherwise correlates it into an
    /// existing open incident (by source agent or shared dedup prefix) or
    /// opens a new one, then runs automated responses for its kind.
    #[instrument(skip(self, signal), fields(kind = ?signal.kind, agent = %signal.source_agent))]
    pub fn ingest_signal(&self, signal: Signal) -> Incident {
        let now = signal.timestamp;

        if let Some(existing) = self.find_dedup_match(&signal, now) {
            debug!(incident_id = %existing, "duplicate signal suppressed by dedup key");
            let incidents = self.incidents.read().expect("incident detector lock poisoned");
            return incidents[&existing].lock().expect("incident lock poisoned").clone();
        }

        let implied_severity = severity_for_signal(signal.kind, signal.severity);

        if let Some(incident_arc) = self.find_correlation_match(&signal, now) {
            let mut incident = incident_arc.lock().expect("incident lock poisoned");
            incident.correlate(signal.clone(), implied_severity, now);
            let snapshot = incident.clone();
            drop(incident);
            self.run_hooks(signal.kind, &incident_arc);
            info!(incident_id = %snapshot.id, "signal correlated into existing incident");
            return snapshot;
        }

        let id = Uuid::new_v4();
        let incident = Incident::open(id, signal.clone(), implied_severity, now);
        let incident_arc = Arc::new(Mutex::new(incident));
        self.incidents.write().expect("incident detector lock poisoned").insert(id, incident_arc.clone());
        self.run_hooks(signal.kind, &incident_arc);
        warn!(incident_id = %id, ?implied_severity, "opened new incident");
        incident_arc.lock().expect("incident lock poisoned").clone()
    }

    fn find_dedup_match(&self, signal: &Signal, now: DateTime<Utc>) -> Option<Uuid> {
        let Some(dedup_key) = signal.dedup_key.as_deref() else { return None };
        let window = chrono::Duration::from_std(self.correlation_window).unwrap_or_default();
        let incidents = self.incidents.read().expect("incident detector lock poisoned");
        for (id, incident) in incidents.iter() {
            let guard = incident.lock().expect("incident lock poisoned");
            if guard.is_resolved() {
                continue;
            }
            if now - guard.updated_at > window {
                continue;
            }
            if guard.dedup_keys().contains(&dedup_key) {
                return Some(*id);
            }
        }
        None
    }

    fn find_correlation_match(&self, signal: &Signal, now: DateTime<Utc>) -> Option<Arc<Mutex<Incident>>> {
        let window = chrono::Duration::from_std(self.correlation_window).unwrap_or_default();
        let dedup_prefix = signal.dedup_key.as_deref().and_then(|k| k.split(':').next());
        let incidents = self.incidents.read().expect("incident detector lock poisoned");
        for incident in incidents.values() {
            let guard = incident.lock().expect("incident lock poisoned");
            if guard.is_resolved() {
                continue;
            }
            if now - guard.updated_at > window {
                continue;
            }
            let agent_match = guard.source_agents().contains(&signal.source_agent.as_str());
            let prefix_match = dedup_prefix.is_some_and(|prefix| {
                guard.dedup_keys().iter().any(|k| k.split(':').next() == Some(prefix))
            });
            if agent_match || prefix_match {
                drop(guard);
                return Some(incident.clone());
            }
        }
        None
    }

    fn run_hooks(&self, kind: SignalKind, incident: &Arc<Mutex<Incident>>) {
        let hooks = self.hooks.read().expect("incident detector hook table lock poisoned");
        let Some(registered) = hooks.get(&kind) else { return };
        for (name, hook) in registered {
            let snapshot = incident.lock().expect("incident lock poisoned").clone();
            hook(&snapshot);
            let now = snapshot.updated_at;
            incident.lock().expect("incident lock poisoned").record_response(name.clone(), now);
        }
    }

    /// Transitions an incident through its explicit lifecycle. Thin
    /// passthrough to [`Incident`]'s own transition methods, looked up by id.
    pub fn acknowledge(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StateError> {
        self.with_incident(id, |i| i.acknowledge(now))
    }

    /// See [`Self::acknowledge`].
    pub fn investigate(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StateError> {
        self.with_incident(id, |i| i.investigate(now))
    }

    /// See [`Self::acknowledge`].
    pub fn mitigate(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StateError> {
        self.with_incident(id, |i| i.mitigate(now))
    }

    /// See [`Self::acknowledge`]. Once resolved, the incident is excluded
    /// from further correlation by [`Self::find_correlation_match`].
    pub fn resolve(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StateError> {
        self.with_incident(id, |i| i.resolve(now))
    }

    fn with_incident(&self, id: Uuid, f: impl FnOnce(&mut Incident) -> Result<(), StateError>) -> Result<(), StateError> {
        let incidents = self.incidents.read().expect("incident detector lock poisoned");
        let Some(incident) = incidents.get(&id) else {
            return Err(StateError::invalid_transition("unknown", "lookup"));
        };
        let mut guard = incident.lock().expect("incident lock poisoned");
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Severity;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    #[test]
    fn three_signals_same_agent_correlate_into_one_incident_p1() {
        let detector = IncidentDetector::new(Duration::from_secs(60));
        let s1 = Signal::new(SignalKind::SloBreach, "agent-1", Severity::Critical, "breach", t(0))
            .with_dedup_key("agent-1:svc:critical");
        let s2 = Signal::new(SignalKind::CostAnomaly, "agent-1", Severity::Warn, "anomaly", t(10));
        let s3 = Signal::new(SignalKind::PolicyViolation, "agent-1", Severity::Critical, "violation", t(20));

        let i1 = detector.ingest_signal(s1.clone());
        let i2 = detector.ingest_signal(s2);
        let i3 = detector.ingest_signal(s3);

        assert_eq!(i1.id, i2.id);
        assert_eq!(i2.id, i3.id);
        assert_eq!(i3.severity, crate::domain::models::IncidentSeverity::P1);
        assert_eq!(i3.timeline.len(), 3);

        // Repeat of s1's dedup key is suppressed, not added as a new entry.
        let s1_repeat = Signal::new(SignalKind::SloBreach, "agent-1", Severity::Critical, "breach again", t(25))
            .with_dedup_key("agent-1:svc:critical");
        let i4 = detector.ingest_signal(s1_repeat);
        assert_eq!(i4.timeline.len(), 3);
    }

    #[test]
    fn resolved_incidents_are_excluded_from_correlation() {
        let detector = IncidentDetector::new(Duration::from_secs(300));
        let s1 = Signal::new(SignalKind::SloBreach, "agent-1", Severity::Critical, "breach", t(0));
        let i1 = detector.ingest_signal(s1);
        detector.acknowledge(i1.id, t(1)).unwrap();
        detector.investigate(i1.id, t(2)).unwrap();
        detector.mitigate(i1.id, t(3)).unwrap();
        detector.resolve(i1.id, t(4)).unwrap();

        let s2 = Signal::new(SignalKind::SloBreach, "agent-1", Severity::Critical, "breach2", t(5));
        let i2 = detector.ingest_signal(s2);
        assert_ne!(i1.id, i2.id);
    }

    #[test]
    fn automated_response_hook_fires_once_per_signal() {
        let detector = IncidentDetector::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        detector.register_hook(
            SignalKind::ErrorBudgetExhausted,
            "auto_rollback",
            Arc::new(move |_incident| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let s1 = Signal::new(SignalKind::ErrorBudgetExhausted, "agent-1", Severity::Critical, "exhausted", t(0));
        let incident = detector.ingest_signal(s1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(incident.automated_responses, vec!["auto_rollback".to_string()]);
    }
}
