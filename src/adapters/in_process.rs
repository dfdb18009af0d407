//! In-process adapters: the one `TelemetrySink` wiring and the one
//! `AlertChannel` this crate ships outright, both usable standalone (tests,
//! embedding into another process) without any network or database adapter.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::application::{CostGuard, FleetRegistry, SloRegistry};
use crate::domain::models::alert::{Alert, AlertSeverity, ChannelKind};
use crate::domain::models::cost::CostAlert;
use crate::domain::models::Signal;
use crate::domain::ports::alert_channel::{AlertChannel, DeliveryResult};
use crate::domain::ports::telemetry_sink::{TaskOutcome, TelemetrySink, ToolCallResult};

/// The default `TelemetrySink`: fans runtime callbacks out to the SLO
/// registry (SLI samples, error-budget events), the fleet registry
/// (heartbeats, degradation counters), and the cost guard (LLM-call spend).
///
/// `TelemetrySink`'s methods are synchronous, so anything this sink
/// produces that a caller needs to act on asynchronously (signals, cost
/// alerts) is buffered for the caller to drain rather than dispatched here.
pub struct CoreTelemetrySink {
    slo_registry: Arc<SloRegistry>,
    fleet_registry: Arc<FleetRegistry>,
    cost_guard: Arc<CostGuard>,
    pending_signals: Mutex<Vec<Signal>>,
    pending_cost_alerts: Mutex<Vec<CostAlert>>,
}

impl CoreTelemetrySink {
    /// Wires a sink over the three application-layer components it feeds.
    pub fn new(slo_registry: Arc<SloRegistry>, fleet_registry: Arc<FleetRegistry>, cost_guard: Arc<CostGuard>) -> Self {
        Self {
            slo_registry,
            fleet_registry,
            cost_guard,
            pending_signals: Mutex::new(Vec::new()),
            pending_cost_alerts: Mutex::new(Vec::new()),
        }
    }

    /// Drains every signal buffered since the last drain, in emission order.
    pub fn drain_signals(&self) -> Vec<Signal> {
        std::mem::take(&mut self.pending_signals.lock().expect("telemetry sink signal buffer poisoned"))
    }

    /// Drains every cost alert buffered since the last drain.
    pub fn drain_cost_alerts(&self) -> Vec<CostAlert> {
        std::mem::take(&mut self.pending_cost_alerts.lock().expect("telemetry sink cost alert buffer poisoned"))
    }

    fn record_into_slo(&self, agent_id: &str, sli_name: &str, value: f64, good: Option<bool>, at: DateTime<Utc>) {
        let Some(agent) = self.fleet_registry.get(agent_id) else { return };
        let Some(slo_name) = agent.slo_name else { return };
        let Some(slo) = self.slo_registry.get(&slo_name) else { return };
        if let Some(sli) = slo.slis().get(sli_name) {
            sli.record(value, None, at);
        }
        if let Some(good) = good {
            slo.error_budget().record_event(good, at);
        }
    }
}

impl TelemetrySink for CoreTelemetrySink {
    fn on_task_start(&self, agent_id: &str, _task_id: &str, _meta: serde_json::Value, at: DateTime<Utc>) {
        self.fleet_registry.heartbeat(agent_id, at);
    }

    fn on_task_end(&self, agent_id: &str, _task_id: &str, outcome: TaskOutcome, at: DateTime<Utc>) {
        self.fleet_registry.heartbeat(agent_id, at);
        let good = outcome == TaskOutcome::Success;
        self.fleet_registry.record_event(agent_id, good, None, None, at);
        self.record_into_slo(agent_id, "task_success_rate", if good { 1.0 } else { 0.0 }, Some(good), at);
    }

    fn on_tool_call(&self, agent_id: &str, _tool_name: &str, result: ToolCallResult, at: DateTime<Utc>) {
        let good = result == ToolCallResult::Success;
        self.fleet_registry.record_event(agent_id, good, None, None, at);
        self.record_into_slo(agent_id, "tool_call_accuracy", if good { 1.0 } else { 0.0 }, None, at);
    }

    fn on_llm_call(&self, agent_id: &str, cost_usd: f64, latency_ms: f64, at: DateTime<Utc>) {
        self.record_into_slo(agent_id, "response_latency", latency_ms, None, at);
        self.fleet_registry.record_event(agent_id, true, Some(latency_ms), Some(cost_usd), at);

        let (alerts, signal) = self.cost_guard.record_cost(agent_id, "llm_call", cost_usd, None, at);
        if !alerts.is_empty() {
            self.pending_cost_alerts.lock().expect("telemetry sink cost alert buffer poisoned").extend(alerts);
        }
        if let Some(signal) = signal {
            self.pending_signals.lock().expect("telemetry sink signal buffer poisoned").push(signal);
        }
    }
}

/// An `AlertChannel` that keeps delivered alerts in memory and optionally
/// forwards each one to a caller-supplied callback. The only channel this
/// crate implements; network channels (Slack, PagerDuty, Opsgenie, Teams,
/// generic webhook) are adapters a caller bolts on against [`AlertChannel`].
pub struct InProcessCallbackChannel {
    min_severity: AlertSeverity,
    received: Mutex<Vec<Alert>>,
    callback: Option<Arc<dyn Fn(&Alert) + Send + Sync>>,
}

impl InProcessCallbackChannel {
    /// Creates a channel accepting alerts at or above `min_severity`.
    pub fn new(min_severity: AlertSeverity) -> Self {
        Self { min_severity, received: Mutex::new(Vec::new()), callback: None }
    }

    /// Attaches a callback invoked synchronously on every delivered alert,
    /// in addition to buffering it.
    pub fn with_callback(mut self, callback: Arc<dyn Fn(&Alert) + Send + Sync>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Every alert delivered so far, oldest first.
    pub fn received(&self) -> Vec<Alert> {
        self.received.lock().expect("in-process channel lock poisoned").clone()
    }
}

#[async_trait]
impl AlertChannel for InProcessCallbackChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::InProcessCallback
    }

    fn min_severity(&self) -> AlertSeverity {
        self.min_severity
    }

    async fn send(&self, alert: &Alert) -> DeliveryResult {
        self.received.lock().expect("in-process channel lock poisoned").push(alert.clone());
        if let Some(callback) = &self.callback {
            callback(alert);
        }
        DeliveryResult::ok(ChannelKind::InProcessCallback)
    }
}
