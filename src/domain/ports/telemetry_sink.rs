//! Telemetry ingress port.
//!
//! `TelemetrySink` is the one interface a framework-specific callback shim
//! (LangChain, CrewAI, AutoGen, ...) would be written against. Writing
//! those shims is out of scope here; this crate only defines the trait and
//! the in-process default implementation in [`crate::adapters::in_process`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a completed task, reported via [`TelemetrySink::on_task_end`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The task completed successfully.
    Success,
    /// The task failed.
    Failure,
    /// The task was cancelled before completion.
    Cancelled,
}

/// Outcome of a single tool call, reported via [`TelemetrySink::on_tool_call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallResult {
    /// The tool call succeeded.
    Success,
    /// The tool call failed.
    Failure,
}

/// Push-style ingress for agent runtime events. A single implementation
/// fans every callback out to whichever subsystems care: SLI recording,
/// cost accounting, fleet heartbeats.
pub trait TelemetrySink: Send + Sync {
    /// An agent started a task.
    fn on_task_start(&self, agent_id: &str, task_id: &str, meta: serde_json::Value, at: DateTime<Utc>);

    /// An agent finished a task, successfully or not.
    fn on_task_end(&self, agent_id: &str, task_id: &str, outcome: TaskOutcome, at: DateTime<Utc>);

    /// An agent invoked a tool.
    fn on_tool_call(&self, agent_id: &str, tool_name: &str, result: ToolCallResult, at: DateTime<Utc>);

    /// An agent made an LLM call, incurring cost and latency.
    fn on_llm_call(&self, agent_id: &str, cost_usd: f64, latency_ms: f64, at: DateTime<Utc>);
}
