//! Event Log envelope and fan-out listener trait (spec §4.1).
//!
//! Every state transition in the system is recorded as an `EventEnvelope`
//! before any downstream effect becomes visible: append to the per-type
//! JSONL journal, then fan out to subscribers. `EventListener` mirrors the
//! event-bus subscriber pattern; it stays synchronous so a slow listener
//! can't stall the publish path, matching the at-least-once-in-process
//! delivery the journal's replay makes safe to duplicate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::decision::Decision;
use crate::domain::gate::GateResult;
use crate::domain::outcome::Outcome;
use crate::domain::position::{ExitReason, Position};
use crate::domain::signal::Signal;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    SignalReceived { signal: Signal },
    GateEvaluated { result: GateResult },
    DecisionMade { decision: Decision },
    OrderSubmitted { order_id: String, symbol: String, client_order_id: String },
    OrderFilled { order_id: String, symbol: String, fill_price: Decimal, quantity: Decimal },
    OrderRejected { order_id: String, symbol: String, reason: String },
    PositionOpened { position: Position },
    PositionClosed { position_id: String, symbol: String, reason: ExitReason, pnl_usd: Decimal },
    OutcomeRecorded { outcome: Outcome },
    CircuitBreakerStateChanged { from: String, to: String, reason: String },
    KillSwitchTripped { reason: String },
    KillSwitchReset,
    ReconcileMismatch { symbol: String, detail: String },
    Heartbeat { uptime_sec: u64 },
    GracefulStopInitiated { reason: String },
    /// An in-flight exchange call didn't resolve within the shutdown grace
    /// window (spec §5); whether it ultimately landed is unknown.
    UncertainOutcome { symbol: String, operation: String, detail: String },
}

impl EventPayload {
    /// Stable discriminant used as the per-type journal file name and in
    /// `event_id` hashing (spec §4.1).
    pub fn type_name(&self) -> &'static str {
        match self {
            EventPayload::SignalReceived { .. } => "signal_received",
            EventPayload::GateEvaluated { .. } => "gate_evaluated",
            EventPayload::DecisionMade { .. } => "decision_made",
            EventPayload::OrderSubmitted { .. } => "order_submitted",
            EventPayload::OrderFilled { .. } => "order_filled",
            EventPayload::OrderRejected { .. } => "order_rejected",
            EventPayload::PositionOpened { .. } => "position_opened",
            EventPayload::PositionClosed { .. } => "position_closed",
            EventPayload::OutcomeRecorded { .. } => "outcome_recorded",
            EventPayload::CircuitBreakerStateChanged { .. } => "circuit_breaker_state_changed",
            EventPayload::KillSwitchTripped { .. } => "kill_switch_tripped",
            EventPayload::KillSwitchReset => "kill_switch_reset",
            EventPayload::ReconcileMismatch { .. } => "reconcile_mismatch",
            EventPayload::Heartbeat { .. } => "heartbeat",
            EventPayload::GracefulStopInitiated { .. } => "graceful_stop_initiated",
            EventPayload::UncertainOutcome { .. } => "uncertain_outcome",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub schema_version: u32,
    pub event_id: String,
    pub correlation_id: String,
    pub symbol: Option<String>,
    pub produced_at: DateTime<Utc>,
    pub payload: EventPayload,
}

impl EventEnvelope {
    pub fn new(correlation_id: &str, symbol: Option<&str>, payload: EventPayload) -> anyhow::Result<Self> {
        let produced_at = crate::domain::ids::now();
        let canonical = crate::domain::ids::canonical_payload(&payload)?;
        let event_id = crate::domain::ids::event_id(
            payload.type_name(),
            correlation_id,
            produced_at,
            &canonical,
        );
        Ok(Self {
            schema_version: 1,
            event_id,
            correlation_id: correlation_id.to_string(),
            symbol: symbol.map(str::to_string),
            produced_at,
            payload,
        })
    }
}

/// Synchronous fan-out subscriber. Implementations must not block; anything
/// that does I/O should hand the envelope off to its own queue. A failure
/// is recorded against `name()` in the dead-letter queue rather than
/// propagated to the publisher.
pub trait EventListener: Send + Sync {
    fn name(&self) -> &str;
    fn on_event(&self, event: &EventEnvelope) -> anyhow::Result<()>;
}
