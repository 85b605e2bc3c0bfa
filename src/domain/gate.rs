//! Outcome of the seven-guard Signal Gate (spec §3 `GateResult`, §4.5).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateOutcome {
    Pass,
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub schema_version: u32,
    pub correlation_id: String,
    pub symbol: String,
    pub outcome: GateOutcome,
    pub reason: Option<String>,
    pub details: String,
}

impl GateResult {
    pub fn pass(correlation_id: &str, symbol: &str) -> Self {
        Self {
            schema_version: 1,
            correlation_id: correlation_id.to_string(),
            symbol: symbol.to_string(),
            outcome: GateOutcome::Pass,
            reason: None,
            details: String::new(),
        }
    }

    pub fn block(correlation_id: &str, symbol: &str, reason: &str, details: impl Into<String>) -> Self {
        Self {
            schema_version: 1,
            correlation_id: correlation_id.to_string(),
            symbol: symbol.to_string(),
            outcome: GateOutcome::Block,
            reason: Some(reason.to_string()),
            details: details.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.outcome == GateOutcome::Pass
    }
}
