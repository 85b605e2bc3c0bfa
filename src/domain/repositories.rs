//! Repository Pattern abstractions for the file-backed persistence layer
//! (spec §6). Business logic depends on these traits, never on the JSON
//! layout directly; `infrastructure::repositories` implements them against
//! `state/*.json` with atomic temp-file-then-rename writes.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::allow_list::AllowListEntry;
use crate::domain::events::EventEnvelope;
use crate::domain::position::Position;
use crate::domain::risk::state::RiskState;

/// Append-only event journal plus bounded replay (spec §4.1).
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn append(&self, event: &EventEnvelope) -> Result<()>;

    async fn replay(
        &self,
        from_ts: chrono::DateTime<chrono::Utc>,
        to_ts: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<EventEnvelope>>;

    async fn recent(&self, limit: usize) -> Result<Vec<EventEnvelope>>;
}

/// Single persisted `RiskState` document (spec §3, §6 `state/risk.json`).
#[async_trait]
pub trait RiskStateRepository: Send + Sync {
    async fn load(&self) -> Result<RiskState>;
    async fn save(&self, state: &RiskState) -> Result<()>;
}

/// Open-position set (spec §6 `state/positions.json`).
#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn load_all(&self) -> Result<Vec<Position>>;
    async fn save_all(&self, positions: &[Position]) -> Result<()>;
}

/// AllowList entries (spec §6 `state/allowlist.json`).
#[async_trait]
pub trait AllowListRepository: Send + Sync {
    async fn load_all(&self) -> Result<Vec<AllowListEntry>>;
    async fn save_all(&self, entries: &[AllowListEntry]) -> Result<()>;
}
