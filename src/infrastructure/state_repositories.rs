//! File-backed `RiskStateRepository`/`PositionRepository`/`AllowListRepository`
//! (spec §6 `state/*.json`). Each document is the whole collection, rewritten
//! atomically on every save; these are small, low-frequency writes so a
//! single-document-per-file design is simpler than the per-type journals the
//! Event Log needs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::domain::allow_list::AllowListEntry;
use crate::domain::position::Position;
use crate::domain::repositories::{AllowListRepository, PositionRepository, RiskStateRepository};
use crate::domain::risk::state::RiskState;
use crate::infrastructure::atomic_file;

pub struct JsonRiskStateRepository {
    path: PathBuf,
}

impl JsonRiskStateRepository {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self { path: state_dir.into().join("risk.json") }
    }
}

#[async_trait]
impl RiskStateRepository for JsonRiskStateRepository {
    async fn load(&self) -> Result<RiskState> {
        if !self.path.exists() {
            return Ok(RiskState::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&content).context("failed to parse risk state")
    }

    async fn save(&self, state: &RiskState) -> Result<()> {
        let content = serde_json::to_string_pretty(state).context("failed to serialize risk state")?;
        atomic_file::write_atomic(&self.path, content.as_bytes())
    }
}

pub struct JsonPositionRepository {
    path: PathBuf,
}

impl JsonPositionRepository {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self { path: state_dir.into().join("positions.json") }
    }
}

#[async_trait]
impl PositionRepository for JsonPositionRepository {
    async fn load_all(&self) -> Result<Vec<Position>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&content).context("failed to parse positions")
    }

    async fn save_all(&self, positions: &[Position]) -> Result<()> {
        let content = serde_json::to_string_pretty(positions).context("failed to serialize positions")?;
        atomic_file::write_atomic(&self.path, content.as_bytes())
    }
}

pub struct JsonAllowListRepository {
    path: PathBuf,
}

impl JsonAllowListRepository {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self { path: state_dir.into().join("allowlist.json") }
    }
}

#[async_trait]
impl AllowListRepository for JsonAllowListRepository {
    async fn load_all(&self) -> Result<Vec<AllowListEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&content).context("failed to parse allowlist")
    }

    async fn save_all(&self, entries: &[AllowListEntry]) -> Result<()> {
        let content = serde_json::to_string_pretty(entries).context("failed to serialize allowlist")?;
        atomic_file::write_atomic(&self.path, content.as_bytes())
    }
}
