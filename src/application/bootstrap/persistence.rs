//! File-backed repository wiring (spec §6 `state/*.json`, `events/`).

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::domain::events::EventListener;
use crate::domain::ports::Notifier;
use crate::domain::repositories::{AllowListRepository, EventRepository, PositionRepository, RiskStateRepository};
use crate::infrastructure::event_listeners::NotifyEventListener;
use crate::infrastructure::event_log::FileEventLog;
use crate::infrastructure::state_repositories::{JsonAllowListRepository, JsonPositionRepository, JsonRiskStateRepository};

pub struct PersistenceHandle {
    pub event_repo: Arc<dyn EventRepository>,
    pub risk_state_repository: Arc<dyn RiskStateRepository>,
    pub position_repository: Arc<dyn PositionRepository>,
    pub allow_list_repository: Arc<dyn AllowListRepository>,
}

pub struct PersistenceBootstrap;

impl PersistenceBootstrap {
    pub async fn init(config: &Config, notifier: Arc<dyn Notifier>) -> Result<PersistenceHandle> {
        let state_dir = Path::new(&config.state_dir);
        let event_log_dir = Path::new(&config.event_log_dir);

        let listeners: Vec<Arc<dyn EventListener>> = vec![Arc::new(NotifyEventListener::spawn(notifier))];

        Ok(PersistenceHandle {
            event_repo: Arc::new(FileEventLog::with_listeners(event_log_dir.to_path_buf(), listeners)),
            risk_state_repository: Arc::new(JsonRiskStateRepository::new(state_dir.to_path_buf())),
            position_repository: Arc::new(JsonPositionRepository::new(state_dir.to_path_buf())),
            allow_list_repository: Arc::new(JsonAllowListRepository::new(state_dir.to_path_buf())),
        })
    }
}
