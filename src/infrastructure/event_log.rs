//! File-backed `EventRepository` (spec §4.1, §6). Each event type gets its
//! own append-only JSONL file under `event_log_dir`; `recent`/`replay` read
//! across all per-type files and merge by `produced_at` since callers only
//! care about total ordering, not which file a line came from. After a
//! successful journal write, the event fans out to every registered
//! `EventListener`; a listener that keeps failing lands in `dlq.jsonl`
//! rather than blocking the publisher or silently vanishing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::domain::events::{EventEnvelope, EventListener};
use crate::domain::repositories::EventRepository;
use crate::infrastructure::atomic_file;

/// Dispatch to a listener is retried this many times, synchronously, before
/// the event is parked in the dead-letter queue.
const MAX_LISTENER_ATTEMPTS: u32 = 3;

#[derive(Debug, Serialize, Deserialize)]
struct DlqRecord {
    listener: String,
    attempts: u32,
    failed_at: DateTime<Utc>,
    last_error: String,
    event: EventEnvelope,
}

pub struct FileEventLog {
    dir: PathBuf,
    /// Serializes appends so two loops writing the same type's file in the
    /// same tick can't interleave partial lines.
    write_lock: RwLock<()>,
    listeners: Vec<Arc<dyn EventListener>>,
}

impl FileEventLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), write_lock: RwLock::new(()), listeners: Vec::new() }
    }

    pub fn with_listeners(dir: impl Into<PathBuf>, listeners: Vec<Arc<dyn EventListener>>) -> Self {
        Self { dir: dir.into(), write_lock: RwLock::new(()), listeners }
    }

    fn path_for(&self, event_type: &str) -> PathBuf {
        self.dir.join(format!("{event_type}.jsonl"))
    }

    fn dlq_path(&self) -> PathBuf {
        self.dir.join("dlq.jsonl")
    }

    fn dispatch(&self, event: &EventEnvelope) {
        for listener in &self.listeners {
            let mut attempt = 0u32;
            let mut last_error = String::new();
            loop {
                match listener.on_event(event) {
                    Ok(()) => break,
                    Err(e) => {
                        attempt += 1;
                        last_error = e.to_string();
                        warn!("listener {} failed (attempt {}): {}", listener.name(), attempt, last_error);
                        if attempt >= MAX_LISTENER_ATTEMPTS {
                            self.write_to_dlq(listener.name(), attempt, &last_error, event);
                            break;
                        }
                    }
                }
            }
        }
    }

    fn write_to_dlq(&self, listener: &str, attempts: u32, last_error: &str, event: &EventEnvelope) {
        let record = DlqRecord {
            listener: listener.to_string(),
            attempts,
            failed_at: crate::domain::ids::now(),
            last_error: last_error.to_string(),
            event: event.clone(),
        };
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to serialize dead-letter record: {}", e);
                return;
            }
        };
        if let Err(e) = atomic_file::append_line(&self.dlq_path(), &line) {
            warn!("failed to append to dead-letter queue: {}", e);
        }
    }

    fn all_journal_paths(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir).context("failed to list event log directory")? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn read_all(path: &Path) -> Result<Vec<EventEnvelope>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                serde_json::from_str::<EventEnvelope>(line)
                    .with_context(|| format!("corrupt event line in {}", path.display()))
            })
            .collect()
    }
}

#[async_trait]
impl EventRepository for FileEventLog {
    async fn append(&self, event: &EventEnvelope) -> Result<()> {
        let _guard = self.write_lock.write().await;
        let path = self.path_for(event.payload.type_name());
        let line = serde_json::to_string(event).context("failed to serialize event envelope")?;
        atomic_file::append_line(&path, &line)?;
        self.dispatch(event);
        Ok(())
    }

    async fn replay(&self, from_ts: DateTime<Utc>, to_ts: DateTime<Utc>) -> Result<Vec<EventEnvelope>> {
        let mut events = Vec::new();
        for path in self.all_journal_paths()? {
            events.extend(Self::read_all(&path)?);
        }
        events.retain(|e| e.produced_at >= from_ts && e.produced_at <= to_ts);
        events.sort_by_key(|e| e.produced_at);
        Ok(events)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<EventEnvelope>> {
        let mut events = Vec::new();
        for path in self.all_journal_paths()? {
            events.extend(Self::read_all(&path)?);
        }
        events.sort_by_key(|e| e.produced_at);
        events.reverse();
        events.truncate(limit);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::EventPayload;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("hope-event-log-test-{}", uuid::Uuid::new_v4()))
    }

    struct AlwaysFailsListener {
        calls: AtomicUsize,
    }

    impl EventListener for AlwaysFailsListener {
        fn name(&self) -> &str {
            "always_fails"
        }
        fn on_event(&self, _event: &EventEnvelope) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("simulated listener failure"))
        }
    }

    struct CountingListener {
        calls: AtomicUsize,
    }

    impl EventListener for CountingListener {
        fn name(&self) -> &str {
            "counting"
        }
        fn on_event(&self, _event: &EventEnvelope) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn successful_listener_is_invoked_once_per_event() {
        let dir = temp_dir();
        let listener = Arc::new(CountingListener { calls: AtomicUsize::new(0) });
        let log = FileEventLog::with_listeners(&dir, vec![listener.clone()]);

        let envelope = EventEnvelope::new("corr-1", None, EventPayload::KillSwitchReset).unwrap();
        log.append(&envelope).await.unwrap();

        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn listener_that_keeps_failing_lands_in_the_dead_letter_queue() {
        let dir = temp_dir();
        let listener = Arc::new(AlwaysFailsListener { calls: AtomicUsize::new(0) });
        let log = FileEventLog::with_listeners(&dir, vec![listener.clone()]);

        let envelope = EventEnvelope::new("corr-1", None, EventPayload::KillSwitchReset).unwrap();
        log.append(&envelope).await.unwrap();

        assert_eq!(listener.calls.load(Ordering::SeqCst), MAX_LISTENER_ATTEMPTS as usize);
        let dlq_content = std::fs::read_to_string(dir.join("dlq.jsonl")).unwrap();
        assert_eq!(dlq_content.lines().count(), 1);
        let record: DlqRecord = serde_json::from_str(dlq_content.lines().next().unwrap()).unwrap();
        assert_eq!(record.listener, "always_fails");
        assert_eq!(record.attempts, MAX_LISTENER_ATTEMPTS);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn append_then_recent_roundtrips() {
        let dir = temp_dir();
        let log = FileEventLog::new(&dir);
        let envelope = EventEnvelope::new("corr-1", None, EventPayload::KillSwitchReset).unwrap();
        log.append(&envelope).await.unwrap();

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event_id, envelope.event_id);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn recent_orders_newest_first_across_types() {
        let dir = temp_dir();
        let log = FileEventLog::new(&dir);
        let first = EventEnvelope::new("corr-1", None, EventPayload::KillSwitchReset).unwrap();
        log.append(&first).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = EventEnvelope::new("corr-1", None, EventPayload::Heartbeat { uptime_sec: 1 }).unwrap();
        log.append(&second).await.unwrap();

        let recent = log.recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event_id, second.event_id);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn replay_filters_by_time_window() {
        let dir = temp_dir();
        let log = FileEventLog::new(&dir);
        let envelope = EventEnvelope::new("corr-1", None, EventPayload::KillSwitchReset).unwrap();
        log.append(&envelope).await.unwrap();

        let before = envelope.produced_at - chrono::Duration::seconds(10);
        let after = envelope.produced_at + chrono::Duration::seconds(10);
        assert_eq!(log.replay(before, after).await.unwrap().len(), 1);
        assert_eq!(log.replay(after, after).await.unwrap().len(), 0);
        std::fs::remove_dir_all(&dir).ok();
    }
}
