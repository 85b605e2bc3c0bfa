//! Fan-out subscribers for the event journal (spec §4.1). Each listener
//! hands its event off to its own queue rather than doing I/O inline, so a
//! slow subscriber never stalls `FileEventLog::append`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::events::{EventEnvelope, EventListener, EventPayload};
use crate::domain::ports::Notifier;

/// Forwards operator-relevant events (circuit trips, kill switch, reconcile
/// mismatches) onto an unbounded channel a background task drains into the
/// configured `Notifier`, so `on_event` itself never awaits.
pub struct NotifyEventListener {
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

impl NotifyEventListener {
    /// Spawns the background forwarding task and returns the listener that
    /// feeds it.
    pub fn spawn(notifier: Arc<dyn Notifier>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<EventEnvelope>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let (subject, body) = describe(&event);
                if let Err(e) = notifier.notify(subject, &body).await {
                    warn!("event listener forwarding failed for {}: {}", event.event_id, e);
                }
            }
        });
        Self { tx }
    }
}

fn describe(event: &EventEnvelope) -> (&'static str, String) {
    match &event.payload {
        EventPayload::KillSwitchTripped { reason } => ("kill switch tripped", reason.clone()),
        EventPayload::CircuitBreakerStateChanged { from, to, reason } => {
            ("circuit breaker state changed", format!("{from} -> {to}: {reason}"))
        }
        EventPayload::ReconcileMismatch { symbol, detail } => ("reconcile mismatch", format!("{symbol}: {detail}")),
        other => ("event", other.type_name().to_string()),
    }
}

impl EventListener for NotifyEventListener {
    fn name(&self) -> &str {
        "notify"
    }

    fn on_event(&self, event: &EventEnvelope) -> anyhow::Result<()> {
        let interesting = matches!(
            event.payload,
            EventPayload::KillSwitchTripped { .. }
                | EventPayload::CircuitBreakerStateChanged { .. }
                | EventPayload::ReconcileMismatch { .. }
        );
        if !interesting {
            return Ok(());
        }
        self.tx
            .send(event.clone())
            .map_err(|_| anyhow::anyhow!("notify listener queue closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingNotifier {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, subject: &str, body: &str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn kill_switch_event_is_forwarded_to_the_notifier() {
        let notifier = Arc::new(RecordingNotifier { calls: Mutex::new(Vec::new()) });
        let listener = NotifyEventListener::spawn(notifier.clone());

        let envelope = EventEnvelope::new("corr-1", None, EventPayload::KillSwitchTripped { reason: "manual".into() }).unwrap();
        listener.on_event(&envelope).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(notifier.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn uninteresting_event_is_not_forwarded() {
        let notifier = Arc::new(RecordingNotifier { calls: Mutex::new(Vec::new()) });
        let listener = NotifyEventListener::spawn(notifier.clone());

        let envelope = EventEnvelope::new("corr-1", None, EventPayload::Heartbeat { uptime_sec: 1 }).unwrap();
        listener.on_event(&envelope).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(notifier.calls.lock().unwrap().len(), 0);
    }
}
