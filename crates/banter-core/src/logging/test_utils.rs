//! Records tracing events in memory so tests can assert on diagnostics.
//!
//! The subscriber from [`capture_logs`] is thread-local. Under a
//! current-thread tokio runtime that covers spawned tasks too.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// One recorded event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Level.
    pub level: Level,
    /// Emitting module.
    pub target: String,
    /// Rendered message.
    pub message: String,
    /// Structured fields in emission order.
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    /// Rendered value of field `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find_map(|(k, v)| (k == name).then_some(v.as_str()))
    }
}

/// Shared handle to the recorded events.
#[derive(Clone, Debug, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CapturedEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.lock().clone()
    }

    /// First event at `level` whose message contains `needle`.
    pub fn find(&self, level: Level, needle: &str) -> Option<CapturedEvent> {
        self.lock()
            .iter()
            .find(|e| e.level == level && e.message.contains(needle))
            .cloned()
    }

    /// Whether an event at `level` has a message containing `needle`.
    pub fn has_event(&self, level: Level, needle: &str) -> bool {
        self.find(level, needle).is_some()
    }

    /// Events recorded at `level`.
    pub fn count_at_level(&self, level: Level) -> usize {
        self.lock().iter().filter(|e| e.level == level).count()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[derive(Default)]
struct Recorder {
    message: String,
    fields: Vec<(String, String)>,
}

impl Visit for Recorder {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let mut rendered = String::new();
        let _ = write!(rendered, "{value:?}");
        self.put(field, rendered);
    }
}

impl Recorder {
    fn put(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push((field.name().to_owned(), value));
        }
    }
}

struct CaptureLayer(CapturedLogs);

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorder = Recorder::default();
        event.record(&mut recorder);
        let metadata = event.metadata();
        self.0.lock().push(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_owned(),
            message: recorder.message,
            fields: recorder.fields,
        });
    }
}

/// Record every event on this thread until the guard is dropped.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = tracing_subscriber::registry()
        .with(CaptureLayer(logs.clone()))
        .with(LevelFilter::TRACE)
        .set_default();
    (logs, guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_level_and_message() {
        let (logs, _guard) = capture_logs();
        tracing::warn!("malformed frame dropped");
        assert!(logs.has_event(Level::WARN, "malformed"));
        assert!(!logs.has_event(Level::ERROR, "malformed"));
    }

    #[test]
    fn records_structured_fields() {
        let (logs, _guard) = capture_logs();
        tracing::info!(attempt = 3_u32, delay_ms = 2250_u64, owner = "o1", "reconnect scheduled");
        let event = logs.find(Level::INFO, "reconnect").unwrap();
        assert_eq!(event.field("attempt"), Some("3"));
        assert_eq!(event.field("delay_ms"), Some("2250"));
        assert_eq!(event.field("owner"), Some("o1"));
        assert_eq!(event.field("code"), None);
    }

    #[test]
    fn count_and_clear() {
        let (logs, _guard) = capture_logs();
        tracing::debug!("frame");
        tracing::debug!("frame");
        tracing::info!("opened");
        assert_eq!(logs.count_at_level(Level::DEBUG), 2);
        logs.clear();
        assert!(logs.events().is_empty());
    }

    #[test]
    fn stops_after_guard_drops() {
        let (logs, guard) = capture_logs();
        drop(guard);
        tracing::info!("unseen");
        assert!(logs.events().is_empty());
    }
}
