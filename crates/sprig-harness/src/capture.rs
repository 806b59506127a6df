#![forbid(unsafe_code)]

//! A `tracing` layer that keeps every event and span for later assertions.
//!
//! Install it for the current thread with [`TraceCapture::install`]; the
//! returned guard restores the previous subscriber when dropped.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ahash::AHashMap;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Id, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

/// One captured event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    /// Value of a non-message field, formatted.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

/// One captured span with the fields recorded on it so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedSpan {
    pub name: &'static str,
    pub fields: Vec<(String, String)>,
}

impl CapturedSpan {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Default)]
struct CaptureState {
    events: Vec<CapturedEvent>,
    spans: Vec<CapturedSpan>,
    open: AHashMap<u64, usize>,
}

/// Collects events and spans from the subscriber it is layered onto.
#[derive(Clone, Default)]
pub struct TraceCapture {
    state: Arc<Mutex<CaptureState>>,
}

impl fmt::Debug for TraceCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("TraceCapture")
            .field("events", &state.events.len())
            .field("spans", &state.spans.len())
            .finish()
    }
}

impl TraceCapture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route this thread's traces through a registry carrying this layer.
    #[must_use]
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::set_default(subscriber)
    }

    fn lock(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.lock().events.clone()
    }

    /// Events at `WARN` level.
    #[must_use]
    pub fn warnings(&self) -> Vec<CapturedEvent> {
        self.lock()
            .events
            .iter()
            .filter(|event| event.level == Level::WARN)
            .cloned()
            .collect()
    }

    /// Number of events whose message is exactly `message`.
    #[must_use]
    pub fn count(&self, message: &str) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|event| event.message == message)
            .count()
    }

    /// Spans named `name`, in creation order.
    #[must_use]
    pub fn spans(&self, name: &str) -> Vec<CapturedSpan> {
        self.lock()
            .spans
            .iter()
            .filter(|span| span.name == name)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.events.clear();
        state.spans.clear();
        state.open.clear();
    }
}

#[derive(Default)]
struct FieldRecorder {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl Visit for FieldRecorder {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(value.trim_matches('"').to_string());
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl<S> Layer<S> for TraceCapture
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &tracing::span::Attributes<'_>, id: &Id, _ctx: Context<'_, S>) {
        let mut recorder = FieldRecorder::default();
        attrs.record(&mut recorder);
        let mut state = self.lock();
        state.spans.push(CapturedSpan {
            name: attrs.metadata().name(),
            fields: recorder.fields,
        });
        let index = state.spans.len() - 1;
        state.open.insert(id.into_u64(), index);
    }

    fn on_record(&self, id: &Id, values: &tracing::span::Record<'_>, _ctx: Context<'_, S>) {
        let mut recorder = FieldRecorder::default();
        values.record(&mut recorder);
        let mut state = self.lock();
        if let Some(&index) = state.open.get(&id.into_u64()) {
            state.spans[index].fields.extend(recorder.fields);
        }
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorder = FieldRecorder::default();
        event.record(&mut recorder);
        self.lock().events.push(CapturedEvent {
            level: *event.metadata().level(),
            message: recorder.message.unwrap_or_default(),
            fields: recorder.fields,
        });
    }

    fn on_close(&self, id: Id, _ctx: Context<'_, S>) {
        self.lock().open.remove(&id.into_u64());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
