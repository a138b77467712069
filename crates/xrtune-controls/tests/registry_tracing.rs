#![forbid(unsafe_code)]

//! Tracing contract for the registry.
//!
//! Verifies that notification fan-out runs inside a `registry.notify` span
//! carrying `path`, `listeners`, and a recorded `duration_us`, and that
//! schema defects surface as `schema.diagnostic` warnings.
//!
//! Run:
//!   cargo test -p xrtune-controls --test registry_tracing

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use xrtune_controls::{ControlRegistry, ControlSpec, Schema};

#[derive(Debug, Default, Clone)]
struct Captured {
    spans: Vec<(String, HashMap<String, String>)>,
    recorded: Vec<(String, String)>,
    events: Vec<(tracing::Level, String)>,
}

struct Capture {
    state: Arc<Mutex<Captured>>,
}

#[derive(Default)]
struct Fields(HashMap<String, String>);

impl tracing::field::Visit for Fields {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_owned(), value.to_owned());
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_owned(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_owned(), format!("{value:?}").trim_matches('"').to_owned());
    }
}

impl<S> Layer<S> for Capture
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        _id: &tracing::Id,
        _ctx: Context<'_, S>,
    ) {
        let mut fields = Fields::default();
        attrs.record(&mut fields);
        self.state
            .lock()
            .expect("capture lock")
            .spans
            .push((attrs.metadata().name().to_owned(), fields.0));
    }

    fn on_record(&self, id: &tracing::Id, values: &tracing::span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = Fields::default();
        values.record(&mut fields);
        let mut state = self.state.lock().expect("capture lock");
        for name in fields.0.into_keys() {
            state.recorded.push((span.metadata().name().to_owned(), name));
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        let message = fields.0.remove("message").unwrap_or_default();
        self.state
            .lock()
            .expect("capture lock")
            .events
            .push((*event.metadata().level(), message));
    }
}

fn capture<R>(f: impl FnOnce() -> R) -> (R, Captured) {
    let state = Arc::new(Mutex::new(Captured::default()));
    let subscriber = tracing_subscriber::registry().with(Capture {
        state: Arc::clone(&state),
    });
    let out = tracing::subscriber::with_default(subscriber, f);
    let captured = state.lock().expect("capture lock").clone();
    (out, captured)
}

#[test]
fn notify_span_carries_path_and_duration() {
    let registry = ControlRegistry::new();
    registry.register(
        "ctrl",
        &Schema::new().control("speed", ControlSpec::new(1.0).min(0.0).max(5.0)),
    );
    let _a = registry.subscribe("ctrl.speed", |_| {});
    let _b = registry.subscribe("ctrl.speed", |_| {});

    let ((), captured) = capture(|| {
        registry.set_value("ctrl.speed", 2.0);
    });

    let (_, fields) = captured
        .spans
        .iter()
        .find(|(name, _)| name == "registry.notify")
        .expect("registry.notify span");
    assert_eq!(fields.get("path").map(String::as_str), Some("ctrl.speed"));
    assert_eq!(fields.get("listeners").map(String::as_str), Some("2"));
    assert!(
        captured
            .recorded
            .iter()
            .any(|(span, field)| span == "registry.notify" && field == "duration_us")
    );
}

#[test]
fn no_notify_span_without_listeners() {
    let registry = ControlRegistry::new();
    registry.register("ctrl", &Schema::new().value("x", 1.0));
    let ((), captured) = capture(|| {
        registry.set_value("ctrl.x", 2.0);
    });
    assert!(captured.spans.iter().all(|(name, _)| name != "registry.notify"));
}

#[test]
fn schema_defects_are_warned() {
    let registry = ControlRegistry::new();
    let (outcome, captured) = capture(|| {
        registry.register(
            "ctrl",
            &Schema::new()
                .control("broken", ControlSpec::empty())
                .value("ok", 1.0),
        )
    });
    assert_eq!(outcome.diagnostics.len(), 1);
    let warnings: Vec<_> = captured
        .events
        .iter()
        .filter(|(level, _)| *level == tracing::Level::WARN)
        .map(|(_, message)| message.as_str())
        .collect();
    assert_eq!(warnings, ["schema.diagnostic"]);
    assert!(
        captured
            .events
            .iter()
            .any(|(level, message)| *level == tracing::Level::INFO && message == "registry.register")
    );
}
