use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use serde::Serialize;
use tracing::span::{Attributes, Id, Record};
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

const QUERY_KEYS: [&str; 2] = ["query.id", "query_id"];

/// A span that has closed.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedSpan {
    pub name: String,
    pub query_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub elapsed_ms: u64,
    pub fields: HashMap<String, serde_json::Value>,
}

/// Closed spans grouped by query id.
#[derive(Debug, Default)]
pub struct SpanCapture {
    spans: RwLock<HashMap<String, Vec<CapturedSpan>>>,
}

impl SpanCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spans recorded for `query_id`, in close order.
    pub fn spans_for(&self, query_id: &str) -> Vec<CapturedSpan> {
        self.spans.read().ok().and_then(|s| s.get(query_id).cloned()).unwrap_or_default()
    }

    /// Every query id seen so far.
    pub fn query_ids(&self) -> Vec<String> {
        self.spans.read().map(|s| s.keys().cloned().collect()).unwrap_or_default()
    }

    fn push(&self, span: CapturedSpan) {
        if let Ok(mut spans) = self.spans.write() {
            spans.entry(span.query_id.clone()).or_default().push(span);
        }
    }
}

#[derive(Clone)]
struct SpanFields(HashMap<String, serde_json::Value>);

struct Started(Instant);

/// A tracing layer that stores closed spans carrying a query id.
///
/// Child spans inherit the query id of their parent, so stage spans opened
/// inside `rag.query` are grouped with it.
pub struct SpanCaptureLayer {
    capture: Arc<SpanCapture>,
}

impl SpanCaptureLayer {
    pub fn new(capture: Arc<SpanCapture>) -> Self {
        Self { capture }
    }
}

impl<S> Layer<S> for SpanCaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };

        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);
        let mut fields = visitor.0;

        if let Some(parent) = span.parent() {
            if let Some(parent_fields) = parent.extensions().get::<SpanFields>() {
                for key in QUERY_KEYS {
                    if !fields.contains_key(key) {
                        if let Some(value) = parent_fields.0.get(key) {
                            fields.insert(key.to_string(), value.clone());
                        }
                    }
                }
            }
        }

        let mut extensions = span.extensions_mut();
        extensions.insert(Started(Instant::now()));
        extensions.insert(SpanFields(fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            let mut visitor = JsonVisitor::default();
            values.record(&mut visitor);
            fields.0.extend(visitor.0);
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else { return };
        let extensions = span.extensions();
        let fields = extensions.get::<SpanFields>().map(|f| f.0.clone()).unwrap_or_default();

        let query_id = QUERY_KEYS
            .iter()
            .find_map(|k| fields.get(*k).and_then(|v| v.as_str()).map(str::to_string));
        let Some(query_id) = query_id else { return };

        let elapsed_ms = extensions
            .get::<Started>()
            .map(|s| s.0.elapsed().as_millis() as u64)
            .unwrap_or(0);

        self.capture.push(CapturedSpan {
            name: span.metadata().name().to_string(),
            query_id,
            parent: span.parent().map(|p| p.metadata().name().to_string()),
            elapsed_ms,
            fields,
        });
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, serde_json::Value>);

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }
}
